use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::prelude::*;

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
pub struct Config {
    pub env_prefix: String,
    pub credentials_path: PathBuf,
    pub database_path: PathBuf,
    pub default_locale: String,
    pub command_prefix: String,
    pub api_base: String,
    pub stage_timeout_secs: u64,
    pub sync_timeout_secs: u64,
    pub sync_chats: Vec<i64>,
    pub log_format: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_file: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            env_prefix: "KESTREL".into(),
            credentials_path: "credentials.toml".into(),
            database_path: "kestrel.db.json".into(),
            default_locale: "en-US".into(),
            command_prefix: "/".into(),
            api_base: "https://api.telegram.org".into(),
            stage_timeout_secs: 30,
            sync_timeout_secs: 120,
            sync_chats: Vec::new(),
            log_format: "full".into(),
            log_file: None,
        }
    }
}

impl Config {
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.command_prefix.trim().is_empty() {
            return Err(invalid("command_prefix", &self.command_prefix));
        }
        if self.stage_timeout_secs == 0 {
            return Err(invalid("stage_timeout_secs", "0"));
        }
        if self.sync_timeout_secs == 0 {
            return Err(invalid("sync_timeout_secs", "0"));
        }
        if LogFormat::parse(&self.log_format).is_none() {
            return Err(invalid("log_format", &self.log_format));
        }
        Ok(())
    }

    pub fn log_target(&self) -> LogTarget {
        match self.log_file {
            Some(ref path) => LogTarget::File(path.clone()),
            None => LogTarget::Terminal,
        }
    }

    pub fn log_format(&self) -> LogFormat {
        LogFormat::parse(&self.log_format).unwrap_or(LogFormat::Full)
    }

    pub fn stage_timeout(&self) -> Duration {
        Duration::from_secs(self.stage_timeout_secs)
    }

    pub fn sync_timeout(&self) -> Duration {
        Duration::from_secs(self.sync_timeout_secs)
    }

    /// Credential lookup: environment first, then the credentials file
    pub fn credential_source(&self) -> Result<LayeredSource, ConfigurationError> {
        Ok(LayeredSource::new()
            .layer(EnvSource::new(&self.env_prefix))
            .layer(TomlSource::open(&self.credentials_path)?))
    }
}

fn invalid(key: &str, value: &str) -> ConfigurationError {
    ConfigurationError::InvalidValue {
        key: key.into(),
        value: value.into(),
    }
}

pub const PACKAGE_VERSION: &'static str = std::env!("CARGO_PKG_VERSION");

pub fn create<T>(cfg_path: &str) -> UResult<T>
where
    T: Default + Serialize,
{
    let default_config = T::default();
    let serialized = toml::to_string(&default_config)?;
    let mut file = std::fs::File::create(cfg_path)?;
    write!(file, "{}", serialized)?;
    Ok(default_config)
}

pub fn read<T>(cfg_path: &str) -> UResult<T>
where
    T: DeserializeOwned,
{
    let contents = std::fs::read_to_string(&cfg_path)?;
    let config = toml::from_str::<T>(&contents)?;
    Ok(config)
}

/// Reads the config, creating a default one only when the file does not
/// exist yet. A file that exists but does not parse is an error.
pub fn read_or_create<T>(cfg_path: &str) -> UResult<T>
where
    T: Default + DeserializeOwned + Serialize,
{
    if Path::new(cfg_path).exists() {
        read::<T>(cfg_path)
    } else {
        create(cfg_path)
    }
}

/// Read-only key/value view of the process configuration.
///
/// Keys are dotted paths such as `token` or `api_keys.google`.
pub trait ConfigSource: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
}

impl ConfigSource for HashMap<String, String> {
    fn get(&self, key: &str) -> Option<String> {
        HashMap::get(self, key).cloned()
    }
}

/// Environment variables under a prefix: `api_keys.google` is looked up
/// as `PREFIX_API_KEYS_GOOGLE`.
#[derive(Debug, Clone)]
pub struct EnvSource {
    prefix: String,
}

impl EnvSource {
    pub fn new(prefix: &str) -> Self {
        Self {
            prefix: prefix.to_uppercase(),
        }
    }

    pub fn variable_name(&self, key: &str) -> String {
        let key = key.replace('.', "_").to_uppercase();
        if self.prefix.is_empty() {
            key
        } else {
            format!("{}_{}", self.prefix, key)
        }
    }
}

impl ConfigSource for EnvSource {
    fn get(&self, key: &str) -> Option<String> {
        std::env::var(self.variable_name(key)).ok()
    }
}

/// A TOML document, typically the credentials file
#[derive(Debug, Clone)]
pub struct TomlSource {
    root: toml::Value,
}

impl TomlSource {
    /// A missing file is an empty source, not an error
    pub fn open(path: &Path) -> Result<Self, ConfigurationError> {
        if !path.exists() {
            return Ok(Self::empty());
        }
        let unreadable = |reason: String| ConfigurationError::Unreadable {
            path: path.display().to_string(),
            reason,
        };
        let contents = std::fs::read_to_string(path).map_err(|why| unreadable(why.to_string()))?;
        Self::parse(&contents).map_err(|why| unreadable(why.to_string()))
    }

    pub fn parse(contents: &str) -> Result<Self, toml::de::Error> {
        Ok(Self {
            root: toml::from_str::<toml::Value>(contents)?,
        })
    }

    pub fn empty() -> Self {
        Self {
            root: toml::Value::Table(Default::default()),
        }
    }
}

fn render_scalar(value: &toml::Value) -> Option<String> {
    match value {
        toml::Value::String(s) => Some(s.clone()),
        toml::Value::Integer(i) => Some(i.to_string()),
        toml::Value::Float(f) => Some(f.to_string()),
        toml::Value::Boolean(b) => Some(b.to_string()),
        _ => None,
    }
}

impl ConfigSource for TomlSource {
    fn get(&self, key: &str) -> Option<String> {
        let mut node = &self.root;
        for part in key.split('.') {
            node = node.get(part)?;
        }
        match node {
            toml::Value::Array(items) => {
                let rendered: Option<Vec<String>> = items.iter().map(render_scalar).collect();
                rendered.map(|r| r.join(","))
            }
            other => render_scalar(other),
        }
    }
}

/// Ordered stack of sources, the first one holding a key wins
#[derive(Default)]
pub struct LayeredSource {
    layers: Vec<Box<dyn ConfigSource>>,
}

impl LayeredSource {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn layer<S>(mut self, source: S) -> Self
    where
        S: ConfigSource + 'static,
    {
        self.layers.push(Box::new(source));
        self
    }
}

impl ConfigSource for LayeredSource {
    fn get(&self, key: &str) -> Option<String> {
        self.layers.iter().find_map(|layer| layer.get(key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid_and_round_trips_through_toml() {
        let config = Config::default();
        assert!(config.validate().is_ok());

        let serialized = toml::to_string(&config).unwrap();
        let parsed: Config = toml::from_str(&serialized).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn validate_rejects_bad_values() {
        let config = Config {
            command_prefix: " ".into(),
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigurationError::InvalidValue { ref key, .. }) if key == "command_prefix"
        ));

        let config = Config {
            sync_timeout_secs: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = Config {
            log_format: "xml".into(),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn read_or_create_writes_defaults_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("kestrel.toml");
        let path = path.to_str().unwrap();

        let created: Config = read_or_create(path).unwrap();
        assert_eq!(created, Config::default());
        assert!(Path::new(path).exists());

        std::fs::write(path, "command_prefix = 5").unwrap();
        assert!(read_or_create::<Config>(path).is_err());
    }

    #[test]
    fn toml_source_resolves_dotted_keys() {
        let source = TomlSource::parse(
            r#"
            token = "123:abc"
            owner_ids = [10, 20]
            [api_keys]
            google = "g-key"
            "#,
        )
        .unwrap();

        assert_eq!(source.get("token").as_deref(), Some("123:abc"));
        assert_eq!(source.get("api_keys.google").as_deref(), Some("g-key"));
        assert_eq!(source.get("owner_ids").as_deref(), Some("10,20"));
        assert_eq!(source.get("api_keys.mashape"), None);
        assert_eq!(source.get("api_keys"), None);
    }

    #[test]
    fn missing_toml_file_is_empty() {
        let source = TomlSource::open(Path::new("/nonexistent/credentials.toml")).unwrap();
        assert_eq!(source.get("token"), None);
    }

    #[test]
    fn earlier_layers_win() {
        let env: HashMap<String, String> = [("token".to_string(), "from-env".to_string())].into();
        let file = TomlSource::parse("token = 'from-file'\nextra = 'x'").unwrap();
        let layered = LayeredSource::new().layer(env).layer(file);

        assert_eq!(layered.get("token").as_deref(), Some("from-env"));
        assert_eq!(layered.get("extra").as_deref(), Some("x"));
    }

    #[test]
    fn env_variable_names() {
        let source = EnvSource::new("kestrel");
        assert_eq!(source.variable_name("token"), "KESTREL_TOKEN");
        assert_eq!(source.variable_name("api_keys.google"), "KESTREL_API_KEYS_GOOGLE");
    }

    #[test]
    fn malformed_credentials_file_is_a_configuration_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("credentials.toml");
        std::fs::write(&path, "token = \"unterminated\n").unwrap();
        let config = Config {
            credentials_path: path,
            ..Default::default()
        };

        match config.credential_source() {
            Err(ConfigurationError::Unreadable { path, .. }) => assert!(path.ends_with("credentials.toml")),
            Err(other) => panic!("unexpected {:?}", other),
            Ok(_) => panic!("malformed credentials file was accepted"),
        }
    }
}
