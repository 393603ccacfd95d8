use std::collections::BTreeMap;
use std::fmt;

use crate::prelude::*;

/// API key names looked up under `api_keys.<name>`
pub const KNOWN_API_KEYS: &[&str] = &["google", "mashape", "soundcloud"];

/// Everything the bot needs to authenticate against outside services.
/// Loaded once, never mutated afterwards.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    token: String,
    api_keys: BTreeMap<String, String>,
    owner_ids: Vec<i64>,
}

impl Credentials {
    pub fn load(source: &dyn ConfigSource) -> Result<Self, ConfigurationError> {
        let token = source
            .get("token")
            .ok_or_else(|| ConfigurationError::Missing {
                key: "token".into(),
            })?;
        check_token(&token)?;

        let api_keys = KNOWN_API_KEYS
            .iter()
            .filter_map(|name| {
                let value = source.get(&format!("api_keys.{}", name))?;
                let value = value.trim();
                (!value.is_empty()).then(|| (name.to_string(), value.to_owned()))
            })
            .collect();

        let owner_ids = match source.get("owner_ids") {
            Some(raw) => parse_owner_ids(&raw)?,
            None => Vec::new(),
        };

        Ok(Credentials {
            token,
            api_keys,
            owner_ids,
        })
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn api_key(&self, name: &str) -> Option<&str> {
        self.api_keys.get(name).map(String::as_str)
    }

    pub fn owner_ids(&self) -> &[i64] {
        &self.owner_ids
    }

    pub fn is_owner(&self, user_id: i64) -> bool {
        self.owner_ids.contains(&user_id)
    }
}

// The token never ends up in logs
impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("token", &"<redacted>")
            .field("api_keys", &self.api_keys.keys().collect::<Vec<_>>())
            .field("owner_ids", &self.owner_ids)
            .finish()
    }
}

fn check_token(token: &str) -> Result<(), ConfigurationError> {
    if token.trim().is_empty() {
        return Err(ConfigurationError::MalformedToken { reason: "blank" });
    }
    if token.chars().any(|c| c.is_whitespace() || c.is_control()) {
        return Err(ConfigurationError::MalformedToken {
            reason: "contains whitespace or control characters",
        });
    }
    Ok(())
}

fn parse_owner_ids(raw: &str) -> Result<Vec<i64>, ConfigurationError> {
    raw.split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(|part| {
            part.parse::<i64>()
                .map_err(|_| ConfigurationError::InvalidValue {
                    key: "owner_ids".into(),
                    value: part.into(),
                })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn source(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn loads_token_keys_and_owners() {
        let creds = Credentials::load(&source(&[
            ("token", "123456:AAE-secret"),
            ("api_keys.google", "g-key"),
            ("api_keys.mashape", "   "),
            ("owner_ids", "42, 7"),
        ]))
        .unwrap();

        assert_eq!(creds.token(), "123456:AAE-secret");
        assert_eq!(creds.api_key("google"), Some("g-key"));
        assert_eq!(creds.api_key("mashape"), None);
        assert_eq!(creds.owner_ids(), &[42, 7]);
        assert!(creds.is_owner(7));
        assert!(!format!("{:?}", creds).contains("secret"));
    }

    #[test]
    fn missing_token_is_a_configuration_error() {
        let err = Credentials::load(&source(&[("api_keys.google", "g-key")])).unwrap_err();
        assert_eq!(
            err,
            ConfigurationError::Missing {
                key: "token".into()
            }
        );
    }

    #[test]
    fn malformed_tokens_are_rejected() {
        for bad in ["", "   ", "123 456", "abc\n"] {
            let err = Credentials::load(&source(&[("token", bad)])).unwrap_err();
            assert!(
                matches!(err, ConfigurationError::MalformedToken { .. }),
                "{:?} accepted",
                bad
            );
        }
    }

    #[test]
    fn bad_owner_id() {
        let err = Credentials::load(&source(&[("token", "t"), ("owner_ids", "1,two")])).unwrap_err();
        assert_eq!(
            err,
            ConfigurationError::InvalidValue {
                key: "owner_ids".into(),
                value: "two".into()
            }
        );
    }
}
