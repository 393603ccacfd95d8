use std::collections::HashSet;
use std::fmt;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use thiserror::Error;

use crate::prelude::*;

/// Everything a command sees about the message that triggered it
#[derive(Debug, Clone)]
pub struct CommandContext {
    pub chat: ChatId,
    pub author: Option<Author>,
    /// The alias the command was invoked under
    pub invoked_as: String,
}

#[derive(Debug, Error)]
pub enum CommandError {
    #[error("bad arguments: {0}")]
    Usage(String),
    #[error(transparent)]
    Api(#[from] ApiError),
    #[error(transparent)]
    Localization(#[from] LocalizationError),
    #[error(transparent)]
    Gateway(#[from] GatewayError),
}

#[async_trait]
pub trait Command: Send + Sync {
    /// Runs the command. `Ok(None)` means there is nothing to reply.
    async fn execute(&self, ctx: &CommandContext, args: &str) -> Result<Option<String>, CommandError>;
}

/// Constructs a command, pulling its dependencies out of the lookup
pub type CommandFactory = fn(&dyn CapabilityLookup) -> Result<Arc<dyn Command>, RegistryError>;

/// Compiled-in description of a command, turned into a live
/// [`RegisteredCommand`] by [`CommandRegistry::load_definitions`]
#[derive(Clone)]
pub struct CommandDefinition {
    pub name: String,
    pub aliases: Vec<String>,
    pub summary: String,
    pub module: &'static str,
    pub factory: CommandFactory,
}

impl CommandDefinition {
    pub fn new(module: &'static str, name: &str, summary: &str, factory: CommandFactory) -> Self {
        Self {
            name: name.to_owned(),
            aliases: Vec::new(),
            summary: summary.to_owned(),
            module,
            factory,
        }
    }

    pub fn alias(mut self, alias: &str) -> Self {
        self.aliases.push(alias.to_owned());
        self
    }
}

impl fmt::Debug for CommandDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandDefinition")
            .field("name", &self.name)
            .field("aliases", &self.aliases)
            .field("module", &self.module)
            .finish()
    }
}

pub struct RegisteredCommand {
    pub name: String,
    pub aliases: Vec<String>,
    pub summary: String,
    pub module: &'static str,
    pub handler: Arc<dyn Command>,
}

impl RegisteredCommand {
    pub fn answers_to(&self, name: &str) -> bool {
        self.name == name || self.aliases.iter().any(|a| a == name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadSummary {
    pub commands: usize,
    pub modules: usize,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DefinitionFault {
    #[error("name is empty")]
    EmptyName,
    #[error("`{0}` is not a valid command name")]
    InvalidName(String),
    #[error("`{0}` is already taken")]
    Taken(String),
    #[error(transparent)]
    Injection(#[from] RegistryError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DefinitionFailure {
    pub command: String,
    pub fault: DefinitionFault,
}

/// Nothing was registered: every definition that could not be loaded is
/// listed, the rest were discarded with them
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("{} command definition(s) failed to load", .failures.len())]
pub struct LoadError {
    pub failures: Vec<DefinitionFailure>,
}

fn check_name(name: &str) -> Result<(), DefinitionFault> {
    if name.is_empty() {
        return Err(DefinitionFault::EmptyName);
    }
    let valid = name
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_' || c == '-');
    if !valid {
        return Err(DefinitionFault::InvalidName(name.to_owned()));
    }
    Ok(())
}

/// Live commands, looked up by name or alias
#[derive(Default)]
pub struct CommandRegistry {
    commands: RwLock<Vec<Arc<RegisteredCommand>>>,
}

impl CommandRegistry {
    pub fn new() -> Self {
        Default::default()
    }

    /// Validates and constructs every definition. Either all of them are
    /// registered or none is. Factories run without the registry locked, so
    /// they may resolve and read it.
    pub fn load_definitions(
        &self,
        definitions: Vec<CommandDefinition>,
        resolver: &dyn CapabilityLookup,
    ) -> Result<LoadSummary, LoadError> {
        let mut taken = self.names();
        let mut staged = Vec::with_capacity(definitions.len());
        let mut failures = Vec::new();
        for def in definitions {
            let fail = |fault: DefinitionFault| DefinitionFailure {
                command: def.name.clone(),
                fault,
            };
            let names = std::iter::once(&def.name).chain(def.aliases.iter());
            let mut faults: Vec<DefinitionFault> = names
                .filter_map(|name| {
                    check_name(name).err().or_else(|| {
                        (!taken.insert(name.clone())).then(|| DefinitionFault::Taken(name.clone()))
                    })
                })
                .collect();
            if !faults.is_empty() {
                failures.extend(faults.drain(..).map(fail));
                continue;
            }
            match (def.factory)(resolver) {
                Ok(handler) => staged.push(Arc::new(RegisteredCommand {
                    name: def.name,
                    aliases: def.aliases,
                    summary: def.summary,
                    module: def.module,
                    handler,
                })),
                Err(why) => failures.push(fail(why.into())),
            }
        }
        if !failures.is_empty() {
            return Err(LoadError { failures });
        }

        let mut commands = write_lock(&self.commands);
        // A factory may have loaded commands of its own in the meantime
        let registered: HashSet<&str> = commands
            .iter()
            .flat_map(|c| std::iter::once(c.name.as_str()).chain(c.aliases.iter().map(String::as_str)))
            .collect();
        let collisions: Vec<DefinitionFailure> = staged
            .iter()
            .flat_map(|c| std::iter::once(&c.name).chain(c.aliases.iter()).map(move |n| (c, n)))
            .filter(|(_, name)| registered.contains(name.as_str()))
            .map(|(c, name)| DefinitionFailure {
                command: c.name.clone(),
                fault: DefinitionFault::Taken(name.clone()),
            })
            .collect();
        if !collisions.is_empty() {
            return Err(LoadError { failures: collisions });
        }

        let summary = LoadSummary {
            commands: staged.len(),
            modules: staged.iter().map(|c| c.module).collect::<HashSet<_>>().len(),
        };
        commands.extend(staged);
        Ok(summary)
    }

    fn names(&self) -> HashSet<String> {
        read_lock(&self.commands)
            .iter()
            .flat_map(|c| std::iter::once(c.name.clone()).chain(c.aliases.iter().cloned()))
            .collect()
    }

    pub fn find(&self, name: &str) -> Option<Arc<RegisteredCommand>> {
        read_lock(&self.commands)
            .iter()
            .find(|c| c.answers_to(name))
            .cloned()
    }

    pub fn commands(&self) -> Vec<Arc<RegisteredCommand>> {
        read_lock(&self.commands).clone()
    }

    pub fn len(&self) -> usize {
        read_lock(&self.commands).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Echo;

    #[async_trait]
    impl Command for Echo {
        async fn execute(&self, _ctx: &CommandContext, args: &str) -> Result<Option<String>, CommandError> {
            Ok(Some(args.to_owned()))
        }
    }

    struct Needy(Arc<CommandRegistry>);

    #[async_trait]
    impl Command for Needy {
        async fn execute(&self, _ctx: &CommandContext, _args: &str) -> Result<Option<String>, CommandError> {
            Ok(Some(self.0.len().to_string()))
        }
    }

    fn echo(_: &dyn CapabilityLookup) -> Result<Arc<dyn Command>, RegistryError> {
        Ok(Arc::new(Echo))
    }

    fn needy(lookup: &dyn CapabilityLookup) -> Result<Arc<dyn Command>, RegistryError> {
        Ok(Arc::new(Needy(lookup.resolve::<CommandRegistry>()?)))
    }

    fn eager(lookup: &dyn CapabilityLookup) -> Result<Arc<dyn Command>, RegistryError> {
        let registry = lookup.resolve::<CommandRegistry>()?;
        let _ = (registry.len(), registry.find("needy"), registry.commands());
        Ok(Arc::new(Needy(registry)))
    }

    #[test]
    fn loads_every_definition() {
        let registry = CommandRegistry::new();
        let defs = vec![
            CommandDefinition::new("Utility", "echo", "Repeats", echo).alias("say"),
            CommandDefinition::new("Help", "count", "Counts", echo),
        ];
        let summary = registry
            .load_definitions(defs, DependencyRegistry::new().as_lookup())
            .unwrap();

        assert_eq!(summary, LoadSummary { commands: 2, modules: 2 });
        assert_eq!(registry.find("say").unwrap().name, "echo");
        assert!(registry.find("nope").is_none());
    }

    #[test]
    fn one_bad_definition_rejects_the_whole_load() {
        let registry = CommandRegistry::new();
        let defs = vec![
            CommandDefinition::new("Utility", "echo", "", echo),
            CommandDefinition::new("Utility", "needy", "", needy),
            CommandDefinition::new("Utility", "Shout", "", echo),
            CommandDefinition::new("Utility", "", "", echo),
        ];
        let err = registry
            .load_definitions(defs, DependencyRegistry::new().as_lookup())
            .unwrap_err();

        assert!(registry.is_empty());
        let failed: Vec<_> = err.failures.iter().map(|f| f.command.as_str()).collect();
        assert_eq!(failed, vec!["needy", "Shout", ""]);
        assert!(matches!(
            err.failures[0].fault,
            DefinitionFault::Injection(RegistryError::Unresolved { .. })
        ));
        assert_eq!(err.failures[1].fault, DefinitionFault::InvalidName("Shout".into()));
        assert_eq!(err.failures[2].fault, DefinitionFault::EmptyName);
    }

    #[test]
    fn names_and_aliases_share_one_namespace() {
        let registry = CommandRegistry::new();
        let defs = vec![
            CommandDefinition::new("A", "echo", "", echo).alias("e"),
            CommandDefinition::new("B", "e", "", echo),
        ];
        let err = registry
            .load_definitions(defs, DependencyRegistry::new().as_lookup())
            .unwrap_err();
        assert_eq!(
            err.failures,
            vec![DefinitionFailure {
                command: "e".into(),
                fault: DefinitionFault::Taken("e".into())
            }]
        );
    }

    #[test]
    fn factories_resolve_through_the_lookup() {
        let shared = Arc::new(CommandRegistry::new());
        let mut deps = DependencyRegistry::new();
        deps.register(shared.clone()).unwrap();

        let defs = vec![CommandDefinition::new("Help", "needy", "", needy)];
        shared.load_definitions(defs, deps.as_lookup()).unwrap();
        assert_eq!(shared.len(), 1);
    }

    #[test]
    fn factories_may_read_the_registry_they_load_into() {
        let shared = Arc::new(CommandRegistry::new());
        let mut deps = DependencyRegistry::new();
        deps.register(shared.clone()).unwrap();

        let (done, wait) = std::sync::mpsc::channel();
        let loader = shared.clone();
        std::thread::spawn(move || {
            let defs = vec![CommandDefinition::new("Help", "eager", "", eager)];
            let _ = done.send(loader.load_definitions(defs, deps.as_lookup()));
        });
        let loaded = wait
            .recv_timeout(std::time::Duration::from_secs(3))
            .expect("load_definitions did not return");
        assert_eq!(loaded.unwrap().commands, 1);
        assert!(shared.find("eager").is_some());
    }
}
