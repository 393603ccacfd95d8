use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::prelude::*;

pub trait Dispatcher<T>: Send + Sync {
    fn dispatch(self: Arc<Self>, data: T) -> JoinHandle<()>;
}

/// A parsed `<prefix><name>[@bot] <args>` invocation
#[derive(Debug, PartialEq, Eq)]
pub struct Invocation<'a> {
    pub name: String,
    pub args: &'a str,
}

pub fn parse_invocation<'a>(prefix: &str, text: &'a str) -> Option<Invocation<'a>> {
    let rest = text.trim_start().strip_prefix(prefix)?;
    let (head, args) = match rest.find(char::is_whitespace) {
        Some(pos) => (&rest[..pos], rest[pos..].trim()),
        None => (rest, ""),
    };
    let name = head.split('@').next().unwrap_or_default();
    if name.is_empty() {
        return None;
    }
    Some(Invocation {
        name: name.to_lowercase(),
        args,
    })
}

/// Routes incoming messages to the registered commands and sends the
/// replies back through the gateway
pub struct CommandDispatcher {
    gateway: Arc<dyn Gateway>,
    commands: Arc<CommandRegistry>,
    stats: Arc<StatsService>,
    localization: Arc<dyn Localization>,
    prefix: String,
    logger: Logger,
}

#[derive(Default)]
pub struct CommandDispatcherBuilder {
    gateway: Option<Arc<dyn Gateway>>,
    commands: Option<Arc<CommandRegistry>>,
    stats: Option<Arc<StatsService>>,
    localization: Option<Arc<dyn Localization>>,
    prefix: Option<String>,
    logger: Option<Logger>,
}

impl CommandDispatcher {
    pub fn new() -> CommandDispatcherBuilder {
        Default::default()
    }

    /// Consumes incoming messages in a background task until the gateway
    /// side of the channel goes away
    pub fn start(self: Arc<Self>, mut incoming: mpsc::Receiver<IncomingMessage>) -> JoinHandle<()> {
        tokio::spawn(async move {
            while let Some(message) = incoming.recv().await {
                self.clone().dispatch(message);
            }
            debug!(self.logger, "Incoming message channel closed");
        })
    }

    /// Handles one message to completion
    pub async fn handle(&self, message: IncomingMessage) {
        self.stats.message_seen();
        let Some(invocation) = parse_invocation(&self.prefix, &message.text) else {
            return;
        };
        let Some(command) = self.commands.find(&invocation.name) else {
            return;
        };

        let ctx = CommandContext {
            chat: message.chat,
            author: message.author,
            invoked_as: invocation.name,
        };
        debug!(self.logger, "Running command";
            "command" => &command.name,
            "chat" => ctx.chat,
            "author" => ctx.author.as_ref().map(|a| a.display_name.clone()),
        );
        let reply = match command.handler.execute(&ctx, invocation.args).await {
            Ok(reply) => {
                self.stats.command_ran();
                reply
            }
            Err(CommandError::Usage(usage)) => Some(
                self.localization
                    .text(Some(ctx.chat), "bad_usage")
                    .replace("{usage}", &format!("{}{}", self.prefix, usage)),
            ),
            Err(why) => {
                warn!(self.logger, "Command failed";
                    "command" => &command.name,
                    "reason" => why.to_string(),
                );
                Some(self.localization.text(Some(ctx.chat), "command_failed"))
            }
        };

        if let Some(text) = reply {
            if let Err(why) = self.gateway.send_message(ctx.chat, &text).await {
                error!(self.logger, "Could not deliver a reply";
                    "chat" => ctx.chat,
                    "reason" => why.to_string(),
                );
            }
        }
    }
}

impl Dispatcher<IncomingMessage> for CommandDispatcher {
    fn dispatch(self: Arc<Self>, data: IncomingMessage) -> JoinHandle<()> {
        tokio::spawn(async move { self.handle(data).await })
    }
}

impl CommandDispatcherBuilder {
    pub fn gateway(self, gateway: Arc<dyn Gateway>) -> Self {
        Self {
            gateway: Some(gateway),
            ..self
        }
    }

    pub fn commands(self, commands: Arc<CommandRegistry>) -> Self {
        Self {
            commands: Some(commands),
            ..self
        }
    }

    pub fn stats(self, stats: Arc<StatsService>) -> Self {
        Self {
            stats: Some(stats),
            ..self
        }
    }

    pub fn localization(self, localization: Arc<dyn Localization>) -> Self {
        Self {
            localization: Some(localization),
            ..self
        }
    }

    pub fn prefix(self, prefix: &str) -> Self {
        Self {
            prefix: Some(prefix.to_owned()),
            ..self
        }
    }

    pub fn logger(self, logger: Logger) -> Self {
        Self {
            logger: Some(logger),
            ..self
        }
    }

    pub fn build(self) -> UResult<CommandDispatcher> {
        Ok(CommandDispatcher {
            gateway: self
                .gateway
                .ok_or("Did not provide a gateway for the command dispatcher")?,
            commands: self
                .commands
                .ok_or("Did not provide a command registry for the command dispatcher")?,
            stats: self
                .stats
                .ok_or("Did not provide statistics for the command dispatcher")?,
            localization: self
                .localization
                .ok_or("Did not provide localization for the command dispatcher")?,
            prefix: self
                .prefix
                .ok_or("Did not provide a command prefix for the command dispatcher")?,
            logger: self
                .logger
                .ok_or("Did not provide a logger for the command dispatcher")?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::testing::SpyGateway;
    use async_trait::async_trait;

    struct Echo;

    #[async_trait]
    impl Command for Echo {
        async fn execute(&self, _ctx: &CommandContext, args: &str) -> Result<Option<String>, CommandError> {
            if args.is_empty() {
                return Err(CommandError::Usage("echo <text>".into()));
            }
            Ok(Some(args.to_owned()))
        }
    }

    struct Broken;

    #[async_trait]
    impl Command for Broken {
        async fn execute(&self, _ctx: &CommandContext, _args: &str) -> Result<Option<String>, CommandError> {
            Err(GatewayError::NotConnected.into())
        }
    }

    fn echo(_: &dyn CapabilityLookup) -> Result<Arc<dyn Command>, RegistryError> {
        Ok(Arc::new(Echo))
    }

    fn broken(_: &dyn CapabilityLookup) -> Result<Arc<dyn Command>, RegistryError> {
        Ok(Arc::new(Broken))
    }

    fn setup() -> (Arc<SpyGateway>, Arc<StatsService>, Arc<CommandDispatcher>) {
        let gateway = Arc::new(SpyGateway::default());
        let commands = Arc::new(CommandRegistry::new());
        commands
            .load_definitions(
                vec![
                    CommandDefinition::new("Test", "echo", "", echo),
                    CommandDefinition::new("Test", "broken", "", broken),
                ],
                DependencyRegistry::new().as_lookup(),
            )
            .unwrap();
        let stats = Arc::new(StatsService::new(gateway.clone(), commands.clone()));
        let dispatcher = CommandDispatcher::new()
            .gateway(gateway.clone())
            .commands(commands)
            .stats(stats.clone())
            .localization(Arc::new(Localizer::new("en-US").unwrap()))
            .prefix("/")
            .logger(Logger::root(slog::Discard, o!()))
            .build()
            .unwrap();
        (gateway, stats, Arc::new(dispatcher))
    }

    fn message(text: &str) -> IncomingMessage {
        IncomingMessage {
            chat: 3,
            author: None,
            text: text.into(),
        }
    }

    #[test]
    fn invocations() {
        assert_eq!(
            parse_invocation("/", "/Echo@kestrel_bot  hi there "),
            Some(Invocation {
                name: "echo".into(),
                args: "hi there"
            })
        );
        assert_eq!(
            parse_invocation(".", ".ping"),
            Some(Invocation {
                name: "ping".into(),
                args: ""
            })
        );
        assert_eq!(parse_invocation("/", "hello /echo"), None);
        assert_eq!(parse_invocation("/", "/ echo"), None);
    }

    #[tokio::test]
    async fn replies_go_back_to_the_chat() {
        let (gateway, stats, dispatcher) = setup();
        dispatcher.handle(message("/echo hi")).await;
        dispatcher.handle(message("just chatting")).await;
        dispatcher.handle(message("/unknown")).await;

        assert_eq!(gateway.sent(), vec![(3, "hi".to_string())]);
        assert_eq!(stats.messages_seen(), 3);
        assert_eq!(stats.commands_ran(), 1);
    }

    #[tokio::test]
    async fn failures_are_answered_not_propagated() {
        let (gateway, stats, dispatcher) = setup();
        dispatcher.handle(message("/echo")).await;
        dispatcher.handle(message("/broken")).await;

        assert_eq!(
            gateway.sent(),
            vec![
                (3, "Usage: /echo <text>".to_string()),
                (3, "Something went wrong while running that command.".to_string()),
            ]
        );
        assert_eq!(stats.commands_ran(), 0);
    }

    #[tokio::test]
    async fn background_task_drains_the_gateway_channel() {
        let (gateway, _stats, dispatcher) = setup();
        let task = dispatcher.start(gateway.incoming().unwrap());
        gateway.push(3, "/echo queued").await;

        tokio::time::timeout(std::time::Duration::from_secs(2), async {
            while gateway.sent().is_empty() {
                tokio::task::yield_now().await;
            }
        })
        .await
        .unwrap();
        assert_eq!(gateway.sent(), vec![(3, "queued".to_string())]);
        task.abort();
    }
}
