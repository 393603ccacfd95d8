use std::sync::Arc;

use async_trait::async_trait;

use crate::prelude::*;

type Reply = Result<Option<String>, CommandError>;

/// Commands compiled into the bot
pub fn definitions() -> Vec<CommandDefinition> {
    vec![
        CommandDefinition::new("Utility", "ping", "Checks that the bot answers", Ping::build),
        CommandDefinition::new("Help", "help", "Lists commands, or describes one", Help::build)
            .alias("h"),
        CommandDefinition::new("Utility", "stats", "Shows bot statistics", Stats::build),
        CommandDefinition::new("Administration", "lang", "Shows or sets the chat language", Lang::build),
        CommandDefinition::new("Searches", "youtube", "Finds a video on YouTube", Youtube::build)
            .alias("yt"),
        CommandDefinition::new("Administration", "admins", "Lists the chat administrators", Admins::build),
    ]
}

struct Ping {
    localization: Arc<dyn Localization>,
}

impl Ping {
    fn build(lookup: &dyn CapabilityLookup) -> Result<Arc<dyn Command>, RegistryError> {
        Ok(Arc::new(Ping {
            localization: lookup.resolve()?,
        }))
    }
}

#[async_trait]
impl Command for Ping {
    async fn execute(&self, ctx: &CommandContext, _args: &str) -> Reply {
        Ok(Some(self.localization.text(Some(ctx.chat), "pong")))
    }
}

struct Help {
    commands: Arc<CommandRegistry>,
    localization: Arc<dyn Localization>,
}

impl Help {
    fn build(lookup: &dyn CapabilityLookup) -> Result<Arc<dyn Command>, RegistryError> {
        Ok(Arc::new(Help {
            commands: lookup.resolve()?,
            localization: lookup.resolve()?,
        }))
    }
}

#[async_trait]
impl Command for Help {
    async fn execute(&self, ctx: &CommandContext, args: &str) -> Reply {
        let wanted = args.trim().to_lowercase();
        if !wanted.is_empty() {
            let text = match self.commands.find(&wanted) {
                Some(cmd) if cmd.aliases.is_empty() => format!("{}: {}", cmd.name, cmd.summary),
                Some(cmd) => format!("{} ({}): {}", cmd.name, cmd.aliases.join(", "), cmd.summary),
                None => self.localization.text(Some(ctx.chat), "help_unknown"),
            };
            return Ok(Some(text));
        }

        let mut commands = self.commands.commands();
        commands.sort_by(|a, b| (a.module, &a.name).cmp(&(b.module, &b.name)));
        let mut lines = vec![self.localization.text(Some(ctx.chat), "help_header")];
        lines.extend(
            commands
                .iter()
                .map(|c| format!("[{}] {} - {}", c.module, c.name, c.summary)),
        );
        Ok(Some(lines.join("\n")))
    }
}

struct Stats {
    stats: Arc<StatsService>,
}

impl Stats {
    fn build(lookup: &dyn CapabilityLookup) -> Result<Arc<dyn Command>, RegistryError> {
        Ok(Arc::new(Stats {
            stats: lookup.resolve()?,
        }))
    }
}

#[async_trait]
impl Command for Stats {
    async fn execute(&self, _ctx: &CommandContext, _args: &str) -> Reply {
        Ok(Some(self.stats.print()))
    }
}

struct Lang {
    localization: Arc<dyn Localization>,
    credentials: Arc<Credentials>,
}

impl Lang {
    fn build(lookup: &dyn CapabilityLookup) -> Result<Arc<dyn Command>, RegistryError> {
        Ok(Arc::new(Lang {
            localization: lookup.resolve()?,
            credentials: lookup.resolve()?,
        }))
    }

    /// With no owners configured anyone may switch
    fn may_switch(&self, author: Option<&Author>) -> bool {
        self.credentials.owner_ids().is_empty()
            || author.map_or(false, |a| self.credentials.is_owner(a.id))
    }
}

#[async_trait]
impl Command for Lang {
    async fn execute(&self, ctx: &CommandContext, args: &str) -> Reply {
        let l10n = &self.localization;
        let wanted = args.trim();
        if wanted.is_empty() {
            let current = l10n.chat_locale(ctx.chat);
            return Ok(Some(
                l10n.text(Some(ctx.chat), "locale_current")
                    .replace("{locale}", &current),
            ));
        }
        if !self.may_switch(ctx.author.as_ref()) {
            return Ok(Some(l10n.text(Some(ctx.chat), "locale_owner_only")));
        }
        match l10n.set_chat_locale(ctx.chat, wanted) {
            Ok(()) => Ok(Some(
                l10n.text(Some(ctx.chat), "locale_set")
                    .replace("{locale}", &l10n.chat_locale(ctx.chat)),
            )),
            Err(LocalizationError::UnsupportedLocale(_)) => Ok(Some(
                l10n.text(Some(ctx.chat), "locale_unsupported")
                    .replace("{locales}", &l10n.supported_locales().join(", ")),
            )),
        }
    }
}

struct Youtube {
    google: Arc<dyn GoogleApi>,
    localization: Arc<dyn Localization>,
}

impl Youtube {
    fn build(lookup: &dyn CapabilityLookup) -> Result<Arc<dyn Command>, RegistryError> {
        Ok(Arc::new(Youtube {
            google: lookup.resolve()?,
            localization: lookup.resolve()?,
        }))
    }
}

#[async_trait]
impl Command for Youtube {
    async fn execute(&self, ctx: &CommandContext, args: &str) -> Reply {
        let query = args.trim();
        if query.is_empty() {
            return Err(CommandError::Usage(format!("{} <query>", ctx.invoked_as)));
        }
        let links = self.google.search_videos(query, 1).await?;
        Ok(Some(match links.into_iter().next() {
            Some(link) => link,
            None => self.localization.text(Some(ctx.chat), "search_empty"),
        }))
    }
}

struct Admins {
    gateway: Arc<dyn Gateway>,
    localization: Arc<dyn Localization>,
}

impl Admins {
    fn build(lookup: &dyn CapabilityLookup) -> Result<Arc<dyn Command>, RegistryError> {
        Ok(Arc::new(Admins {
            gateway: lookup.resolve()?,
            localization: lookup.resolve()?,
        }))
    }
}

#[async_trait]
impl Command for Admins {
    async fn execute(&self, ctx: &CommandContext, _args: &str) -> Reply {
        let Some(snapshot) = self.gateway.member_snapshot(ctx.chat) else {
            return Ok(Some(self.localization.text(Some(ctx.chat), "admins_unknown")));
        };
        let mut lines = vec![self
            .localization
            .text(Some(ctx.chat), "admins_header")
            .replace("{count}", &snapshot.member_count.to_string())];
        lines.extend(snapshot.administrators.iter().map(|a| a.display_name.clone()));
        Ok(Some(lines.join("\n")))
    }
}
