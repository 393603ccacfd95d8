use std::collections::HashMap;
use std::sync::RwLock;

use thiserror::Error;

use crate::prelude::*;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LocalizationError {
    #[error("locale `{0}` is not supported")]
    UnsupportedLocale(String),
}

pub trait Localization: Send + Sync {
    fn default_locale(&self) -> &str;

    fn supported_locales(&self) -> Vec<&'static str>;

    fn chat_locale(&self, chat: ChatId) -> String;

    fn set_chat_locale(&self, chat: ChatId, locale: &str) -> Result<(), LocalizationError>;

    /// Text for `key` in the chat's locale. Falls back to the default
    /// locale, then to the key itself.
    fn text(&self, chat: Option<ChatId>, key: &str) -> String;
}

type Table = &'static [(&'static str, &'static str)];

const EN_US: Table = &[
    ("pong", "Pong!"),
    ("command_failed", "Something went wrong while running that command."),
    ("bad_usage", "Usage: {usage}"),
    ("help_header", "Available commands:"),
    ("help_unknown", "There is no such command."),
    ("locale_current", "This chat uses {locale}."),
    ("locale_set", "Language switched to {locale}."),
    ("locale_unsupported", "Unsupported language. Pick one of: {locales}"),
    ("locale_owner_only", "Only bot owners can change the language."),
    ("search_empty", "Nothing found."),
    ("admins_unknown", "Members of this chat were not synced."),
    ("admins_header", "{count} members, administrators:"),
];

const RU_RU: Table = &[
    ("pong", "Понг!"),
    ("command_failed", "Во время выполнения команды что-то пошло не так."),
    ("bad_usage", "Использование: {usage}"),
    ("help_header", "Доступные команды:"),
    ("help_unknown", "Такой команды нет."),
    ("locale_current", "В этом чате используется {locale}."),
    ("locale_set", "Язык изменён на {locale}."),
    ("locale_unsupported", "Язык не поддерживается. Доступны: {locales}"),
    ("locale_owner_only", "Менять язык могут только владельцы бота."),
    ("search_empty", "Ничего не найдено."),
    ("admins_unknown", "Участники этого чата не синхронизированы."),
    ("admins_header", "Участников: {count}, администраторы:"),
];

const TABLES: &[(&str, Table)] = &[("en-US", EN_US), ("ru-RU", RU_RU)];

fn lookup(locale: &str, key: &str) -> Option<&'static str> {
    let (_, table) = TABLES.iter().find(|(name, _)| *name == locale)?;
    table.iter().find(|(k, _)| *k == key).map(|(_, text)| *text)
}

/// Built-in string tables with per-chat language overrides kept in memory
pub struct Localizer {
    default_locale: String,
    chat_locales: RwLock<HashMap<ChatId, String>>,
}

impl Localizer {
    pub fn new(default_locale: &str) -> Result<Self, LocalizationError> {
        if !TABLES.iter().any(|(name, _)| *name == default_locale) {
            return Err(LocalizationError::UnsupportedLocale(default_locale.into()));
        }
        Ok(Self {
            default_locale: default_locale.into(),
            chat_locales: RwLock::new(HashMap::new()),
        })
    }
}

impl Localization for Localizer {
    fn default_locale(&self) -> &str {
        &self.default_locale
    }

    fn supported_locales(&self) -> Vec<&'static str> {
        TABLES.iter().map(|(name, _)| *name).collect()
    }

    fn chat_locale(&self, chat: ChatId) -> String {
        read_lock(&self.chat_locales)
            .get(&chat)
            .cloned()
            .unwrap_or_else(|| self.default_locale.clone())
    }

    fn set_chat_locale(&self, chat: ChatId, locale: &str) -> Result<(), LocalizationError> {
        let Some((name, _)) = TABLES.iter().find(|(name, _)| name.eq_ignore_ascii_case(locale)) else {
            return Err(LocalizationError::UnsupportedLocale(locale.into()));
        };
        write_lock(&self.chat_locales).insert(chat, name.to_string());
        Ok(())
    }

    fn text(&self, chat: Option<ChatId>, key: &str) -> String {
        let locale = match chat {
            Some(chat) => self.chat_locale(chat),
            None => self.default_locale.clone(),
        };
        lookup(&locale, key)
            .or_else(|| lookup(&self.default_locale, key))
            .unwrap_or(key)
            .to_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chat_overrides_and_fallbacks() {
        let localizer = Localizer::new("en-US").unwrap();
        assert_eq!(localizer.text(Some(1), "pong"), "Pong!");

        localizer.set_chat_locale(1, "RU-ru").unwrap();
        assert_eq!(localizer.chat_locale(1), "ru-RU");
        assert_eq!(localizer.text(Some(1), "pong"), "Понг!");
        assert_eq!(localizer.text(Some(2), "pong"), "Pong!");
        assert_eq!(localizer.text(None, "missing_key"), "missing_key");
    }

    #[test]
    fn unknown_locales_are_rejected() {
        assert!(Localizer::new("xx-XX").is_err());
        let localizer = Localizer::new("ru-RU").unwrap();
        assert_eq!(
            localizer.set_chat_locale(5, "de-DE"),
            Err(LocalizationError::UnsupportedLocale("de-DE".into()))
        );
        assert_eq!(localizer.chat_locale(5), "ru-RU");
    }

    #[test]
    fn every_table_has_the_same_keys() {
        for (name, table) in TABLES {
            assert_eq!(table.len(), EN_US.len(), "{}", name);
            for (key, _) in EN_US.iter() {
                assert!(lookup(name, key).is_some(), "{} lacks {}", name, key);
            }
        }
    }
}
