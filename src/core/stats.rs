use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Instant;

use crate::config::PACKAGE_VERSION;
use crate::prelude::*;

/// Process-wide counters for the status line
pub struct StatsService {
    started: Instant,
    gateway: Arc<dyn Gateway>,
    commands: Arc<CommandRegistry>,
    messages_seen: AtomicU64,
    commands_ran: AtomicU64,
    synced: RwLock<SyncReport>,
    loaded_modules: AtomicUsize,
}

impl StatsService {
    pub fn new(gateway: Arc<dyn Gateway>, commands: Arc<CommandRegistry>) -> Self {
        Self {
            started: Instant::now(),
            gateway,
            commands,
            messages_seen: AtomicU64::new(0),
            commands_ran: AtomicU64::new(0),
            synced: RwLock::new(SyncReport::default()),
            loaded_modules: AtomicUsize::new(0),
        }
    }

    pub fn message_seen(&self) {
        self.messages_seen.fetch_add(1, Ordering::Relaxed);
    }

    pub fn command_ran(&self) {
        self.commands_ran.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_sync(&self, report: SyncReport) {
        *write_lock(&self.synced) = report;
    }

    pub fn record_load(&self, summary: LoadSummary) {
        self.loaded_modules.store(summary.modules, Ordering::Relaxed);
    }

    pub fn messages_seen(&self) -> u64 {
        self.messages_seen.load(Ordering::Relaxed)
    }

    pub fn commands_ran(&self) -> u64 {
        self.commands_ran.load(Ordering::Relaxed)
    }

    pub fn print(&self) -> String {
        let bot = match self.gateway.identity() {
            Some(identity) => format!("@{} ({})", identity.username, identity.id),
            None => "not authenticated".to_owned(),
        };
        let synced = *read_lock(&self.synced);
        format!(
            "Kestrel v{} | {} | uptime {} | commands: {} in {} modules | ran: {} | messages: {} | chats: {} | members: {}",
            PACKAGE_VERSION,
            bot,
            format_uptime(self.started.elapsed()),
            self.commands.len(),
            self.loaded_modules.load(Ordering::Relaxed),
            self.commands_ran(),
            self.messages_seen(),
            synced.chats,
            synced.members,
        )
    }
}
