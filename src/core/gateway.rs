use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::mpsc;

pub type ChatId = i64;

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("`{method}` was rejected: {description}")]
    Rejected {
        method: &'static str,
        description: String,
    },
    #[error("transport failure")]
    Transport(#[from] reqwest::Error),
    #[error("not authenticated yet")]
    NotAuthenticated,
    #[error("not connected")]
    NotConnected,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BotIdentity {
    pub id: i64,
    pub username: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Author {
    pub id: i64,
    pub display_name: String,
}

/// A text message arriving from a chat the bot is in
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncomingMessage {
    pub chat: ChatId,
    pub author: Option<Author>,
    pub text: String,
}

/// Members known for one chat after a bulk sync
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ChatSnapshot {
    pub chat: ChatId,
    pub member_count: u64,
    pub administrators: Vec<Author>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SyncReport {
    pub chats: usize,
    pub members: u64,
}

/// The real-time messaging endpoint.
///
/// Startup drives `authenticate`, `connect` and `sync_all_members` in that
/// order. Once connected, the gateway keeps itself alive and owns its
/// reconnect policy.
#[async_trait]
pub trait Gateway: Send + Sync {
    async fn authenticate(&self, token: &str) -> Result<(), GatewayError>;

    async fn connect(&self) -> Result<(), GatewayError>;

    async fn sync_all_members(&self) -> Result<SyncReport, GatewayError>;

    async fn send_message(&self, chat: ChatId, text: &str) -> Result<(), GatewayError>;

    async fn disconnect(&self);

    /// Incoming messages. Handed out once, later calls get `None`.
    fn incoming(&self) -> Option<mpsc::Receiver<IncomingMessage>>;

    fn identity(&self) -> Option<BotIdentity>;

    fn member_snapshot(&self, chat: ChatId) -> Option<ChatSnapshot>;
}
