//! Fakes shared by the unit tests

use std::sync::Mutex;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::prelude::*;

pub const SPY_CHAT: ChatId = -100;

/// Gateway that records which operations were invoked and can be told to
/// fail, or never answer, at one of them
pub struct SpyGateway {
    fail_at: Option<&'static str>,
    hang_at: Option<&'static str>,
    calls: Mutex<Vec<&'static str>>,
    sent: Mutex<Vec<(ChatId, String)>>,
    sender: mpsc::Sender<IncomingMessage>,
    receiver: Mutex<Option<mpsc::Receiver<IncomingMessage>>>,
}

impl Default for SpyGateway {
    fn default() -> Self {
        let (sender, receiver) = mpsc::channel(16);
        Self {
            fail_at: None,
            hang_at: None,
            calls: Mutex::new(Vec::new()),
            sent: Mutex::new(Vec::new()),
            sender,
            receiver: Mutex::new(Some(receiver)),
        }
    }
}

impl SpyGateway {
    pub fn failing_at(operation: &'static str) -> Self {
        Self {
            fail_at: Some(operation),
            ..Default::default()
        }
    }

    pub fn hanging_at(operation: &'static str) -> Self {
        Self {
            hang_at: Some(operation),
            ..Default::default()
        }
    }

    pub fn calls(&self) -> Vec<&'static str> {
        lock(&self.calls).clone()
    }

    pub fn sent(&self) -> Vec<(ChatId, String)> {
        lock(&self.sent).clone()
    }

    pub async fn push(&self, chat: ChatId, text: &str) {
        let message = IncomingMessage {
            chat,
            author: Some(Author {
                id: 7,
                display_name: "Ann".into(),
            }),
            text: text.into(),
        };
        self.sender.send(message).await.unwrap();
    }

    async fn record(&self, operation: &'static str) -> Result<(), GatewayError> {
        lock(&self.calls).push(operation);
        if self.hang_at == Some(operation) {
            std::future::pending::<()>().await;
        }
        if self.fail_at == Some(operation) {
            return Err(GatewayError::Rejected {
                method: operation,
                description: "refused by spy".into(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl Gateway for SpyGateway {
    async fn authenticate(&self, _token: &str) -> Result<(), GatewayError> {
        self.record("authenticate").await
    }

    async fn connect(&self) -> Result<(), GatewayError> {
        self.record("connect").await
    }

    async fn sync_all_members(&self) -> Result<SyncReport, GatewayError> {
        self.record("sync_all_members").await?;
        Ok(SyncReport { chats: 1, members: 12 })
    }

    async fn send_message(&self, chat: ChatId, text: &str) -> Result<(), GatewayError> {
        lock(&self.sent).push((chat, text.to_owned()));
        Ok(())
    }

    async fn disconnect(&self) {
        lock(&self.calls).push("disconnect");
    }

    fn incoming(&self) -> Option<mpsc::Receiver<IncomingMessage>> {
        lock(&self.receiver).take()
    }

    fn identity(&self) -> Option<BotIdentity> {
        Some(BotIdentity {
            id: 1,
            username: "spy_bot".into(),
        })
    }

    fn member_snapshot(&self, chat: ChatId) -> Option<ChatSnapshot> {
        (chat == SPY_CHAT).then(|| ChatSnapshot {
            chat,
            member_count: 12,
            administrators: vec![Author {
                id: 7,
                display_name: "Ann".into(),
            }],
        })
    }
}
