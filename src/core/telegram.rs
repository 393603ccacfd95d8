use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::prelude::*;

const POLL_TIMEOUT_SECS: u64 = 30;
const RETRY_DELAY: Duration = Duration::from_secs(5);
const INCOMING_CAPACITY: usize = 256;

#[derive(Deserialize)]
struct ApiReply<T> {
    ok: bool,
    description: Option<String>,
    result: Option<T>,
}

impl<T> ApiReply<T> {
    fn into_result(self, method: &'static str) -> Result<T, GatewayError> {
        match (self.ok, self.result) {
            (true, Some(result)) => Ok(result),
            (_, _) => Err(GatewayError::Rejected {
                method,
                description: self
                    .description
                    .unwrap_or_else(|| "no description".to_owned()),
            }),
        }
    }
}

#[derive(Deserialize, Debug)]
struct User {
    id: i64,
    first_name: String,
    last_name: Option<String>,
    username: Option<String>,
}

impl From<User> for Author {
    fn from(user: User) -> Self {
        Author {
            id: user.id,
            display_name: format_user_name(
                &user.first_name,
                user.last_name.as_deref(),
                user.username.as_deref(),
            ),
        }
    }
}

#[derive(Deserialize, Debug)]
struct Chat {
    id: i64,
}

#[derive(Deserialize, Debug)]
struct Message {
    chat: Chat,
    from: Option<User>,
    text: Option<String>,
}

#[derive(Deserialize, Debug)]
struct Update {
    update_id: i64,
    message: Option<Message>,
}

impl Update {
    fn into_incoming(self) -> Option<IncomingMessage> {
        let message = self.message?;
        Some(IncomingMessage {
            chat: message.chat.id,
            author: message.from.map(Author::from),
            text: message.text?,
        })
    }
}

#[derive(Deserialize, Debug)]
struct ChatMember {
    user: User,
}

struct Inner {
    http: reqwest::Client,
    api_base: String,
    sync_chats: Vec<ChatId>,
    logger: Logger,
    token: RwLock<Option<String>>,
    identity: RwLock<Option<BotIdentity>>,
    members: RwLock<HashMap<ChatId, ChatSnapshot>>,
    sender: mpsc::Sender<IncomingMessage>,
    receiver: Mutex<Option<mpsc::Receiver<IncomingMessage>>>,
    poller: Mutex<Option<JoinHandle<()>>>,
}

impl Inner {
    async fn call<T>(&self, method: &'static str, params: serde_json::Value) -> Result<T, GatewayError>
    where
        T: DeserializeOwned,
    {
        let token = read_lock(&self.token)
            .clone()
            .ok_or(GatewayError::NotAuthenticated)?;
        self.call_with(&token, method, params).await
    }

    async fn call_with<T>(
        &self,
        token: &str,
        method: &'static str,
        params: serde_json::Value,
    ) -> Result<T, GatewayError>
    where
        T: DeserializeOwned,
    {
        let url = format!("{}/bot{}/{}", self.api_base.trim_end_matches('/'), token, method);
        // Request URLs embed the token, keep it out of error messages
        let reply = self
            .http
            .post(url)
            .json(&params)
            .send()
            .await
            .map_err(reqwest::Error::without_url)?
            .json::<ApiReply<T>>()
            .await
            .map_err(reqwest::Error::without_url)?;
        reply.into_result(method)
    }

    async fn poll(self: Arc<Self>) {
        let mut offset: i64 = 0;
        loop {
            let params = json!({
                "offset": offset,
                "timeout": POLL_TIMEOUT_SECS,
                "allowed_updates": ["message"],
            });
            let updates = match self.call::<Vec<Update>>("getUpdates", params).await {
                Ok(updates) => updates,
                Err(why) => {
                    warn!(self.logger, "Polling for updates failed";
                        "reason" => why.to_string(),
                        "retry_in" => format!("{:?}", RETRY_DELAY),
                    );
                    tokio::time::sleep(RETRY_DELAY).await;
                    continue;
                }
            };
            for update in updates {
                offset = offset.max(update.update_id + 1);
                let Some(message) = update.into_incoming() else {
                    continue;
                };
                if self.sender.send(message).await.is_err() {
                    debug!(self.logger, "Nobody listens for incoming messages anymore");
                    return;
                }
            }
        }
    }
}

/// Telegram Bot API gateway: long polling for messages, plain method calls
/// for everything else
#[derive(Clone)]
pub struct TelegramGateway {
    inner: Arc<Inner>,
}

#[derive(Default)]
pub struct TelegramGatewayBuilder {
    logger: Option<Logger>,
    api_base: Option<String>,
    sync_chats: Vec<ChatId>,
}

impl TelegramGateway {
    pub fn new() -> TelegramGatewayBuilder {
        Default::default()
    }
}

impl TelegramGatewayBuilder {
    pub fn logger(self, logger: Logger) -> Self {
        Self {
            logger: Some(logger),
            ..self
        }
    }

    pub fn api_base(self, api_base: &str) -> Self {
        Self {
            api_base: Some(api_base.to_owned()),
            ..self
        }
    }

    /// Chats whose members are fetched during the bulk member sync
    pub fn sync_chats(self, chats: &[ChatId]) -> Self {
        Self {
            sync_chats: chats.to_vec(),
            ..self
        }
    }

    pub fn build(self) -> UResult<TelegramGateway> {
        let logger = self
            .logger
            .ok_or("Did not provide a logger for the telegram gateway")?;
        let api_base = self
            .api_base
            .ok_or("Did not provide an API base url for the telegram gateway")?;
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(POLL_TIMEOUT_SECS + 10))
            .build()?;
        let (sender, receiver) = mpsc::channel(INCOMING_CAPACITY);

        Ok(TelegramGateway {
            inner: Arc::new(Inner {
                http,
                api_base,
                sync_chats: self.sync_chats,
                logger,
                token: RwLock::new(None),
                identity: RwLock::new(None),
                members: RwLock::new(HashMap::new()),
                sender,
                receiver: Mutex::new(Some(receiver)),
                poller: Mutex::new(None),
            }),
        })
    }
}

#[async_trait]
impl Gateway for TelegramGateway {
    async fn authenticate(&self, token: &str) -> Result<(), GatewayError> {
        let me: User = self.inner.call_with(token, "getMe", json!({})).await?;
        let identity = BotIdentity {
            id: me.id,
            username: me.username.unwrap_or(me.first_name),
        };
        info!(self.inner.logger, "Authenticated"; "bot" => &identity.username, "id" => identity.id);
        *write_lock(&self.inner.identity) = Some(identity);
        *write_lock(&self.inner.token) = Some(token.to_owned());
        Ok(())
    }

    async fn connect(&self) -> Result<(), GatewayError> {
        if lock(&self.inner.poller).is_some() {
            return Ok(());
        }
        // getUpdates refuses to work while a webhook is set
        let _: bool = self
            .inner
            .call("deleteWebhook", json!({ "drop_pending_updates": false }))
            .await?;

        let mut poller = lock(&self.inner.poller);
        if poller.is_none() {
            *poller = Some(tokio::spawn(self.inner.clone().poll()));
            info!(self.inner.logger, "Long polling engaged");
        }
        Ok(())
    }

    async fn sync_all_members(&self) -> Result<SyncReport, GatewayError> {
        if lock(&self.inner.poller).is_none() {
            return Err(GatewayError::NotConnected);
        }
        let mut report = SyncReport::default();
        for &chat in &self.inner.sync_chats {
            let admins: Vec<ChatMember> = self
                .inner
                .call("getChatAdministrators", json!({ "chat_id": chat }))
                .await?;
            let member_count: u64 = self
                .inner
                .call("getChatMemberCount", json!({ "chat_id": chat }))
                .await?;
            let snapshot = ChatSnapshot {
                chat,
                member_count,
                administrators: admins.into_iter().map(|m| Author::from(m.user)).collect(),
            };
            debug!(self.inner.logger, "Chat members synced";
                "chat" => chat,
                "members" => member_count,
                "admins" => snapshot.administrators.len(),
            );
            report.chats += 1;
            report.members += member_count;
            write_lock(&self.inner.members).insert(chat, snapshot);
        }
        Ok(report)
    }

    async fn send_message(&self, chat: ChatId, text: &str) -> Result<(), GatewayError> {
        let _: serde_json::Value = self
            .inner
            .call("sendMessage", json!({ "chat_id": chat, "text": text }))
            .await?;
        Ok(())
    }

    async fn disconnect(&self) {
        if let Some(poller) = lock(&self.inner.poller).take() {
            poller.abort();
            info!(self.inner.logger, "Long polling stopped");
        }
    }

    fn incoming(&self) -> Option<mpsc::Receiver<IncomingMessage>> {
        lock(&self.inner.receiver).take()
    }

    fn identity(&self) -> Option<BotIdentity> {
        read_lock(&self.inner.identity).clone()
    }

    fn member_snapshot(&self, chat: ChatId) -> Option<ChatSnapshot> {
        read_lock(&self.inner.members).get(&chat).cloned()
    }
}
