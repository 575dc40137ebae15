//! Phone to Telegram chat lookup
//!
//! The bot can only message users who opened a chat with it and shared their
//! phone number. Whoever handles the bot's updates registers that pairing
//! here; the free channel reads it.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use st_core::DeliveryError;
use st_shared::phone::normalize_phone_number;

/// Lookup of Telegram chat ids by canonical phone number
#[async_trait]
pub trait ChatDirectory: Send + Sync {
    /// Chat id registered for `phone`, if any
    async fn chat_id(&self, phone: &str) -> Result<Option<i64>, DeliveryError>;

    /// Remember that `phone` is reachable in `chat_id`
    async fn register(&self, phone: &str, chat_id: i64) -> Result<(), DeliveryError>;

    /// Forget `phone`, e.g. after the user blocked the bot
    async fn unregister(&self, phone: &str) -> Result<(), DeliveryError>;
}

#[async_trait]
impl<T: ChatDirectory + ?Sized> ChatDirectory for Arc<T> {
    async fn chat_id(&self, phone: &str) -> Result<Option<i64>, DeliveryError> {
        (**self).chat_id(phone).await
    }

    async fn register(&self, phone: &str, chat_id: i64) -> Result<(), DeliveryError> {
        (**self).register(phone, chat_id).await
    }

    async fn unregister(&self, phone: &str) -> Result<(), DeliveryError> {
        (**self).unregister(phone).await
    }
}

/// Process-local directory for development and tests
#[derive(Debug, Clone, Default)]
pub struct InMemoryChatDirectory {
    chats: Arc<RwLock<HashMap<String, i64>>>,
}

impl InMemoryChatDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.chats.read().await.len()
    }
}

#[async_trait]
impl ChatDirectory for InMemoryChatDirectory {
    async fn chat_id(&self, phone: &str) -> Result<Option<i64>, DeliveryError> {
        let phone = normalize_phone_number(phone);
        Ok(self.chats.read().await.get(&phone).copied())
    }

    async fn register(&self, phone: &str, chat_id: i64) -> Result<(), DeliveryError> {
        self.chats
            .write()
            .await
            .insert(normalize_phone_number(phone), chat_id);
        Ok(())
    }

    async fn unregister(&self, phone: &str) -> Result<(), DeliveryError> {
        self.chats
            .write()
            .await
            .remove(&normalize_phone_number(phone));
        Ok(())
    }
}
