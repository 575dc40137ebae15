//! Redis-backed phone to Telegram chat directory
//!
//! Keys are `{prefix}:telegram:chat:{phone}` holding the chat id, without
//! expiry.

use async_trait::async_trait;
use tracing::warn;

use st_core::DeliveryError;
use st_shared::phone::normalize_phone_number;

use super::redis_client::RedisClient;
use crate::sms::directory::ChatDirectory;
use crate::InfrastructureError;

#[derive(Clone)]
pub struct RedisChatDirectory {
    client: RedisClient,
}

impl RedisChatDirectory {
    pub fn new(client: RedisClient) -> Self {
        Self { client }
    }

    fn key(&self, phone: &str) -> String {
        chat_key(self.client.key_prefix(), phone)
    }
}

pub(crate) fn chat_key(prefix: &str, phone: &str) -> String {
    format!("{}:telegram:chat:{}", prefix, normalize_phone_number(phone))
}

fn lookup_error(err: InfrastructureError) -> DeliveryError {
    DeliveryError::Transport(format!("Chat directory unavailable: {}", err))
}

#[async_trait]
impl ChatDirectory for RedisChatDirectory {
    async fn chat_id(&self, phone: &str) -> Result<Option<i64>, DeliveryError> {
        let raw = self.client.get(&self.key(phone)).await.map_err(lookup_error)?;

        match raw {
            Some(raw) => match raw.trim().parse::<i64>() {
                Ok(chat_id) => Ok(Some(chat_id)),
                Err(_) => {
                    warn!("Ignoring malformed Telegram chat id in directory");
                    Ok(None)
                }
            },
            None => Ok(None),
        }
    }

    async fn register(&self, phone: &str, chat_id: i64) -> Result<(), DeliveryError> {
        self.client
            .set(&self.key(phone), &chat_id.to_string())
            .await
            .map_err(lookup_error)
    }

    async fn unregister(&self, phone: &str) -> Result<(), DeliveryError> {
        self.client
            .delete(&self.key(phone))
            .await
            .map(|_| ())
            .map_err(lookup_error)
    }
}
