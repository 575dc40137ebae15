//! Telegram bot free channel
//!
//! Sends the verification text as a bot message via the Bot API
//! `sendMessage` method. Phones without a registered chat fail with
//! `RecipientUnknown` before any HTTP call is made.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info, warn};

use st_core::{DeliveryError, FreeChannel};
use st_shared::config::TelegramConfig;
use st_shared::phone::mask_phone_number;

use super::directory::ChatDirectory;
use super::transport_error;
use crate::InfrastructureError;

#[derive(Debug, Serialize)]
struct SendMessageRequest<'a> {
    chat_id: i64,
    text: &'a str,
}

#[derive(Debug, Deserialize)]
struct BotApiResponse {
    ok: bool,
    #[serde(default)]
    error_code: Option<u16>,
    #[serde(default)]
    description: Option<String>,
}

/// Telegram bot delivering codes to users who shared their phone with it
pub struct TelegramBotChannel<D> {
    http: reqwest::Client,
    config: TelegramConfig,
    directory: D,
}

impl<D: ChatDirectory> TelegramBotChannel<D> {
    pub fn new(config: TelegramConfig, directory: D) -> Result<Self, InfrastructureError> {
        if !config.is_configured() {
            return Err(InfrastructureError::Config(
                "TELEGRAM_BOT_TOKEN not set".to_string(),
            ));
        }

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;

        info!("Telegram bot channel initialized with API {}", config.api_url);

        Ok(Self {
            http,
            config,
            directory,
        })
    }

    pub fn directory(&self) -> &D {
        &self.directory
    }

    fn send_message_url(&self) -> String {
        format!(
            "{}/bot{}/sendMessage",
            self.config.api_url.trim_end_matches('/'),
            self.config.bot_token
        )
    }
}

/// Map a Bot API reply to the delivery result
pub(crate) fn interpret_bot_response(status: u16, body: &str) -> Result<(), DeliveryError> {
    let reply: BotApiResponse = match serde_json::from_str(body) {
        Ok(reply) => reply,
        Err(_) => {
            return Err(DeliveryError::Provider(format!(
                "Unreadable Bot API response (HTTP {})",
                status
            )))
        }
    };

    if reply.ok {
        return Ok(());
    }

    let description = reply
        .description
        .unwrap_or_else(|| "Unknown error".to_string());
    match reply.error_code.unwrap_or(status) {
        401 | 404 => Err(DeliveryError::Authentication(description)),
        // Bot blocked by the user or the account was deactivated
        403 => Err(DeliveryError::RecipientUnknown),
        400 if description.to_lowercase().contains("chat not found") => {
            Err(DeliveryError::RecipientUnknown)
        }
        _ => Err(DeliveryError::Provider(description)),
    }
}

#[async_trait]
impl<D: ChatDirectory> FreeChannel for TelegramBotChannel<D> {
    fn name(&self) -> &str {
        "telegram"
    }

    async fn send(&self, phone: &str, text: &str) -> Result<(), DeliveryError> {
        let chat_id = match self.directory.chat_id(phone).await? {
            Some(chat_id) => chat_id,
            None => {
                debug!(
                    "No Telegram chat registered for {}",
                    mask_phone_number(phone)
                );
                return Err(DeliveryError::RecipientUnknown);
            }
        };

        let response = self
            .http
            .post(self.send_message_url())
            .json(&SendMessageRequest { chat_id, text })
            .send()
            .await
            .map_err(|e| transport_error(e, self.config.request_timeout_secs))?;

        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| transport_error(e, self.config.request_timeout_secs))?;

        match interpret_bot_response(status, &body) {
            Ok(()) => {
                info!("Telegram message sent to {}", mask_phone_number(phone));
                Ok(())
            }
            Err(DeliveryError::RecipientUnknown) => {
                warn!(
                    "Telegram chat of {} is no longer reachable, forgetting it",
                    mask_phone_number(phone)
                );
                if let Err(e) = self.directory.unregister(phone).await {
                    warn!("Failed to unregister Telegram chat: {}", e);
                }
                Err(DeliveryError::RecipientUnknown)
            }
            Err(e) => {
                warn!("Telegram delivery to {} failed: {}", mask_phone_number(phone), e);
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sms::directory::InMemoryChatDirectory;

    fn config() -> TelegramConfig {
        TelegramConfig {
            bot_token: "123456:ABC".to_string(),
            api_url: "http://127.0.0.1:9/".to_string(),
            request_timeout_secs: 1,
        }
    }

    #[test]
    fn test_successful_reply() {
        let body = r#"{"ok":true,"result":{"message_id":42}}"#;
        assert_eq!(interpret_bot_response(200, body), Ok(()));
    }

    #[test]
    fn test_blocked_bot_means_unknown_recipient() {
        let body = r#"{"ok":false,"error_code":403,"description":"Forbidden: bot was blocked by the user"}"#;
        assert_eq!(
            interpret_bot_response(403, body),
            Err(DeliveryError::RecipientUnknown)
        );

        let body = r#"{"ok":false,"error_code":400,"description":"Bad Request: chat not found"}"#;
        assert_eq!(
            interpret_bot_response(400, body),
            Err(DeliveryError::RecipientUnknown)
        );
    }

    #[test]
    fn test_bad_token_is_authentication_error() {
        let body = r#"{"ok":false,"error_code":401,"description":"Unauthorized"}"#;
        assert_eq!(
            interpret_bot_response(401, body),
            Err(DeliveryError::Authentication("Unauthorized".to_string()))
        );
    }

    #[test]
    fn test_other_failures_are_provider_errors() {
        let body = r#"{"ok":false,"error_code":429,"description":"Too Many Requests: retry after 5"}"#;
        assert!(matches!(
            interpret_bot_response(429, body),
            Err(DeliveryError::Provider(_))
        ));
        assert!(matches!(
            interpret_bot_response(502, "<html>Bad Gateway</html>"),
            Err(DeliveryError::Provider(_))
        ));
    }

    #[test]
    fn test_url_strips_trailing_slash() {
        let channel = TelegramBotChannel::new(config(), InMemoryChatDirectory::new()).unwrap();
        assert_eq!(
            channel.send_message_url(),
            "http://127.0.0.1:9/bot123456:ABC/sendMessage"
        );
    }

    #[test]
    fn test_missing_token_rejected() {
        let result = TelegramBotChannel::new(TelegramConfig::default(), InMemoryChatDirectory::new());
        assert!(matches!(result, Err(InfrastructureError::Config(_))));
    }

    #[tokio::test]
    async fn test_unregistered_phone_fails_without_request() {
        let channel = TelegramBotChannel::new(config(), InMemoryChatDirectory::new()).unwrap();

        let result = channel.send("+998901234567", "code 123456").await;

        assert_eq!(result, Err(DeliveryError::RecipientUnknown));
    }
}
