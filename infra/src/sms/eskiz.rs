//! Eskiz SMS gateway paid channel
//!
//! ## Protocol
//!
//! - `POST {api}/auth/login` with `email` and `password` returns a bearer
//!   token under `data.token`
//! - `POST {api}/message/sms/send` with `mobile_phone` (digits only),
//!   `message` and `from` returns the message id
//!
//! Tokens are cached for `token_ttl_hours` and renewed once when the gateway
//! answers 401.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use serde_json::Value;
use std::time::Duration as StdDuration;
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

use st_core::{DeliveryError, PaidChannel, PaidReceipt};
use st_shared::config::EskizConfig;
use st_shared::phone::mask_phone_number;

use super::transport_error;
use crate::InfrastructureError;

/// Longest text accepted by the gateway in one request
pub const MAX_MESSAGE_CHARS: usize = 918;

#[derive(Debug, Clone)]
struct CachedToken {
    value: String,
    expires_at: DateTime<Utc>,
}

impl CachedToken {
    fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at
    }
}

#[derive(Debug, Serialize)]
struct LoginRequest<'a> {
    email: &'a str,
    password: &'a str,
}

#[derive(Debug, Serialize)]
struct SendSmsRequest<'a> {
    mobile_phone: String,
    message: &'a str,
    from: &'a str,
}

/// Outcome of a send request before token handling
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum SendReply {
    Accepted(String),
    TokenRejected,
}

/// Eskiz gateway client
pub struct EskizSmsChannel {
    http: reqwest::Client,
    config: EskizConfig,
    token: RwLock<Option<CachedToken>>,
}

impl EskizSmsChannel {
    pub fn new(config: EskizConfig) -> Result<Self, InfrastructureError> {
        if !config.is_configured() {
            return Err(InfrastructureError::Config(
                "ESKIZ_EMAIL and ESKIZ_PASSWORD must be set".to_string(),
            ));
        }

        let http = reqwest::Client::builder()
            .timeout(StdDuration::from_secs(config.request_timeout_secs))
            .build()?;

        info!(
            "Eskiz SMS channel initialized with sender id {}",
            config.sender_id
        );

        Ok(Self {
            http,
            config,
            token: RwLock::new(None),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.config.api_url.trim_end_matches('/'), path)
    }

    fn timeout_secs(&self) -> u64 {
        self.config.request_timeout_secs
    }

    /// Current token, logging in when none is cached or it has lapsed
    async fn access_token(&self) -> Result<String, DeliveryError> {
        if let Some(token) = self.token.read().await.as_ref() {
            if token.is_valid_at(Utc::now()) {
                return Ok(token.value.clone());
            }
        }

        let mut slot = self.token.write().await;
        // Another task may have logged in while we waited for the lock
        if let Some(token) = slot.as_ref() {
            if token.is_valid_at(Utc::now()) {
                return Ok(token.value.clone());
            }
        }

        let value = self.login().await?;
        *slot = Some(CachedToken {
            value: value.clone(),
            expires_at: Utc::now() + Duration::hours(self.config.token_ttl_hours),
        });
        Ok(value)
    }

    async fn invalidate_token(&self) {
        *self.token.write().await = None;
    }

    async fn login(&self) -> Result<String, DeliveryError> {
        debug!("Requesting Eskiz access token");

        let response = self
            .http
            .post(self.url("auth/login"))
            .json(&LoginRequest {
                email: &self.config.email,
                password: &self.config.password,
            })
            .send()
            .await
            .map_err(|e| transport_error(e, self.timeout_secs()))?;

        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| transport_error(e, self.timeout_secs()))?;

        let token = interpret_login_response(status, &body).map_err(|e| {
            error!("Eskiz authentication failed: {}", e);
            e
        })?;
        info!("Eskiz access token renewed");
        Ok(token)
    }

    async fn post_sms(&self, token: &str, phone: &str, text: &str) -> Result<SendReply, DeliveryError> {
        let response = self
            .http
            .post(self.url("message/sms/send"))
            .bearer_auth(token)
            .json(&SendSmsRequest {
                mobile_phone: gateway_phone(phone),
                message: text,
                from: &self.config.sender_id,
            })
            .send()
            .await
            .map_err(|e| transport_error(e, self.timeout_secs()))?;

        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| transport_error(e, self.timeout_secs()))?;

        interpret_send_response(status, &body)
    }
}

/// Eskiz expects the number without the leading `+`
pub(crate) fn gateway_phone(phone: &str) -> String {
    phone.chars().filter(|c| c.is_ascii_digit()).collect()
}

fn provider_message(json: &Value) -> Option<String> {
    json.get("message").and_then(|m| match m {
        Value::String(text) => Some(text.clone()),
        Value::Null => None,
        other => Some(other.to_string()),
    })
}

pub(crate) fn interpret_login_response(status: u16, body: &str) -> Result<String, DeliveryError> {
    let json: Value = serde_json::from_str(body).unwrap_or(Value::Null);

    if (200..300).contains(&status) {
        if let Some(token) = json.pointer("/data/token").and_then(Value::as_str) {
            if !token.is_empty() {
                return Ok(token.to_string());
            }
        }
    }

    let reason = provider_message(&json).unwrap_or_else(|| format!("HTTP {}", status));
    Err(DeliveryError::Authentication(reason))
}

pub(crate) fn interpret_send_response(status: u16, body: &str) -> Result<SendReply, DeliveryError> {
    if status == 401 {
        return Ok(SendReply::TokenRejected);
    }

    let json: Value = serde_json::from_str(body).unwrap_or(Value::Null);
    if (200..300).contains(&status) {
        let accepted = matches!(
            json.get("status").and_then(Value::as_str),
            Some("success") | Some("waiting")
        );
        let id = json
            .pointer("/data/id")
            .or_else(|| json.get("id"))
            .and_then(|id| match id {
                Value::String(s) => Some(s.clone()),
                Value::Number(n) => Some(n.to_string()),
                _ => None,
            });
        if let (true, Some(id)) = (accepted, id) {
            return Ok(SendReply::Accepted(id));
        }
    }

    let reason = provider_message(&json).unwrap_or_else(|| format!("HTTP {}", status));
    Err(DeliveryError::Provider(reason))
}

#[async_trait]
impl PaidChannel for EskizSmsChannel {
    fn name(&self) -> &str {
        "eskiz"
    }

    async fn send(&self, phone: &str, text: &str) -> Result<PaidReceipt, DeliveryError> {
        if text.chars().count() > MAX_MESSAGE_CHARS {
            return Err(DeliveryError::Provider(format!(
                "Message exceeds maximum length of {} characters",
                MAX_MESSAGE_CHARS
            )));
        }

        info!(
            "Sending SMS to {} via Eskiz (message length: {} chars)",
            mask_phone_number(phone),
            text.chars().count()
        );

        let token = self.access_token().await?;
        let reply = match self.post_sms(&token, phone, text).await? {
            SendReply::TokenRejected => {
                warn!("Eskiz rejected the cached token, logging in again");
                self.invalidate_token().await;
                let token = self.access_token().await?;
                self.post_sms(&token, phone, text).await?
            }
            accepted => accepted,
        };

        match reply {
            SendReply::Accepted(message_id) => {
                info!(
                    "SMS accepted by Eskiz for {} with id {}",
                    mask_phone_number(phone),
                    message_id
                );
                Ok(PaidReceipt { message_id })
            }
            SendReply::TokenRejected => {
                self.invalidate_token().await;
                Err(DeliveryError::Authentication(
                    "Access token rejected after renewal".to_string(),
                ))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> EskizConfig {
        EskizConfig {
            api_url: "http://127.0.0.1:9/api/".to_string(),
            email: "ops@saytoai.uz".to_string(),
            password: "secret".to_string(),
            request_timeout_secs: 1,
            ..Default::default()
        }
    }

    #[test]
    fn test_gateway_phone_drops_plus() {
        assert_eq!(gateway_phone("+998901234567"), "998901234567");
    }

    #[test]
    fn test_login_reads_nested_token() {
        let body = r#"{"message":"token_generated","data":{"token":"eyJ0eXAi"},"token_type":"bearer"}"#;
        assert_eq!(interpret_login_response(200, body), Ok("eyJ0eXAi".to_string()));
    }

    #[test]
    fn test_login_failure_is_authentication_error() {
        let body = r#"{"message":"Invalid credentials"}"#;
        assert_eq!(
            interpret_login_response(401, body),
            Err(DeliveryError::Authentication("Invalid credentials".to_string()))
        );
        assert_eq!(
            interpret_login_response(500, ""),
            Err(DeliveryError::Authentication("HTTP 500".to_string()))
        );
    }

    #[test]
    fn test_send_accepted_with_nested_or_flat_id() {
        let nested = r#"{"status":"success","data":{"id":"4385062"}}"#;
        assert_eq!(
            interpret_send_response(200, nested),
            Ok(SendReply::Accepted("4385062".to_string()))
        );

        let flat = r#"{"id":"c5f1a2","message":"Waiting for SMS provider","status":"waiting"}"#;
        assert_eq!(
            interpret_send_response(200, flat),
            Ok(SendReply::Accepted("c5f1a2".to_string()))
        );
    }

    #[test]
    fn test_send_unauthorized_requests_new_token() {
        assert_eq!(
            interpret_send_response(401, r#"{"message":"Expired"}"#),
            Ok(SendReply::TokenRejected)
        );
    }

    #[test]
    fn test_send_rejection_is_provider_error() {
        let body = r#"{"status":"error","message":"Insufficient balance"}"#;
        assert_eq!(
            interpret_send_response(400, body),
            Err(DeliveryError::Provider("Insufficient balance".to_string()))
        );
        assert!(matches!(
            interpret_send_response(200, r#"{"status":"success"}"#),
            Err(DeliveryError::Provider(_))
        ));
    }

    #[test]
    fn test_url_joins_paths() {
        let channel = EskizSmsChannel::new(config()).unwrap();
        assert_eq!(
            channel.url("auth/login"),
            "http://127.0.0.1:9/api/auth/login"
        );
    }

    #[test]
    fn test_unconfigured_channel_rejected() {
        assert!(matches!(
            EskizSmsChannel::new(EskizConfig::default()),
            Err(InfrastructureError::Config(_))
        ));
    }

    #[tokio::test]
    async fn test_overlong_message_rejected_before_network() {
        let channel = EskizSmsChannel::new(config()).unwrap();
        let text = "x".repeat(MAX_MESSAGE_CHARS + 1);

        let result = channel.send("+998901234567", &text).await;

        assert!(matches!(result, Err(DeliveryError::Provider(_))));
    }

    #[test]
    fn test_cached_token_validity() {
        let now = Utc::now();
        let token = CachedToken {
            value: "t".to_string(),
            expires_at: now + Duration::hours(1),
        };
        assert!(token.is_valid_at(now));
        assert!(!token.is_valid_at(now + Duration::hours(2)));
    }
}
