//! Delivery channel configuration

use serde::{Deserialize, Serialize};

use super::env_or;

/// Telegram bot used as the free delivery channel
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TelegramConfig {
    /// Bot token issued by BotFather
    pub bot_token: String,

    /// Bot API base URL
    #[serde(default = "default_telegram_api_url")]
    pub api_url: String,

    /// Timeout for a single Bot API request in seconds
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            bot_token: String::new(),
            api_url: default_telegram_api_url(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

impl TelegramConfig {
    /// Create from `TELEGRAM_*` environment variables
    pub fn from_env() -> Self {
        let d = Self::default();
        Self {
            bot_token: std::env::var("TELEGRAM_BOT_TOKEN").unwrap_or(d.bot_token),
            api_url: std::env::var("TELEGRAM_API_URL").unwrap_or(d.api_url),
            request_timeout_secs: env_or("TELEGRAM_REQUEST_TIMEOUT_SECS", d.request_timeout_secs),
        }
    }

    /// Whether a bot token has been provided
    pub fn is_configured(&self) -> bool {
        !self.bot_token.is_empty()
    }
}

/// Eskiz SMS gateway used as the paid delivery channel
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EskizConfig {
    /// Gateway API base URL
    #[serde(default = "default_eskiz_api_url")]
    pub api_url: String,

    /// Account email used to obtain an access token
    pub email: String,

    /// Account password used to obtain an access token
    pub password: String,

    /// Sender id shown to the recipient
    #[serde(default = "default_sender_id")]
    pub sender_id: String,

    /// How long an access token is trusted before renewal, in hours
    #[serde(default = "default_token_ttl_hours")]
    pub token_ttl_hours: i64,

    /// Timeout for a single gateway request in seconds
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl Default for EskizConfig {
    fn default() -> Self {
        Self {
            api_url: default_eskiz_api_url(),
            email: String::new(),
            password: String::new(),
            sender_id: default_sender_id(),
            token_ttl_hours: default_token_ttl_hours(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

impl EskizConfig {
    /// Create from `ESKIZ_*` environment variables
    pub fn from_env() -> Self {
        let d = Self::default();
        Self {
            api_url: std::env::var("ESKIZ_API_URL").unwrap_or(d.api_url),
            email: std::env::var("ESKIZ_EMAIL").unwrap_or(d.email),
            password: std::env::var("ESKIZ_PASSWORD").unwrap_or(d.password),
            sender_id: std::env::var("ESKIZ_SENDER_ID").unwrap_or(d.sender_id),
            token_ttl_hours: env_or("ESKIZ_TOKEN_TTL_HOURS", d.token_ttl_hours),
            request_timeout_secs: env_or("ESKIZ_REQUEST_TIMEOUT_SECS", d.request_timeout_secs),
        }
    }

    /// Whether account credentials have been provided
    pub fn is_configured(&self) -> bool {
        !self.email.is_empty() && !self.password.is_empty()
    }
}

fn default_telegram_api_url() -> String {
    String::from("https://api.telegram.org")
}

fn default_eskiz_api_url() -> String {
    String::from("https://notify.eskiz.uz/api")
}

fn default_sender_id() -> String {
    String::from("4546")
}

fn default_token_ttl_hours() -> i64 {
    23
}

fn default_request_timeout_secs() -> u64 {
    30
}
