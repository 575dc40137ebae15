//! Delivery channel adapters
//!
//! - **Telegram**: free channel through the SayToAI bot
//! - **Eskiz**: paid SMS gateway with token renewal
//! - **Logging**: development stand-ins that only log the text
//!
//! [`create_free_channel`] and [`create_paid_channel`] pick the real adapter
//! when its credentials are configured and fall back to logging otherwise.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::warn;

use st_core::{DeliveryError, FreeChannel, PaidChannel, PaidReceipt};
use st_shared::config::{EskizConfig, TelegramConfig};

use crate::InfrastructureError;

pub mod directory;
pub mod eskiz;
pub mod mock;
pub mod telegram;

pub use directory::{ChatDirectory, InMemoryChatDirectory};
pub use eskiz::EskizSmsChannel;
pub use mock::{LoggingFreeChannel, LoggingPaidChannel};
pub use telegram::TelegramBotChannel;

/// Convert a reqwest failure into a delivery error
///
/// The URL is stripped because the Bot API URL carries the bot token.
pub(crate) fn transport_error(err: reqwest::Error, timeout_secs: u64) -> DeliveryError {
    if err.is_timeout() {
        DeliveryError::Timeout {
            seconds: timeout_secs,
        }
    } else {
        DeliveryError::Transport(err.without_url().to_string())
    }
}

/// Free channel selected from configuration
pub enum FreeChannelAdapter {
    Telegram(TelegramBotChannel<Arc<dyn ChatDirectory>>),
    Logging(LoggingFreeChannel),
}

#[async_trait]
impl FreeChannel for FreeChannelAdapter {
    fn name(&self) -> &str {
        match self {
            FreeChannelAdapter::Telegram(channel) => channel.name(),
            FreeChannelAdapter::Logging(channel) => channel.name(),
        }
    }

    async fn send(&self, phone: &str, text: &str) -> Result<(), DeliveryError> {
        match self {
            FreeChannelAdapter::Telegram(channel) => channel.send(phone, text).await,
            FreeChannelAdapter::Logging(channel) => channel.send(phone, text).await,
        }
    }
}

/// Paid channel selected from configuration
pub enum PaidChannelAdapter {
    Eskiz(EskizSmsChannel),
    Logging(LoggingPaidChannel),
}

#[async_trait]
impl PaidChannel for PaidChannelAdapter {
    fn name(&self) -> &str {
        match self {
            PaidChannelAdapter::Eskiz(channel) => channel.name(),
            PaidChannelAdapter::Logging(channel) => channel.name(),
        }
    }

    async fn send(&self, phone: &str, text: &str) -> Result<PaidReceipt, DeliveryError> {
        match self {
            PaidChannelAdapter::Eskiz(channel) => channel.send(phone, text).await,
            PaidChannelAdapter::Logging(channel) => channel.send(phone, text).await,
        }
    }
}

/// Telegram bot when a token is configured, otherwise a logging channel
/// that reaches nobody
pub fn create_free_channel(
    config: &TelegramConfig,
    directory: Arc<dyn ChatDirectory>,
) -> Result<FreeChannelAdapter, InfrastructureError> {
    if config.is_configured() {
        let channel = TelegramBotChannel::new(config.clone(), directory)?;
        Ok(FreeChannelAdapter::Telegram(channel))
    } else {
        warn!("TELEGRAM_BOT_TOKEN not set, free channel disabled");
        Ok(FreeChannelAdapter::Logging(LoggingFreeChannel::new()))
    }
}

/// Eskiz gateway when credentials are configured, otherwise a logging channel
pub fn create_paid_channel(config: &EskizConfig) -> Result<PaidChannelAdapter, InfrastructureError> {
    if config.is_configured() {
        Ok(PaidChannelAdapter::Eskiz(EskizSmsChannel::new(config.clone())?))
    } else {
        warn!("Eskiz credentials not set, paid SMS will only be logged");
        Ok(PaidChannelAdapter::Logging(LoggingPaidChannel::new()))
    }
}
