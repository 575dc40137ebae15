//! Logging channels for development
//!
//! Both channels log the message instead of sending it. The free channel
//! only reaches phones added with [`LoggingFreeChannel::with_known_phones`],
//! so the paid fallback can be exercised locally.

use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use st_core::{DeliveryError, FreeChannel, PaidChannel, PaidReceipt};
use st_shared::phone::{mask_phone_number, normalize_phone_number};

/// Free channel stand-in reaching a fixed set of phones
#[derive(Debug, Clone, Default)]
pub struct LoggingFreeChannel {
    known_phones: HashSet<String>,
    sent: Arc<AtomicU64>,
}

impl LoggingFreeChannel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_known_phones<I, P>(phones: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: AsRef<str>,
    {
        Self {
            known_phones: phones
                .into_iter()
                .map(|p| normalize_phone_number(p.as_ref()))
                .collect(),
            sent: Arc::default(),
        }
    }

    pub fn sent_count(&self) -> u64 {
        self.sent.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl FreeChannel for LoggingFreeChannel {
    fn name(&self) -> &str {
        "logging-free"
    }

    async fn send(&self, phone: &str, text: &str) -> Result<(), DeliveryError> {
        if !self.known_phones.contains(&normalize_phone_number(phone)) {
            return Err(DeliveryError::RecipientUnknown);
        }
        self.sent.fetch_add(1, Ordering::SeqCst);
        info!(
            channel = "logging-free",
            "[DEV] Message for {}: {}",
            mask_phone_number(phone),
            text
        );
        Ok(())
    }
}

/// Paid channel stand-in that accepts every message
#[derive(Debug, Clone, Default)]
pub struct LoggingPaidChannel {
    sent: Arc<AtomicU64>,
}

impl LoggingPaidChannel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent_count(&self) -> u64 {
        self.sent.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PaidChannel for LoggingPaidChannel {
    fn name(&self) -> &str {
        "logging-paid"
    }

    async fn send(&self, phone: &str, text: &str) -> Result<PaidReceipt, DeliveryError> {
        self.sent.fetch_add(1, Ordering::SeqCst);
        let message_id = format!("dev-{}", Uuid::new_v4().simple());
        info!(
            channel = "logging-paid",
            message_id = %message_id,
            "[DEV] SMS for {}: {}",
            mask_phone_number(phone),
            text
        );
        Ok(PaidReceipt { message_id })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_free_channel_only_reaches_known_phones() {
        let channel = LoggingFreeChannel::with_known_phones(["+998 90 123 45 67"]);

        assert!(channel.send("+998901234567", "code").await.is_ok());
        assert_eq!(
            channel.send("+998911112233", "code").await,
            Err(DeliveryError::RecipientUnknown)
        );
        assert_eq!(channel.sent_count(), 1);
    }

    #[tokio::test]
    async fn test_paid_channel_issues_ids() {
        let channel = LoggingPaidChannel::new();

        let first = channel.send("+998901234567", "code").await.unwrap();
        let second = channel.send("+998901234567", "code").await.unwrap();

        assert!(first.message_id.starts_with("dev-"));
        assert_ne!(first.message_id, second.message_id);
        assert_eq!(channel.sent_count(), 2);
    }
}
