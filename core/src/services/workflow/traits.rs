//! Ports for delivery channels and phone validation

use async_trait::async_trait;
use st_shared::phone::validate_phone_number;

use crate::errors::DeliveryError;

/// Zero-cost channel that can only reach recipients already known to it
#[async_trait]
pub trait FreeChannel: Send + Sync {
    /// Short provider name used in logs
    fn name(&self) -> &str;

    /// Send `text` to the recipient registered under `phone`
    ///
    /// Fails with `DeliveryError::RecipientUnknown` without any provider call
    /// when the phone is not registered on the channel.
    async fn send(&self, phone: &str, text: &str) -> Result<(), DeliveryError>;
}

/// Receipt of an accepted paid message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaidReceipt {
    pub message_id: String,
}

/// SMS gateway charged per message
///
/// Provider authentication and token renewal are internal to implementations.
#[async_trait]
pub trait PaidChannel: Send + Sync {
    fn name(&self) -> &str;

    async fn send(&self, phone: &str, text: &str) -> Result<PaidReceipt, DeliveryError>;
}

/// Validates a phone number and returns its canonical form
pub trait PhoneValidator: Send + Sync {
    fn validate(&self, phone: &str) -> Result<String, String>;
}

/// Accepts international numbers in E.164 form
#[derive(Debug, Clone, Copy, Default)]
pub struct E164PhoneValidator;

impl PhoneValidator for E164PhoneValidator {
    fn validate(&self, phone: &str) -> Result<String, String> {
        validate_phone_number(phone).map_err(|e| e.to_string())
    }
}
