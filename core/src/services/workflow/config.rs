//! Configuration for the workflow manager

use chrono::Duration;
use st_shared::WorkflowConfig;

use crate::domain::entities::verification_code::{CODE_LENGTH, DEFAULT_EXPIRATION_MINUTES};

/// Runtime configuration of the workflow manager
#[derive(Debug, Clone)]
pub struct WorkflowServiceConfig {
    /// Lifetime of a workflow from creation
    pub confirmation_timeout: Duration,
    /// Delivery cycles allowed before admin review
    pub max_attempts: u32,
    /// Wait between a confirmed retry and the next delivery
    pub retry_cooldown: Duration,
    pub code_length: usize,
    /// Lifetime of a single code
    pub code_ttl: Duration,
    /// Wrong codes accepted before the live code is burnt
    pub max_code_mismatches: u32,
    /// Minimum time between two codes on resend
    pub resend_cooldown: Duration,
    /// Upper bound for one channel call
    pub delivery_timeout: std::time::Duration,
    /// How often the background sweeper runs
    pub sweep_interval: std::time::Duration,
    /// Price of one paid SMS in minor currency units
    pub paid_cost_per_message: u64,
    pub currency: String,
}

impl Default for WorkflowServiceConfig {
    fn default() -> Self {
        Self {
            confirmation_timeout: Duration::minutes(10),
            max_attempts: 2,
            retry_cooldown: Duration::minutes(2),
            code_length: CODE_LENGTH,
            code_ttl: Duration::minutes(DEFAULT_EXPIRATION_MINUTES),
            max_code_mismatches: 3,
            resend_cooldown: Duration::seconds(60),
            delivery_timeout: std::time::Duration::from_secs(15),
            sweep_interval: std::time::Duration::from_secs(60),
            paid_cost_per_message: 5_000,
            currency: "UZS".to_string(),
        }
    }
}

impl TryFrom<&WorkflowConfig> for WorkflowServiceConfig {
    type Error = String;

    /// Convert validated settings; out-of-range values are rejected with
    /// the message of [`WorkflowConfig::validate`]
    fn try_from(config: &WorkflowConfig) -> Result<Self, Self::Error> {
        config.validate()?;
        Ok(Self {
            confirmation_timeout: Duration::minutes(config.confirmation_timeout_minutes),
            max_attempts: config.max_retry_attempts,
            retry_cooldown: Duration::minutes(config.retry_cooldown_minutes),
            code_length: config.code_length,
            code_ttl: Duration::minutes(config.code_expiration_minutes),
            max_code_mismatches: config.max_code_mismatches,
            resend_cooldown: Duration::seconds(config.resend_cooldown_seconds),
            delivery_timeout: std::time::Duration::from_secs(config.delivery_timeout_seconds),
            sweep_interval: std::time::Duration::from_secs(config.sweep_interval_seconds),
            paid_cost_per_message: config.paid_cost_per_message,
            currency: config.currency.clone(),
        })
    }
}

impl WorkflowServiceConfig {
    /// Cooldown as a timer duration; negative values collapse to zero
    pub(crate) fn retry_cooldown_std(&self) -> std::time::Duration {
        self.retry_cooldown.to_std().unwrap_or_default()
    }

    /// Code lifetime in whole minutes, as shown in the SMS text
    pub(crate) fn code_ttl_minutes(&self) -> i64 {
        self.code_ttl.num_minutes().max(1)
    }
}
