//! Verification workflow configuration

use serde::{Deserialize, Serialize};

use super::env_or;

/// Timeouts, limits and pricing of the phone verification workflow
///
/// All values are plain numbers so the struct can be read from the
/// environment or a config file; the core crate converts them into durations.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct WorkflowConfig {
    /// Lifetime of a workflow from creation, in minutes
    pub confirmation_timeout_minutes: i64,

    /// Maximum delivery cycles before admin review is required
    pub max_retry_attempts: u32,

    /// Delay between a confirmed retry and the next delivery, in minutes
    pub retry_cooldown_minutes: i64,

    /// Number of digits in a verification code
    pub code_length: usize,

    /// Lifetime of a single verification code, in minutes
    pub code_expiration_minutes: i64,

    /// Wrong codes accepted before the live code is burnt
    #[serde(default = "default_max_code_mismatches")]
    pub max_code_mismatches: u32,

    /// Minimum seconds between two codes for the same workflow
    #[serde(default = "default_resend_cooldown_seconds")]
    pub resend_cooldown_seconds: i64,

    /// Upper bound for a single channel call, in seconds
    #[serde(default = "default_delivery_timeout_seconds")]
    pub delivery_timeout_seconds: u64,

    /// How often the background sweeper runs, in seconds
    #[serde(default = "default_sweep_interval_seconds")]
    pub sweep_interval_seconds: u64,

    /// Price of one paid SMS in minor currency units (tiyin)
    pub paid_cost_per_message: u64,

    /// Currency of `paid_cost_per_message`
    pub currency: String,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            confirmation_timeout_minutes: 10,
            max_retry_attempts: 2,
            retry_cooldown_minutes: 2,
            code_length: 6,
            code_expiration_minutes: 5,
            max_code_mismatches: default_max_code_mismatches(),
            resend_cooldown_seconds: default_resend_cooldown_seconds(),
            delivery_timeout_seconds: default_delivery_timeout_seconds(),
            sweep_interval_seconds: default_sweep_interval_seconds(),
            paid_cost_per_message: 5_000,
            currency: String::from("UZS"),
        }
    }
}

impl WorkflowConfig {
    /// Create from `SMS_WORKFLOW_*` environment variables
    pub fn from_env() -> Self {
        let d = Self::default();
        Self {
            confirmation_timeout_minutes: env_or(
                "SMS_WORKFLOW_CONFIRMATION_TIMEOUT_MINUTES",
                d.confirmation_timeout_minutes,
            ),
            max_retry_attempts: env_or("SMS_WORKFLOW_MAX_RETRY_ATTEMPTS", d.max_retry_attempts),
            retry_cooldown_minutes: env_or(
                "SMS_WORKFLOW_RETRY_COOLDOWN_MINUTES",
                d.retry_cooldown_minutes,
            ),
            code_length: env_or("SMS_WORKFLOW_CODE_LENGTH", d.code_length),
            code_expiration_minutes: env_or(
                "SMS_WORKFLOW_CODE_EXPIRATION_MINUTES",
                d.code_expiration_minutes,
            ),
            max_code_mismatches: env_or("SMS_WORKFLOW_MAX_CODE_MISMATCHES", d.max_code_mismatches),
            resend_cooldown_seconds: env_or(
                "SMS_WORKFLOW_RESEND_COOLDOWN_SECONDS",
                d.resend_cooldown_seconds,
            ),
            delivery_timeout_seconds: env_or(
                "SMS_WORKFLOW_DELIVERY_TIMEOUT_SECONDS",
                d.delivery_timeout_seconds,
            ),
            sweep_interval_seconds: env_or(
                "SMS_WORKFLOW_SWEEP_INTERVAL_SECONDS",
                d.sweep_interval_seconds,
            ),
            paid_cost_per_message: env_or("SMS_PAID_COST_PER_MESSAGE", d.paid_cost_per_message),
            currency: std::env::var("SMS_PAID_CURRENCY").unwrap_or(d.currency),
        }
    }

    /// Check the values for combinations the workflow cannot run with
    ///
    /// Every duration is capped at one day.
    pub fn validate(&self) -> Result<(), String> {
        if self.max_retry_attempts == 0 {
            return Err("max_retry_attempts must be at least 1".to_string());
        }
        if !(4..=10).contains(&self.code_length) {
            return Err(format!(
                "code_length must be between 4 and 10, got {}",
                self.code_length
            ));
        }
        check_range(
            "confirmation_timeout_minutes",
            self.confirmation_timeout_minutes,
            1,
            MAX_DURATION_MINUTES,
        )?;
        check_range(
            "code_expiration_minutes",
            self.code_expiration_minutes,
            1,
            MAX_DURATION_MINUTES,
        )?;
        check_range(
            "retry_cooldown_minutes",
            self.retry_cooldown_minutes,
            0,
            MAX_DURATION_MINUTES,
        )?;
        check_range(
            "resend_cooldown_seconds",
            self.resend_cooldown_seconds,
            0,
            MAX_DURATION_SECONDS,
        )?;
        check_range(
            "delivery_timeout_seconds",
            self.delivery_timeout_seconds,
            1,
            MAX_DURATION_SECONDS as u64,
        )?;
        check_range(
            "sweep_interval_seconds",
            self.sweep_interval_seconds,
            1,
            MAX_DURATION_SECONDS as u64,
        )?;
        Ok(())
    }
}

const MAX_DURATION_MINUTES: i64 = 24 * 60;
const MAX_DURATION_SECONDS: i64 = MAX_DURATION_MINUTES * 60;

fn check_range<T>(name: &str, value: T, min: T, max: T) -> Result<(), String>
where
    T: PartialOrd + std::fmt::Display,
{
    if value < min || value > max {
        return Err(format!(
            "{} must be between {} and {}, got {}",
            name, min, max, value
        ));
    }
    Ok(())
}

fn default_max_code_mismatches() -> u32 {
    3
}

fn default_resend_cooldown_seconds() -> i64 {
    60
}

fn default_delivery_timeout_seconds() -> u64 {
    15
}

fn default_sweep_interval_seconds() -> u64 {
    60
}
