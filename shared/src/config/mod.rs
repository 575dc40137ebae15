//! Configuration module with business-specific sub-modules
//!
//! - `cache` - Redis configuration for the shared workflow store
//! - `environment` - Environment detection and logging configuration
//! - `sms` - Credentials and tuning for the Telegram bot and Eskiz gateway
//! - `workflow` - Timeouts, retry limits and pricing of the verification workflow

pub mod cache;
pub mod environment;
pub mod sms;
pub mod workflow;

pub use cache::CacheConfig;
pub use environment::{Environment, LogFormat, LoggingConfig};
pub use sms::{EskizConfig, TelegramConfig};
pub use workflow::WorkflowConfig;

/// Read an environment variable and parse it, falling back to `default`
/// when the variable is unset or malformed.
pub(crate) fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}
