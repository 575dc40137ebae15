//! # Infrastructure Layer
//!
//! Concrete adapters behind the ports of `st_core`:
//!
//! - **SMS**: Telegram bot as the free channel, Eskiz gateway as the paid
//!   channel, and logging stand-ins for development
//! - **Cache**: Redis client, the Redis-backed workflow store and the
//!   phone to Telegram chat directory
//! - **Bootstrap**: configuration loading, tracing setup and assembly of a
//!   ready [`st_core::WorkflowManager`]

pub mod bootstrap;
pub mod cache;
pub mod config;
pub mod sms;
pub mod telemetry;

pub use bootstrap::{build_workflow_manager, connect, Infrastructure, ProductionWorkflowManager};
pub use config::{load_config, InfrastructureConfig};
pub use telemetry::init_tracing;

use st_core::WorkflowError;

/// Infrastructure-specific error types
#[derive(Debug, thiserror::Error)]
pub enum InfrastructureError {
    /// Redis cache error
    #[error("Cache error: {0}")]
    Cache(#[from] redis::RedisError),

    /// HTTP request error for external services
    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    /// Stored value could not be encoded or decoded
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<InfrastructureError> for WorkflowError {
    fn from(err: InfrastructureError) -> Self {
        WorkflowError::store(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_infrastructure_error_becomes_store_error() {
        let err: WorkflowError = InfrastructureError::Config("bad url".to_string()).into();
        match err {
            WorkflowError::Store { message } => {
                assert_eq!(message, "Configuration error: bad url")
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_serialization_error_converts() {
        let parse = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let err = InfrastructureError::from(parse);
        assert!(err.to_string().starts_with("Serialization error"));
    }
}
