//! Shared utilities and common types for the SayToAI verification services
//!
//! This crate provides common functionality used across all workspace members:
//! - Configuration types loaded from the environment
//! - Error response structure and error codes
//! - Utility functions (phone validation, masking)
//! - Language type used for user-facing texts

pub mod config;
pub mod errors;
pub mod types;
pub mod utils;

// Re-export commonly used items at crate root
pub use config::{
    CacheConfig, EskizConfig, Environment, LoggingConfig, TelegramConfig, WorkflowConfig,
};
pub use errors::{error_codes, ErrorResponse, IntoErrorResponse};
pub use types::Language;
pub use utils::phone;
