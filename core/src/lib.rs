//! # SayToAI Core
//!
//! Business logic of the phone verification workflow used by the web API,
//! the admin API and the Telegram bot. This crate contains the domain
//! entities, the workflow manager state machine, the store and delivery
//! channel ports, and the error types shared by the adapters.

pub mod domain;
pub mod errors;
pub mod repositories;
pub mod services;

// Re-export commonly used types for convenience
pub use domain::entities::{
    AdminAction, AdminAnnotation, DeliveryAttemptRecord, DeliveryChannel, DeliveryOutcome,
    VerificationCode, VerificationPurpose, VerificationWorkflow, WorkflowId, WorkflowStatus,
};
pub use errors::{DeliveryError, WorkflowError, WorkflowResult};
pub use repositories::{InMemoryWorkflowStore, WorkflowStore};
pub use services::*;
