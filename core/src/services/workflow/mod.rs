//! Phone verification workflow module
//!
//! This module drives a verification from request to resolution:
//! - Code generation and free-then-paid delivery with bounded timeouts
//! - User-confirmed retries after a cancellable cooldown
//! - Code entry with a bounded mismatch counter
//! - Manual admin override once automatic retries are exhausted
//! - Periodic eviction of expired workflows

mod cleanup;
mod config;
mod locks;
mod messages;
mod service;
mod traits;
mod types;

#[cfg(test)]
mod tests;

pub use cleanup::{SweepResult, WorkflowSweeper};
pub use config::WorkflowServiceConfig;
pub use messages::render_code_message;
pub use service::WorkflowManager;
pub use traits::{E164PhoneValidator, FreeChannel, PaidChannel, PaidReceipt, PhoneValidator};
pub use types::{
    AdminVerificationRequest, AdminVerificationResponse, DeliveryStats, DeliveryStatus,
    NextAction, StartVerificationRequest, VerifyOutcome, WorkflowResponse, WorkflowStats,
    WorkflowStatusResponse,
};
