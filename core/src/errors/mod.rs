//! Error types of the verification workflow and its delivery channels.

use st_shared::errors::{error_codes, ErrorResponse, IntoErrorResponse};
use thiserror::Error;

use crate::domain::entities::workflow::{WorkflowId, WorkflowStatus};

/// Failure reported by a delivery channel adapter
///
/// Adapters convert every provider or network error into one of these
/// variants; raw provider errors never reach the workflow state machine.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DeliveryError {
    #[error("Recipient is not registered on this channel")]
    RecipientUnknown,

    #[error("Channel call timed out after {seconds}s")]
    Timeout { seconds: u64 },

    #[error("Provider authentication failed: {0}")]
    Authentication(String),

    #[error("Provider rejected the message: {0}")]
    Provider(String),

    #[error("Transport error: {0}")]
    Transport(String),
}

/// Errors surfaced by the workflow manager
#[derive(Error, Debug)]
pub enum WorkflowError {
    #[error("Invalid request: {message}")]
    InvalidRequest { message: String },

    #[error("Workflow not found: {workflow_id}")]
    NotFound { workflow_id: WorkflowId },

    #[error("Cannot {operation} workflow {workflow_id} in status {status}")]
    InvalidState {
        workflow_id: WorkflowId,
        status: WorkflowStatus,
        operation: &'static str,
    },

    #[error("Delivery failed: {0}")]
    DeliveryFailure(#[from] DeliveryError),

    #[error("Verification code expired")]
    CodeExpired,

    #[error("Invalid verification code. {remaining} attempt(s) remaining")]
    CodeMismatch { remaining: u32 },

    #[error("Too many invalid codes. Please request a new code")]
    TooManyMismatches,

    #[error("Workflow {workflow_id} already resolved as {status}")]
    AlreadyResolved {
        workflow_id: WorkflowId,
        status: WorkflowStatus,
    },

    #[error("Please wait {retry_after_seconds} seconds before requesting a new code")]
    ResendTooSoon { retry_after_seconds: i64 },

    /// Another writer updated the workflow since it was read; retry the call
    #[error("Workflow {workflow_id} was modified concurrently")]
    Conflict { workflow_id: WorkflowId },

    #[error("Workflow store error: {message}")]
    Store { message: String },
}

impl WorkflowError {
    /// Shorthand for a validation failure
    pub fn invalid_request(message: impl Into<String>) -> Self {
        WorkflowError::InvalidRequest {
            message: message.into(),
        }
    }

    /// Shorthand for a store backend failure
    pub fn store(message: impl std::fmt::Display) -> Self {
        WorkflowError::Store {
            message: message.to_string(),
        }
    }

    /// Stable machine-readable code for transports
    pub fn error_code(&self) -> &'static str {
        match self {
            WorkflowError::InvalidRequest { .. } => error_codes::INVALID_REQUEST,
            WorkflowError::NotFound { .. } => error_codes::WORKFLOW_NOT_FOUND,
            WorkflowError::InvalidState { .. } => error_codes::INVALID_WORKFLOW_STATE,
            WorkflowError::DeliveryFailure(_) => error_codes::DELIVERY_FAILURE,
            WorkflowError::CodeExpired => error_codes::VERIFICATION_CODE_EXPIRED,
            WorkflowError::CodeMismatch { .. } => error_codes::VERIFICATION_CODE_INVALID,
            WorkflowError::TooManyMismatches => error_codes::TOO_MANY_CODE_ATTEMPTS,
            WorkflowError::AlreadyResolved { .. } => error_codes::ALREADY_RESOLVED,
            WorkflowError::ResendTooSoon { .. } => error_codes::RATE_LIMIT_EXCEEDED,
            WorkflowError::Conflict { .. } => error_codes::CONCURRENT_MODIFICATION,
            WorkflowError::Store { .. } => error_codes::STORE_ERROR,
        }
    }

    /// Whether the caller caused the error (as opposed to a backend failure)
    pub fn is_client_error(&self) -> bool {
        !matches!(
            self,
            WorkflowError::Store { .. }
                | WorkflowError::DeliveryFailure(_)
                | WorkflowError::Conflict { .. }
        )
    }
}

impl IntoErrorResponse for WorkflowError {
    fn to_error_response(&self) -> ErrorResponse {
        let response = ErrorResponse::new(self.error_code(), self.to_string());
        match self {
            WorkflowError::CodeMismatch { remaining } => {
                response.add_detail("remaining_attempts", remaining)
            }
            WorkflowError::ResendTooSoon {
                retry_after_seconds,
            } => response.add_detail("retry_after_seconds", retry_after_seconds),
            WorkflowError::AlreadyResolved { status, .. }
            | WorkflowError::InvalidState { status, .. } => response.add_detail("status", status),
            _ => response,
        }
    }
}

impl From<WorkflowError> for ErrorResponse {
    fn from(err: WorkflowError) -> Self {
        err.to_error_response()
    }
}

pub type WorkflowResult<T> = Result<T, WorkflowError>;
