//! Domain entities of the phone verification workflow.

pub mod verification_code;
pub mod workflow;

pub use verification_code::{
    is_well_formed_code, VerificationCode, CODE_LENGTH, DEFAULT_EXPIRATION_MINUTES,
};
pub use workflow::{
    AdminAction, AdminAnnotation, DeliveryAttemptRecord, DeliveryChannel, DeliveryOutcome,
    VerificationPurpose, VerificationWorkflow, WorkflowId, WorkflowStatus, WORKFLOW_ID_PREFIX,
};
