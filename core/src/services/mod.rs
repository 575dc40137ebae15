//! Business services containing the verification workflow use cases.

pub mod workflow;

pub use workflow::{
    AdminVerificationRequest, AdminVerificationResponse, DeliveryStats, DeliveryStatus,
    E164PhoneValidator, FreeChannel, NextAction, PaidChannel, PaidReceipt, PhoneValidator,
    StartVerificationRequest, SweepResult, VerifyOutcome, WorkflowManager, WorkflowResponse,
    WorkflowServiceConfig, WorkflowStats, WorkflowStatusResponse, WorkflowSweeper,
};
