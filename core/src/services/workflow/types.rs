//! Request and response types of the workflow manager

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::entities::workflow::{
    AdminAction, DeliveryAttemptRecord, DeliveryChannel, DeliveryOutcome, VerificationPurpose,
    VerificationWorkflow, WorkflowId, WorkflowStatus,
};

/// Request to start a new verification
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StartVerificationRequest {
    pub phone: String,
    /// `registration`, `login` or `password_reset`
    pub purpose: String,
    /// Language code (`en`, `ru`, `uz`); English when absent
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default)]
    pub user_id: Option<String>,
}

/// Admin decision on a workflow in review
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdminVerificationRequest {
    pub workflow_id: WorkflowId,
    pub admin_id: String,
    /// `manual_verify`, `mark_invalid` or `request_alternative`
    pub action: String,
    #[serde(default)]
    pub notes: Option<String>,
}

/// What the user is expected to do next
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NextAction {
    EnterCode,
    ConfirmRetry,
    WaitForRetry,
    ContactAdmin,
}

/// Delivery state of the latest code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStatus {
    Sent,
    Failed,
    Scheduled,
    Cancelled,
}

/// Response returned by every user-facing workflow operation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowResponse {
    pub workflow_id: WorkflowId,
    pub status: WorkflowStatus,
    pub phone: String,
    pub delivery_method: DeliveryChannel,
    pub delivery_status: DeliveryStatus,
    pub message: String,
    pub next_action: Option<NextAction>,
    pub retry_available: bool,
    pub retry_cooldown_seconds: Option<i64>,
    pub admin_contact_required: bool,
    pub expires_at: DateTime<Utc>,
}

impl WorkflowResponse {
    /// Builds the response from the workflow state after an operation
    pub(crate) fn from_workflow(
        workflow: &VerificationWorkflow,
        message: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Self {
        let (next_action, retry_available, retry_cooldown_seconds, admin_contact_required) =
            match workflow.status {
                WorkflowStatus::Pending => (Some(NextAction::EnterCode), false, None, false),
                WorkflowStatus::AwaitingConfirmation => (
                    Some(NextAction::ConfirmRetry),
                    workflow.has_attempts_left(),
                    None,
                    false,
                ),
                WorkflowStatus::RetryScheduled => {
                    let remaining = workflow
                        .retry_scheduled_at
                        .map(|at| (at - now).num_seconds().max(0));
                    (Some(NextAction::WaitForRetry), false, remaining, false)
                }
                WorkflowStatus::AdminReview => (Some(NextAction::ContactAdmin), false, None, true),
                _ => (None, false, None, false),
            };

        let delivery_status = match workflow.status {
            WorkflowStatus::RetryScheduled => DeliveryStatus::Scheduled,
            WorkflowStatus::Discarded => DeliveryStatus::Cancelled,
            _ => match workflow.delivery_history.last().map(|r| r.outcome) {
                Some(DeliveryOutcome::Sent) => DeliveryStatus::Sent,
                _ => DeliveryStatus::Failed,
            },
        };

        Self {
            workflow_id: workflow.id.clone(),
            status: workflow.status,
            phone: workflow.phone.clone(),
            delivery_method: workflow
                .last_delivery_channel()
                .unwrap_or(DeliveryChannel::NoneAvailable),
            delivery_status,
            message: message.into(),
            next_action,
            retry_available,
            retry_cooldown_seconds,
            admin_contact_required,
            expires_at: workflow.expires_at,
        }
    }
}

/// Result of a successful code entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerifyOutcome {
    pub workflow_id: WorkflowId,
    pub status: WorkflowStatus,
    pub verified: bool,
    /// The caller should activate the account (registration flows)
    pub activate_account: bool,
    pub purpose: VerificationPurpose,
    pub phone: String,
    pub user_id: Option<String>,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdminVerificationResponse {
    pub workflow_id: WorkflowId,
    pub status: WorkflowStatus,
    pub action_taken: AdminAction,
    pub verified: bool,
    pub message: String,
    pub admin_id: String,
    pub timestamp: DateTime<Utc>,
}

/// Snapshot of a workflow for status pages and support tools
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowStatusResponse {
    pub workflow_id: WorkflowId,
    pub status: WorkflowStatus,
    pub phone: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub attempt_count: u32,
    pub max_attempts: u32,
    pub last_error: Option<String>,
    pub delivery_history: Vec<DeliveryAttemptRecord>,
}

impl From<&VerificationWorkflow> for WorkflowStatusResponse {
    fn from(workflow: &VerificationWorkflow) -> Self {
        Self {
            workflow_id: workflow.id.clone(),
            status: workflow.status,
            phone: workflow.phone.clone(),
            created_at: workflow.created_at,
            updated_at: workflow.updated_at,
            expires_at: workflow.expires_at,
            attempt_count: workflow.attempt_count,
            max_attempts: workflow.max_attempts,
            last_error: workflow.last_error.clone(),
            delivery_history: workflow.delivery_history.clone(),
        }
    }
}

/// Delivery counters since the manager was created
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryStats {
    /// Cycles delivered by the free channel
    pub free_sent: u64,
    /// Cycles delivered by the paid channel
    pub paid_sent: u64,
    /// Cycles where both channels failed
    pub failed: u64,
    /// Paid channel spend in minor currency units
    pub total_cost: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowStats {
    pub delivery: DeliveryStats,
    pub currency: String,
    /// Workflows currently held by the store
    pub stored_workflows: usize,
    /// Confirmed retries waiting for their cooldown
    pub scheduled_retries: usize,
}
