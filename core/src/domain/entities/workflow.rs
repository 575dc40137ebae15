//! Verification workflow entity and its state machine.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use st_shared::Language;
use uuid::Uuid;

use super::verification_code::VerificationCode;
use crate::errors::{WorkflowError, WorkflowResult};

/// Prefix of every workflow identifier
pub const WORKFLOW_ID_PREFIX: &str = "wf_";

/// Number of hex characters after the prefix
const WORKFLOW_ID_HEX_LEN: usize = 12;

/// Opaque workflow identifier (`wf_` followed by 12 hex characters)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorkflowId(String);

impl WorkflowId {
    /// Generate a fresh random identifier
    pub fn generate() -> Self {
        let hex = Uuid::new_v4().simple().to_string();
        Self(format!("{}{}", WORKFLOW_ID_PREFIX, &hex[..WORKFLOW_ID_HEX_LEN]))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether the identifier has the shape produced by [`WorkflowId::generate`]
    pub fn is_well_formed(&self) -> bool {
        self.0
            .strip_prefix(WORKFLOW_ID_PREFIX)
            .map(|hex| {
                hex.len() == WORKFLOW_ID_HEX_LEN && hex.bytes().all(|b| b.is_ascii_hexdigit())
            })
            .unwrap_or(false)
    }
}

impl fmt::Display for WorkflowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for WorkflowId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for WorkflowId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Lifecycle state of a verification workflow
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStatus {
    /// A code is live and waiting for the user
    Pending,
    /// Both channels failed; the user decides whether to retry
    AwaitingConfirmation,
    /// Retry confirmed; waiting for the cooldown to elapse
    RetryScheduled,
    /// Automatic retries exhausted; waiting for an administrator
    AdminReview,
    Completed,
    FailedFinal,
    AdminVerified,
    Discarded,
}

impl WorkflowStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkflowStatus::Pending => "pending",
            WorkflowStatus::AwaitingConfirmation => "awaiting_confirmation",
            WorkflowStatus::RetryScheduled => "retry_scheduled",
            WorkflowStatus::AdminReview => "admin_review",
            WorkflowStatus::Completed => "completed",
            WorkflowStatus::FailedFinal => "failed_final",
            WorkflowStatus::AdminVerified => "admin_verified",
            WorkflowStatus::Discarded => "discarded",
        }
    }

    /// Terminal states accept no further transitions
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            WorkflowStatus::Completed
                | WorkflowStatus::FailedFinal
                | WorkflowStatus::AdminVerified
                | WorkflowStatus::Discarded
        )
    }

    /// States reached through an administrator decision
    pub fn is_admin_resolved(&self) -> bool {
        matches!(self, WorkflowStatus::AdminVerified | WorkflowStatus::FailedFinal)
    }

    /// The complete edge set of the workflow state machine
    pub fn can_transition_to(&self, next: WorkflowStatus) -> bool {
        use WorkflowStatus::*;
        matches!(
            (self, next),
            (Pending, Pending | AwaitingConfirmation | Completed | Discarded)
                | (AwaitingConfirmation, RetryScheduled | AdminReview | Discarded)
                | (RetryScheduled, Pending | AwaitingConfirmation | Discarded)
                | (AdminReview, AdminReview | AdminVerified | FailedFinal | Discarded)
        )
    }
}

impl fmt::Display for WorkflowStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why the phone is being verified
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationPurpose {
    Registration,
    Login,
    PasswordReset,
}

impl VerificationPurpose {
    pub fn as_str(&self) -> &'static str {
        match self {
            VerificationPurpose::Registration => "registration",
            VerificationPurpose::Login => "login",
            VerificationPurpose::PasswordReset => "password_reset",
        }
    }
}

impl fmt::Display for VerificationPurpose {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for VerificationPurpose {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "registration" | "register" => Ok(VerificationPurpose::Registration),
            "login" => Ok(VerificationPurpose::Login),
            "password_reset" => Ok(VerificationPurpose::PasswordReset),
            other => Err(format!("Unknown verification purpose: {}", other)),
        }
    }
}

/// Channel a delivery went through
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryChannel {
    /// Telegram bot, zero cost
    Free,
    /// SMS gateway, charged per message
    Paid,
    /// Neither channel reached the recipient
    NoneAvailable,
}

impl DeliveryChannel {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeliveryChannel::Free => "free",
            DeliveryChannel::Paid => "paid",
            DeliveryChannel::NoneAvailable => "none_available",
        }
    }
}

impl fmt::Display for DeliveryChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryOutcome {
    Sent,
    Failed,
}

/// One channel call made for a workflow, append-only
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryAttemptRecord {
    /// Position in the history, starting at 1
    pub sequence: u32,

    /// Delivery cycle (the workflow's `attempt_count`) this call belongs to
    pub cycle: u32,

    pub timestamp: DateTime<Utc>,

    pub channel: DeliveryChannel,

    pub outcome: DeliveryOutcome,

    pub error: Option<String>,

    /// Provider message id of a successful paid send
    pub message_id: Option<String>,

    /// Cost in minor currency units
    pub cost: u64,
}

/// Decision an administrator can take on a workflow in review
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdminAction {
    ManualVerify,
    MarkInvalid,
    RequestAlternative,
}

impl AdminAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AdminAction::ManualVerify => "manual_verify",
            AdminAction::MarkInvalid => "mark_invalid",
            AdminAction::RequestAlternative => "request_alternative",
        }
    }

    /// Status the workflow ends up in after the action
    pub fn target_status(&self) -> WorkflowStatus {
        match self {
            AdminAction::ManualVerify => WorkflowStatus::AdminVerified,
            AdminAction::MarkInvalid => WorkflowStatus::FailedFinal,
            AdminAction::RequestAlternative => WorkflowStatus::AdminReview,
        }
    }
}

impl fmt::Display for AdminAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AdminAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "manual_verify" => Ok(AdminAction::ManualVerify),
            "mark_invalid" => Ok(AdminAction::MarkInvalid),
            "request_alternative" => Ok(AdminAction::RequestAlternative),
            other => Err(format!("Unknown admin action: {}", other)),
        }
    }
}

/// Audit entry written for every admin call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdminAnnotation {
    pub admin_id: String,
    pub action: AdminAction,
    pub notes: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// One end-to-end phone verification attempt
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationWorkflow {
    pub id: WorkflowId,

    /// Canonical E.164 phone number
    pub phone: String,

    pub user_id: Option<String>,

    pub purpose: VerificationPurpose,

    pub status: WorkflowStatus,

    /// Delivery cycles started so far
    pub attempt_count: u32,

    pub max_attempts: u32,

    /// Wrong codes submitted against the live code
    pub mismatch_count: u32,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,

    /// Hard deadline of the workflow; never extended
    pub expires_at: DateTime<Utc>,

    /// The live code, if any
    pub code: Option<VerificationCode>,

    pub last_error: Option<String>,

    pub delivery_history: Vec<DeliveryAttemptRecord>,

    pub language: Language,

    /// When a confirmed retry is due to run
    pub retry_scheduled_at: Option<DateTime<Utc>>,

    /// Channel I/O is in flight for this workflow
    #[serde(default)]
    pub delivering: bool,

    #[serde(default)]
    pub alternative_requested: bool,

    #[serde(default)]
    pub admin_annotations: Vec<AdminAnnotation>,

    pub verified_by: Option<String>,

    pub rejection_reason: Option<String>,

    /// Write counter the store compares on every update
    #[serde(default)]
    pub version: u64,
}

impl VerificationWorkflow {
    /// Creates a new workflow in `PENDING` with no code and no attempts
    pub fn new(
        phone: String,
        purpose: VerificationPurpose,
        language: Language,
        user_id: Option<String>,
        max_attempts: u32,
        timeout: Duration,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: WorkflowId::generate(),
            phone,
            user_id,
            purpose,
            status: WorkflowStatus::Pending,
            attempt_count: 0,
            max_attempts,
            mismatch_count: 0,
            created_at: now,
            updated_at: now,
            expires_at: now + timeout,
            code: None,
            last_error: None,
            delivery_history: Vec::new(),
            language,
            retry_scheduled_at: None,
            delivering: false,
            alternative_requested: false,
            admin_annotations: Vec::new(),
            verified_by: None,
            rejection_reason: None,
            version: 0,
        }
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }

    /// Moves to `next` if the state machine allows it
    ///
    /// `operation` names the caller in the resulting `InvalidState` error.
    pub fn transition_to(
        &mut self,
        next: WorkflowStatus,
        operation: &'static str,
    ) -> WorkflowResult<()> {
        if !self.status.can_transition_to(next) {
            return Err(WorkflowError::InvalidState {
                workflow_id: self.id.clone(),
                status: self.status,
                operation,
            });
        }
        self.status = next;
        self.touch();
        Ok(())
    }

    /// Whether the user may still confirm another delivery cycle
    pub fn has_attempts_left(&self) -> bool {
        self.attempt_count < self.max_attempts
    }

    /// Starts a new delivery cycle; callers check [`Self::has_attempts_left`] first
    pub fn begin_cycle(&mut self) {
        self.attempt_count = (self.attempt_count + 1).min(self.max_attempts);
        self.touch();
    }

    /// Replaces the live code and resets the mismatch counter
    pub fn issue_code(&mut self, length: usize, ttl: Duration) -> &VerificationCode {
        self.mismatch_count = 0;
        self.touch();
        self.code.insert(VerificationCode::generate(length, ttl))
    }

    /// Appends a delivery record for the current cycle
    pub fn record_attempt(
        &mut self,
        channel: DeliveryChannel,
        outcome: DeliveryOutcome,
        error: Option<String>,
        message_id: Option<String>,
        cost: u64,
    ) {
        let sequence = self.delivery_history.len() as u32 + 1;
        self.delivery_history.push(DeliveryAttemptRecord {
            sequence,
            cycle: self.attempt_count,
            timestamp: Utc::now(),
            channel,
            outcome,
            error,
            message_id,
            cost,
        });
        self.touch();
    }

    /// Channel that delivered the live code, if the latest delivery succeeded
    pub fn last_delivery_channel(&self) -> Option<DeliveryChannel> {
        self.delivery_history
            .last()
            .filter(|record| record.outcome == DeliveryOutcome::Sent)
            .map(|record| record.channel)
    }

    /// Sum of all delivery costs, in minor currency units
    pub fn total_cost(&self) -> u64 {
        self.delivery_history.iter().map(|record| record.cost).sum()
    }

    /// Appends an audit entry
    pub fn annotate(&mut self, admin_id: &str, action: AdminAction, notes: Option<String>) {
        self.admin_annotations.push(AdminAnnotation {
            admin_id: admin_id.to_string(),
            action,
            notes,
            timestamp: Utc::now(),
        });
        self.touch();
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn workflow() -> VerificationWorkflow {
        VerificationWorkflow::new(
            "+998901234567".to_string(),
            VerificationPurpose::Registration,
            Language::Uzbek,
            None,
            2,
            Duration::minutes(10),
        )
    }

    #[test]
    fn test_generated_id_shape() {
        let id = WorkflowId::generate();
        assert!(id.as_str().starts_with("wf_"));
        assert_eq!(id.as_str().len(), 15);
        assert!(id.is_well_formed());
        assert_ne!(id, WorkflowId::generate());
        assert!(!WorkflowId::from("wf_xyz").is_well_formed());
    }

    #[test]
    fn test_new_workflow() {
        let wf = workflow();
        assert_eq!(wf.status, WorkflowStatus::Pending);
        assert_eq!(wf.attempt_count, 0);
        assert!(wf.code.is_none());
        assert_eq!(wf.expires_at - wf.created_at, Duration::minutes(10));
        assert!(!wf.is_expired());
    }

    #[test]
    fn test_terminal_states_have_no_edges() {
        let all = [
            WorkflowStatus::Pending,
            WorkflowStatus::AwaitingConfirmation,
            WorkflowStatus::RetryScheduled,
            WorkflowStatus::AdminReview,
            WorkflowStatus::Completed,
            WorkflowStatus::FailedFinal,
            WorkflowStatus::AdminVerified,
            WorkflowStatus::Discarded,
        ];
        for from in all.iter().filter(|s| s.is_terminal()) {
            for to in all.iter() {
                assert!(!from.can_transition_to(*to), "{} -> {}", from, to);
            }
        }
    }

    #[test]
    fn test_transition_edges() {
        use WorkflowStatus::*;
        assert!(Pending.can_transition_to(AwaitingConfirmation));
        assert!(AwaitingConfirmation.can_transition_to(RetryScheduled));
        assert!(AwaitingConfirmation.can_transition_to(AdminReview));
        assert!(RetryScheduled.can_transition_to(Pending));
        assert!(AdminReview.can_transition_to(FailedFinal));
        assert!(!Pending.can_transition_to(AdminReview));
        assert!(!AwaitingConfirmation.can_transition_to(Completed));
        assert!(!RetryScheduled.can_transition_to(AdminReview));
    }

    #[test]
    fn test_invalid_transition_reports_state() {
        let mut wf = workflow();
        let err = wf
            .transition_to(WorkflowStatus::AdminVerified, "admin_verify")
            .unwrap_err();
        match err {
            WorkflowError::InvalidState {
                status, operation, ..
            } => {
                assert_eq!(status, WorkflowStatus::Pending);
                assert_eq!(operation, "admin_verify");
            }
            other => panic!("unexpected error: {:?}", other),
        }
        assert_eq!(wf.status, WorkflowStatus::Pending);
    }

    #[test]
    fn test_begin_cycle_is_bounded() {
        let mut wf = workflow();
        wf.begin_cycle();
        wf.begin_cycle();
        wf.begin_cycle();
        assert_eq!(wf.attempt_count, 2);
        assert!(!wf.has_attempts_left());
    }

    #[test]
    fn test_issue_code_replaces_and_resets_mismatches() {
        let mut wf = workflow();
        wf.mismatch_count = 2;
        let first = wf.issue_code(6, Duration::minutes(5)).clone();
        assert_eq!(wf.mismatch_count, 0);
        let second = wf.issue_code(6, Duration::minutes(5)).clone();
        assert_eq!(wf.code.as_ref(), Some(&second));
        assert!(second.issued_at >= first.issued_at);
    }

    #[test]
    fn test_record_attempt_sequence_and_cost() {
        let mut wf = workflow();
        wf.begin_cycle();
        wf.record_attempt(
            DeliveryChannel::Free,
            DeliveryOutcome::Failed,
            Some("Recipient is not registered on this channel".to_string()),
            None,
            0,
        );
        wf.record_attempt(
            DeliveryChannel::Paid,
            DeliveryOutcome::Sent,
            None,
            Some("msg-1".to_string()),
            5_000,
        );
        assert_eq!(wf.delivery_history[0].sequence, 1);
        assert_eq!(wf.delivery_history[1].sequence, 2);
        assert_eq!(wf.delivery_history[1].cycle, 1);
        assert_eq!(wf.last_delivery_channel(), Some(DeliveryChannel::Paid));
        assert_eq!(wf.total_cost(), 5_000);
    }

    #[test]
    fn test_parse_purpose_and_action() {
        assert_eq!(
            "password-reset".parse::<VerificationPurpose>().unwrap(),
            VerificationPurpose::PasswordReset
        );
        assert!("signup".parse::<VerificationPurpose>().is_err());
        assert_eq!(
            "mark_invalid".parse::<AdminAction>().unwrap(),
            AdminAction::MarkInvalid
        );
        assert!("delete".parse::<AdminAction>().is_err());
        assert_eq!(
            AdminAction::ManualVerify.target_status(),
            WorkflowStatus::AdminVerified
        );
    }

    #[test]
    fn test_status_serializes_snake_case() {
        let json = serde_json::to_string(&WorkflowStatus::AwaitingConfirmation).unwrap();
        assert_eq!(json, "\"awaiting_confirmation\"");
        let json = serde_json::to_string(&DeliveryChannel::NoneAvailable).unwrap();
        assert_eq!(json, "\"none_available\"");
    }
}
