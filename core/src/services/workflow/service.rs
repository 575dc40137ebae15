//! Workflow manager: state machine and delivery orchestration

use chrono::Utc;
use st_shared::phone::mask_phone_number;
use st_shared::Language;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::domain::entities::verification_code::is_well_formed_code;
use crate::domain::entities::workflow::{
    AdminAction, DeliveryChannel, DeliveryOutcome, VerificationPurpose, VerificationWorkflow,
    WorkflowId, WorkflowStatus,
};
use crate::errors::{DeliveryError, WorkflowError, WorkflowResult};
use crate::repositories::WorkflowStore;

use super::cleanup::SweepResult;
use super::config::WorkflowServiceConfig;
use super::locks::{RetryTimers, WorkflowLocks};
use super::messages::{
    render_code_message, MSG_ADMIN_REVIEW, MSG_CODE_SENT, MSG_COMPLETED, MSG_DELIVERY_FAILED,
    MSG_DISCARDED, MSG_RETRY_SCHEDULED,
};
use super::traits::{E164PhoneValidator, FreeChannel, PaidChannel, PhoneValidator};
use super::types::{
    AdminVerificationRequest, AdminVerificationResponse, DeliveryStats, StartVerificationRequest,
    VerifyOutcome, WorkflowResponse, WorkflowStats, WorkflowStatusResponse,
};

/// One channel call made during a delivery cycle
struct ChannelAttempt {
    channel: DeliveryChannel,
    result: Result<Option<String>, DeliveryError>,
    cost: u64,
}

/// Summary of a delivery cycle
struct DeliveryReport {
    channel: DeliveryChannel,
    error: Option<DeliveryError>,
}

impl DeliveryReport {
    fn delivered(&self) -> bool {
        self.error.is_none()
    }

    fn message(&self) -> &'static str {
        if self.delivered() {
            MSG_CODE_SENT
        } else {
            MSG_DELIVERY_FAILED
        }
    }
}

struct ManagerInner<F, P, S> {
    free_channel: Arc<F>,
    paid_channel: Arc<P>,
    store: Arc<S>,
    phone_validator: Arc<dyn PhoneValidator>,
    config: WorkflowServiceConfig,
    locks: WorkflowLocks,
    timers: RetryTimers,
    stats: Mutex<DeliveryStats>,
}

/// Orchestrates verification workflows
///
/// Cloning is cheap; clones share the store, channels, locks and timers.
/// Operations on one workflow are serialized by an in-process lock; across
/// managers sharing a store, the store's versioned update rejects the
/// slower writer with [`WorkflowError::Conflict`]. Lookups through
/// [`WorkflowManager::get_status`] never wait for an in-flight delivery.
pub struct WorkflowManager<F, P, S> {
    inner: Arc<ManagerInner<F, P, S>>,
}

impl<F, P, S> Clone for WorkflowManager<F, P, S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<F, P, S> WorkflowManager<F, P, S>
where
    F: FreeChannel + 'static,
    P: PaidChannel + 'static,
    S: WorkflowStore + 'static,
{
    /// Create a manager validating phones as E.164 numbers
    ///
    /// # Arguments
    ///
    /// * `free_channel` - Zero-cost channel tried first
    /// * `paid_channel` - SMS gateway used as fallback
    /// * `store` - Workflow store
    /// * `config` - Manager configuration
    pub fn new(
        free_channel: Arc<F>,
        paid_channel: Arc<P>,
        store: Arc<S>,
        config: WorkflowServiceConfig,
    ) -> Self {
        Self::with_phone_validator(
            free_channel,
            paid_channel,
            store,
            Arc::new(E164PhoneValidator),
            config,
        )
    }

    /// Create a manager with a custom phone validator
    pub fn with_phone_validator(
        free_channel: Arc<F>,
        paid_channel: Arc<P>,
        store: Arc<S>,
        phone_validator: Arc<dyn PhoneValidator>,
        config: WorkflowServiceConfig,
    ) -> Self {
        Self {
            inner: Arc::new(ManagerInner {
                free_channel,
                paid_channel,
                store,
                phone_validator,
                config,
                locks: WorkflowLocks::default(),
                timers: RetryTimers::default(),
                stats: Mutex::new(DeliveryStats::default()),
            }),
        }
    }

    pub fn config(&self) -> &WorkflowServiceConfig {
        &self.inner.config
    }

    /// Start a new verification and run the first delivery cycle
    ///
    /// # Returns
    ///
    /// * `Ok(WorkflowResponse)` - `PENDING` when a channel delivered the code,
    ///   `AWAITING_CONFIRMATION` when both failed
    /// * `Err(WorkflowError::InvalidRequest)` - Bad phone, purpose or language
    pub async fn start_verification(
        &self,
        request: StartVerificationRequest,
    ) -> WorkflowResult<WorkflowResponse> {
        let phone = self
            .inner
            .phone_validator
            .validate(&request.phone)
            .map_err(|e| {
                warn!(
                    phone = %mask_phone_number(&request.phone),
                    event = "invalid_phone",
                    "Rejected verification request: {}", e
                );
                WorkflowError::invalid_request(e)
            })?;
        let purpose: VerificationPurpose = request
            .purpose
            .parse()
            .map_err(WorkflowError::invalid_request)?;
        let language = match request.language.as_deref() {
            Some(code) => code.parse::<Language>().map_err(WorkflowError::invalid_request)?,
            None => Language::default(),
        };

        if let Err(e) = self.sweep_expired().await {
            warn!(error = %e, event = "sweep_failed", "Opportunistic sweep failed");
        }

        let workflow = VerificationWorkflow::new(
            phone,
            purpose,
            language,
            request.user_id,
            self.inner.config.max_attempts,
            self.inner.config.confirmation_timeout,
        );
        let id = workflow.id.clone();
        let masked_phone = mask_phone_number(&workflow.phone);

        let _guard = self.inner.locks.acquire(&id).await;
        self.inner.store.insert(workflow).await.map_err(|e| {
            error!(workflow_id = %id, error = %e, event = "workflow_store_failed", "Failed to store workflow");
            e
        })?;

        info!(
            workflow_id = %id,
            phone = %masked_phone,
            purpose = %purpose,
            event = "workflow_created",
            "Started phone verification workflow"
        );

        let (workflow, report) = self.run_delivery(&id, true, "start_verification").await?;
        Ok(WorkflowResponse::from_workflow(
            &workflow,
            report.message(),
            Utc::now(),
        ))
    }

    /// Answer the retry prompt of a workflow whose delivery failed
    ///
    /// A confirmed retry schedules the next delivery cycle after the retry
    /// cooldown, or escalates to admin review once all cycles are used.
    /// Declining discards the workflow.
    pub async fn confirm_retry(
        &self,
        id: &WorkflowId,
        user_confirmed: bool,
    ) -> WorkflowResult<WorkflowResponse> {
        let _guard = self.inner.locks.acquire(id).await;
        let mut workflow = self.load(id).await?;
        let now = Utc::now();

        if workflow.status != WorkflowStatus::AwaitingConfirmation {
            return Err(invalid_state(&workflow, "confirm_retry"));
        }

        if !user_confirmed {
            workflow.transition_to(WorkflowStatus::Discarded, "confirm_retry")?;
            workflow.code = None;
            self.inner.store.update(&mut workflow).await?;
            info!(workflow_id = %id, event = "retry_declined", "User declined another delivery attempt");
            return Ok(WorkflowResponse::from_workflow(&workflow, MSG_DISCARDED, now));
        }

        if !workflow.has_attempts_left() {
            workflow.transition_to(WorkflowStatus::AdminReview, "confirm_retry")?;
            self.inner.store.update(&mut workflow).await?;
            warn!(
                workflow_id = %id,
                attempt_count = workflow.attempt_count,
                event = "admin_review_required",
                "Delivery attempts exhausted, escalating to admin review"
            );
            return Ok(WorkflowResponse::from_workflow(&workflow, MSG_ADMIN_REVIEW, now));
        }

        workflow.transition_to(WorkflowStatus::RetryScheduled, "confirm_retry")?;
        workflow.retry_scheduled_at = Some(now + self.inner.config.retry_cooldown);
        self.inner.store.update(&mut workflow).await?;
        self.schedule_retry(id.clone()).await;

        info!(
            workflow_id = %id,
            cooldown_seconds = self.inner.config.retry_cooldown.num_seconds(),
            event = "retry_scheduled",
            "Scheduled next delivery attempt"
        );
        Ok(WorkflowResponse::from_workflow(&workflow, MSG_RETRY_SCHEDULED, now))
    }

    /// Check a code submitted by the user
    ///
    /// # Returns
    ///
    /// * `Ok(VerifyOutcome)` - The code matched; the workflow is `COMPLETED`
    /// * `Err(WorkflowError::CodeExpired)` - The live code expired; resend
    /// * `Err(WorkflowError::CodeMismatch)` - Wrong code, with remaining tries
    /// * `Err(WorkflowError::TooManyMismatches)` - The code was burnt; resend
    pub async fn verify_code(&self, id: &WorkflowId, code: &str) -> WorkflowResult<VerifyOutcome> {
        let _guard = self.inner.locks.acquire(id).await;
        let mut workflow = self.load(id).await?;

        if workflow.status != WorkflowStatus::Pending {
            return Err(invalid_state(&workflow, "verify_code"));
        }

        if !is_well_formed_code(code, self.inner.config.code_length) {
            warn!(
                workflow_id = %id,
                code_length = code.len(),
                event = "invalid_code_format",
                "Invalid verification code format provided"
            );
            return Err(WorkflowError::invalid_request(format!(
                "Verification code must be {} digits",
                self.inner.config.code_length
            )));
        }

        let live_code = match workflow.code.as_ref() {
            Some(live_code) => live_code,
            None => return Err(WorkflowError::TooManyMismatches),
        };

        if live_code.is_expired() {
            info!(workflow_id = %id, event = "code_expired", "Submitted code has expired");
            return Err(WorkflowError::CodeExpired);
        }

        if live_code.matches(code) {
            workflow.transition_to(WorkflowStatus::Completed, "verify_code")?;
            workflow.code = None;
            self.inner.store.update(&mut workflow).await?;

            info!(
                workflow_id = %id,
                phone = %mask_phone_number(&workflow.phone),
                event = "code_verified",
                "Verification code successfully verified"
            );

            return Ok(VerifyOutcome {
                workflow_id: workflow.id.clone(),
                status: workflow.status,
                verified: true,
                activate_account: workflow.purpose == VerificationPurpose::Registration,
                purpose: workflow.purpose,
                phone: workflow.phone.clone(),
                user_id: workflow.user_id.clone(),
                message: MSG_COMPLETED.to_string(),
            });
        }

        let max = self.inner.config.max_code_mismatches;
        workflow.mismatch_count = (workflow.mismatch_count + 1).min(max);
        let remaining = max - workflow.mismatch_count;
        if remaining == 0 {
            workflow.code = None;
        }
        workflow.touch();
        self.inner.store.update(&mut workflow).await?;

        warn!(
            workflow_id = %id,
            remaining_attempts = remaining,
            event = "code_mismatch",
            "Verification code did not match"
        );
        Err(WorkflowError::CodeMismatch { remaining })
    }

    /// Issue and deliver a new code without starting a new delivery cycle
    pub async fn resend_code(&self, id: &WorkflowId) -> WorkflowResult<WorkflowResponse> {
        let _guard = self.inner.locks.acquire(id).await;
        let workflow = self.load(id).await?;

        if workflow.status != WorkflowStatus::Pending {
            return Err(invalid_state(&workflow, "resend_code"));
        }

        let last_delivery = workflow
            .delivery_history
            .last()
            .map(|record| record.timestamp)
            .unwrap_or(workflow.created_at);
        let elapsed = Utc::now() - last_delivery;
        let cooldown = self.inner.config.resend_cooldown;
        if elapsed < cooldown {
            let retry_after_seconds = (cooldown - elapsed).num_seconds().max(1);
            warn!(
                workflow_id = %id,
                retry_after_seconds,
                event = "rate_limit_exceeded",
                "Verification code resend requested too early"
            );
            return Err(WorkflowError::ResendTooSoon {
                retry_after_seconds,
            });
        }

        let (workflow, report) = self.run_delivery(id, false, "resend_code").await?;
        Ok(WorkflowResponse::from_workflow(
            &workflow,
            report.message(),
            Utc::now(),
        ))
    }

    /// Escalate a failed workflow to admin review on the user's request
    pub async fn request_admin_review(&self, id: &WorkflowId) -> WorkflowResult<WorkflowResponse> {
        let _guard = self.inner.locks.acquire(id).await;
        let mut workflow = self.load(id).await?;

        if workflow.status != WorkflowStatus::AwaitingConfirmation {
            return Err(invalid_state(&workflow, "request_admin_review"));
        }

        workflow.transition_to(WorkflowStatus::AdminReview, "request_admin_review")?;
        self.inner.store.update(&mut workflow).await?;

        info!(workflow_id = %id, event = "admin_review_requested", "User requested admin review");
        Ok(WorkflowResponse::from_workflow(
            &workflow,
            MSG_ADMIN_REVIEW,
            Utc::now(),
        ))
    }

    /// Abandon a workflow that has not been resolved yet
    ///
    /// A pending retry cooldown is cancelled and never delivers.
    pub async fn discard(&self, id: &WorkflowId) -> WorkflowResult<WorkflowResponse> {
        let _guard = self.inner.locks.acquire(id).await;
        let mut workflow = self.load(id).await?;

        if !matches!(
            workflow.status,
            WorkflowStatus::Pending
                | WorkflowStatus::AwaitingConfirmation
                | WorkflowStatus::RetryScheduled
        ) {
            return Err(invalid_state(&workflow, "discard"));
        }

        let cancelled_retry = self.inner.timers.cancel(id).await;
        workflow.transition_to(WorkflowStatus::Discarded, "discard")?;
        workflow.code = None;
        workflow.retry_scheduled_at = None;
        self.inner.store.update(&mut workflow).await?;

        info!(
            workflow_id = %id,
            cancelled_retry,
            event = "workflow_discarded",
            "Verification workflow discarded"
        );
        Ok(WorkflowResponse::from_workflow(
            &workflow,
            MSG_DISCARDED,
            Utc::now(),
        ))
    }

    /// Apply an administrator decision to a workflow in admin review
    ///
    /// # Returns
    ///
    /// * `Err(WorkflowError::AlreadyResolved)` - An earlier action already
    ///   verified or rejected the workflow, possibly through another manager
    ///   sharing the store; nothing changes
    /// * `Err(WorkflowError::InvalidState)` - The workflow is not in review
    /// * `Err(WorkflowError::Conflict)` - Another writer changed the workflow
    ///   without resolving it; retry
    pub async fn admin_verify(
        &self,
        request: AdminVerificationRequest,
    ) -> WorkflowResult<AdminVerificationResponse> {
        let action: AdminAction = request
            .action
            .parse()
            .map_err(WorkflowError::invalid_request)?;
        let admin_id = request.admin_id.trim();
        if admin_id.is_empty() {
            return Err(WorkflowError::invalid_request("admin_id is required"));
        }
        let id = &request.workflow_id;

        let _guard = self.inner.locks.acquire(id).await;
        let mut workflow = self.load(id).await?;

        if workflow.status.is_admin_resolved() {
            warn!(
                workflow_id = %id,
                admin_id,
                action = %action,
                status = %workflow.status,
                event = "admin_action_rejected",
                "Workflow already resolved"
            );
            return Err(WorkflowError::AlreadyResolved {
                workflow_id: id.clone(),
                status: workflow.status,
            });
        }
        if workflow.status != WorkflowStatus::AdminReview {
            return Err(invalid_state(&workflow, "admin_verify"));
        }

        workflow.transition_to(action.target_status(), "admin_verify")?;
        let message = match action {
            AdminAction::ManualVerify => {
                workflow.verified_by = Some(admin_id.to_string());
                workflow.code = None;
                "Phone number verified by administrator"
            }
            AdminAction::MarkInvalid => {
                workflow.rejection_reason = Some(
                    request
                        .notes
                        .clone()
                        .unwrap_or_else(|| "Marked invalid by administrator".to_string()),
                );
                workflow.code = None;
                "Verification marked as invalid"
            }
            AdminAction::RequestAlternative => {
                workflow.alternative_requested = true;
                "Alternative verification requested"
            }
        };
        workflow.annotate(admin_id, action, request.notes);
        if let Err(e) = self.inner.store.update(&mut workflow).await {
            return Err(match e {
                WorkflowError::Conflict { .. } => self.lost_admin_race(id, action, admin_id).await,
                other => other,
            });
        }

        info!(
            workflow_id = %id,
            admin_id,
            action = %action,
            status = %workflow.status,
            event = "admin_action",
            "Admin action applied"
        );

        Ok(AdminVerificationResponse {
            workflow_id: id.clone(),
            status: workflow.status,
            action_taken: action,
            verified: workflow.status == WorkflowStatus::AdminVerified,
            message: message.to_string(),
            admin_id: admin_id.to_string(),
            timestamp: workflow.updated_at,
        })
    }

    /// Error for an admin action whose write lost to another manager
    async fn lost_admin_race(
        &self,
        id: &WorkflowId,
        action: AdminAction,
        admin_id: &str,
    ) -> WorkflowError {
        let current = match self.load(id).await {
            Ok(current) => current,
            Err(e) => return e,
        };
        warn!(
            workflow_id = %id,
            admin_id,
            action = %action,
            status = %current.status,
            event = "admin_action_conflict",
            "Workflow changed by another writer before the admin action was stored"
        );
        if current.status.is_admin_resolved() {
            WorkflowError::AlreadyResolved {
                workflow_id: id.clone(),
                status: current.status,
            }
        } else {
            WorkflowError::Conflict {
                workflow_id: id.clone(),
            }
        }
    }

    /// Current state of a workflow
    pub async fn get_status(&self, id: &WorkflowId) -> WorkflowResult<WorkflowStatusResponse> {
        let workflow = self.load(id).await?;
        Ok(WorkflowStatusResponse::from(&workflow))
    }

    /// Evict every workflow past its deadline
    ///
    /// Non-terminal workflows are discarded first and their retry timers
    /// cancelled. Failures on single workflows are collected, not returned.
    pub async fn sweep_expired(&self) -> WorkflowResult<SweepResult> {
        let started = Instant::now();
        let expired = self.inner.store.list_expired(Utc::now()).await?;
        let mut result = SweepResult::default();

        for id in expired {
            match self.evict(&id).await {
                Ok(Some(discarded)) => {
                    result.evicted += 1;
                    if discarded {
                        result.discarded += 1;
                    }
                }
                Ok(None) => {}
                Err(e) => {
                    error!(workflow_id = %id, error = %e, event = "evict_failed", "Failed to evict workflow");
                    result.errors.push(format!("{}: {}", id, e));
                }
            }
        }
        result.pruned_locks = self.inner.locks.prune().await;
        result.duration_ms = started.elapsed().as_millis() as u64;

        if result.evicted > 0 {
            info!(
                evicted = result.evicted,
                discarded = result.discarded,
                event = "workflows_swept",
                "Swept expired workflows"
            );
        }
        Ok(result)
    }

    /// Delivery counters and store size
    pub async fn stats(&self) -> WorkflowResult<WorkflowStats> {
        let delivery = self.inner.stats.lock().await.clone();
        Ok(WorkflowStats {
            delivery,
            currency: self.inner.config.currency.clone(),
            stored_workflows: self.inner.store.len().await?,
            scheduled_retries: self.inner.timers.len().await,
        })
    }

    /// Fetch a live workflow, evicting it if its deadline passed
    async fn load(&self, id: &WorkflowId) -> WorkflowResult<VerificationWorkflow> {
        let workflow = self
            .inner
            .store
            .get(id)
            .await?
            .ok_or_else(|| not_found(id))?;

        if workflow.is_expired() {
            self.evict(id).await?;
            return Err(not_found(id));
        }
        Ok(workflow)
    }

    /// Remove a workflow from the store and cancel its timer
    ///
    /// Returns `None` if it was already gone, otherwise whether it had to be
    /// discarded (it was not terminal yet).
    async fn evict(&self, id: &WorkflowId) -> WorkflowResult<Option<bool>> {
        self.inner.timers.cancel(id).await;
        let Some(mut workflow) = self.inner.store.remove(id).await? else {
            return Ok(None);
        };

        let discarded = !workflow.status.is_terminal();
        if discarded {
            let previous = workflow.status;
            workflow.transition_to(WorkflowStatus::Discarded, "expire")?;
            info!(
                workflow_id = %id,
                previous_status = %previous,
                event = "workflow_expired",
                "Discarded expired workflow"
            );
        } else {
            debug!(workflow_id = %id, status = %workflow.status, "Evicted resolved workflow");
        }
        Ok(Some(discarded))
    }

    /// Run one delivery: new code, free channel, then paid channel
    ///
    /// The workflow is persisted with `delivering` set before any channel
    /// call and re-read afterwards, so a sweep during the calls surfaces as
    /// `NotFound`. Callers hold the workflow's operation lock.
    async fn run_delivery(
        &self,
        id: &WorkflowId,
        new_cycle: bool,
        operation: &'static str,
    ) -> WorkflowResult<(VerificationWorkflow, DeliveryReport)> {
        let config = &self.inner.config;
        let mut workflow = self.load(id).await?;

        if new_cycle {
            workflow.begin_cycle();
        }
        let code = workflow
            .issue_code(config.code_length, config.code_ttl)
            .digits
            .clone();
        workflow.delivering = true;
        self.inner.store.update(&mut workflow).await?;
        let written_version = workflow.version;

        let text = render_code_message(workflow.language, &code, config.code_ttl_minutes());
        let attempts = self.send_through_channels(id, &workflow.phone, &text).await;
        let report = DeliveryReport {
            channel: attempts
                .iter()
                .find(|attempt| attempt.result.is_ok())
                .map(|attempt| attempt.channel)
                .unwrap_or(DeliveryChannel::NoneAvailable),
            error: attempts.last().and_then(|attempt| attempt.result.clone().err()),
        };
        self.record_stats(&attempts, &report).await;

        let mut workflow = self.load(id).await?;
        if workflow.version != written_version {
            warn!(
                workflow_id = %id,
                status = %workflow.status,
                event = "delivery_result_dropped",
                "Workflow changed by another writer during delivery"
            );
            return Err(WorkflowError::Conflict {
                workflow_id: id.clone(),
            });
        }
        for attempt in attempts {
            let (outcome, error, message_id) = match attempt.result {
                Ok(message_id) => (DeliveryOutcome::Sent, None, message_id),
                Err(e) => (DeliveryOutcome::Failed, Some(e.to_string()), None),
            };
            workflow.record_attempt(attempt.channel, outcome, error, message_id, attempt.cost);
        }
        workflow.delivering = false;
        workflow.retry_scheduled_at = None;

        match &report.error {
            None => {
                workflow.transition_to(WorkflowStatus::Pending, operation)?;
                workflow.last_error = None;
            }
            Some(e) => {
                workflow.transition_to(WorkflowStatus::AwaitingConfirmation, operation)?;
                workflow.last_error = Some(e.to_string());
            }
        }
        self.inner.store.update(&mut workflow).await?;

        if report.delivered() {
            info!(
                workflow_id = %id,
                channel = %report.channel,
                attempt_count = workflow.attempt_count,
                event = "code_delivered",
                "Verification code delivered"
            );
        } else {
            warn!(
                workflow_id = %id,
                attempt_count = workflow.attempt_count,
                event = "delivery_failed",
                "All delivery channels failed"
            );
        }
        Ok((workflow, report))
    }

    async fn send_through_channels(
        &self,
        id: &WorkflowId,
        phone: &str,
        text: &str,
    ) -> Vec<ChannelAttempt> {
        let timeout = self.inner.config.delivery_timeout;
        let timed_out = || DeliveryError::Timeout {
            seconds: timeout.as_secs(),
        };
        let mut attempts = Vec::with_capacity(2);

        let free = tokio::time::timeout(timeout, self.inner.free_channel.send(phone, text))
            .await
            .unwrap_or_else(|_| Err(timed_out()));
        match free {
            Ok(()) => {
                attempts.push(ChannelAttempt {
                    channel: DeliveryChannel::Free,
                    result: Ok(None),
                    cost: 0,
                });
                return attempts;
            }
            Err(e) => {
                warn!(
                    workflow_id = %id,
                    provider = self.inner.free_channel.name(),
                    error = %e,
                    event = "free_channel_failed",
                    "Free channel could not deliver, falling back to paid channel"
                );
                attempts.push(ChannelAttempt {
                    channel: DeliveryChannel::Free,
                    result: Err(e),
                    cost: 0,
                });
            }
        }

        let paid = tokio::time::timeout(timeout, self.inner.paid_channel.send(phone, text))
            .await
            .unwrap_or_else(|_| Err(timed_out()));
        match paid {
            Ok(receipt) => attempts.push(ChannelAttempt {
                channel: DeliveryChannel::Paid,
                result: Ok(Some(receipt.message_id)),
                cost: self.inner.config.paid_cost_per_message,
            }),
            Err(e) => {
                warn!(
                    workflow_id = %id,
                    provider = self.inner.paid_channel.name(),
                    error = %e,
                    event = "paid_channel_failed",
                    "Paid channel could not deliver"
                );
                attempts.push(ChannelAttempt {
                    channel: DeliveryChannel::Paid,
                    result: Err(e),
                    cost: 0,
                });
            }
        }
        attempts
    }

    async fn record_stats(&self, attempts: &[ChannelAttempt], report: &DeliveryReport) {
        let mut stats = self.inner.stats.lock().await;
        match report.channel {
            DeliveryChannel::Free => stats.free_sent += 1,
            DeliveryChannel::Paid => stats.paid_sent += 1,
            DeliveryChannel::NoneAvailable => stats.failed += 1,
        }
        stats.total_cost += attempts.iter().map(|attempt| attempt.cost).sum::<u64>();
    }

    /// Start the cooldown timer of a confirmed retry
    async fn schedule_retry(&self, id: WorkflowId) {
        let cancelled = self.inner.timers.register(&id).await;
        let delay = self.inner.config.retry_cooldown_std();
        let manager = self.clone();

        tokio::spawn(async move {
            tokio::select! {
                _ = tokio::time::sleep(delay) => {
                    manager.inner.timers.complete(&id).await;
                    if let Err(e) = manager.run_scheduled_retry(&id).await {
                        warn!(
                            workflow_id = %id,
                            error = %e,
                            event = "scheduled_retry_failed",
                            "Scheduled delivery did not run"
                        );
                    }
                }
                _ = cancelled => {
                    debug!(workflow_id = %id, event = "retry_cancelled", "Retry cooldown cancelled");
                }
            }
        });
    }

    /// Delivery cycle started by an elapsed cooldown
    async fn run_scheduled_retry(&self, id: &WorkflowId) -> WorkflowResult<()> {
        let _guard = self.inner.locks.acquire(id).await;
        let workflow = self.load(id).await?;

        if workflow.status != WorkflowStatus::RetryScheduled {
            debug!(
                workflow_id = %id,
                status = %workflow.status,
                "Skipping scheduled retry, workflow moved on"
            );
            return Ok(());
        }

        self.run_delivery(id, true, "scheduled_retry").await?;
        Ok(())
    }
}

fn not_found(id: &WorkflowId) -> WorkflowError {
    WorkflowError::NotFound {
        workflow_id: id.clone(),
    }
}

fn invalid_state(workflow: &VerificationWorkflow, operation: &'static str) -> WorkflowError {
    WorkflowError::InvalidState {
        workflow_id: workflow.id.clone(),
        status: workflow.status,
        operation,
    }
}
