//! Redis-backed workflow store
//!
//! Key layout under the configured prefix:
//! - `{prefix}:workflow:{id}` - the workflow as JSON, with a TTL reaching
//!   past `expires_at` so the sweeper still finds unresolved workflows.
//!   Updates are a server-side compare-and-set on its `version` field.
//! - `{prefix}:workflow:expiry` - sorted set of ids scored by `expires_at`
//!   in milliseconds, used by `list_expired` and `len`

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use tracing::debug;

use st_core::{VerificationWorkflow, WorkflowError, WorkflowId, WorkflowResult, WorkflowStore};

use super::redis_client::{RedisClient, SwapOutcome};

/// Extra lifetime of a stored workflow after its deadline
pub const DEFAULT_RETENTION_SECONDS: i64 = 300;

/// Key builder for the workflow store
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkflowKeys {
    prefix: String,
}

impl WorkflowKeys {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    pub fn workflow(&self, id: &WorkflowId) -> String {
        format!("{}:workflow:{}", self.prefix, id)
    }

    pub fn expiry_index(&self) -> String {
        format!("{}:workflow:expiry", self.prefix)
    }
}

/// JSON field the compare-and-set reads
const VERSION_FIELD: &str = "version";

/// TTL in seconds for a workflow written at `now`
pub(crate) fn record_ttl_seconds(
    workflow: &VerificationWorkflow,
    now: DateTime<Utc>,
    retention: Duration,
) -> u64 {
    let remaining = (workflow.expires_at - now).num_seconds().max(0);
    (remaining + retention.num_seconds()).max(1) as u64
}

pub(crate) fn encode_workflow(workflow: &VerificationWorkflow) -> WorkflowResult<String> {
    serde_json::to_string(workflow).map_err(WorkflowError::store)
}

pub(crate) fn decode_workflow(raw: &str) -> WorkflowResult<VerificationWorkflow> {
    serde_json::from_str(raw).map_err(WorkflowError::store)
}

/// [`WorkflowStore`] shared by every process connected to the same Redis
#[derive(Clone)]
pub struct RedisWorkflowStore {
    client: RedisClient,
    keys: WorkflowKeys,
    retention: Duration,
}

impl RedisWorkflowStore {
    /// Store using the client's key prefix and the default retention
    pub fn new(client: RedisClient) -> Self {
        let keys = WorkflowKeys::new(client.key_prefix());
        Self {
            client,
            keys,
            retention: Duration::seconds(DEFAULT_RETENTION_SECONDS),
        }
    }

    pub fn with_retention(mut self, retention: Duration) -> Self {
        self.retention = retention;
        self
    }

    pub fn keys(&self) -> &WorkflowKeys {
        &self.keys
    }
}

#[async_trait]
impl WorkflowStore for RedisWorkflowStore {
    async fn insert(&self, workflow: VerificationWorkflow) -> WorkflowResult<()> {
        let key = self.keys.workflow(&workflow.id);
        let ttl = record_ttl_seconds(&workflow, Utc::now(), self.retention);
        let raw = encode_workflow(&workflow)?;

        if !self.client.set_new_with_expiry(&key, &raw, ttl).await? {
            return Err(WorkflowError::invalid_request(format!(
                "Workflow {} already exists",
                workflow.id
            )));
        }
        self.client
            .index_add(
                &self.keys.expiry_index(),
                workflow.id.as_str(),
                workflow.expires_at.timestamp_millis(),
            )
            .await?;

        debug!(workflow_id = %workflow.id, ttl_seconds = ttl, "Workflow stored in Redis");
        Ok(())
    }

    async fn get(&self, id: &WorkflowId) -> WorkflowResult<Option<VerificationWorkflow>> {
        match self.client.get(&self.keys.workflow(id)).await? {
            Some(raw) => decode_workflow(&raw).map(Some),
            None => Ok(None),
        }
    }

    async fn update(&self, workflow: &mut VerificationWorkflow) -> WorkflowResult<()> {
        let key = self.keys.workflow(&workflow.id);
        let ttl = record_ttl_seconds(workflow, Utc::now(), self.retention);
        let mut next = workflow.clone();
        next.version += 1;
        let raw = encode_workflow(&next)?;

        let outcome = self
            .client
            .compare_and_set(&key, VERSION_FIELD, workflow.version, &raw, ttl)
            .await?;
        match outcome {
            SwapOutcome::Swapped => {
                workflow.version = next.version;
                Ok(())
            }
            SwapOutcome::VersionMismatch => {
                debug!(
                    workflow_id = %workflow.id,
                    version = workflow.version,
                    "Stale workflow update rejected"
                );
                Err(WorkflowError::Conflict {
                    workflow_id: workflow.id.clone(),
                })
            }
            SwapOutcome::Missing => Err(WorkflowError::NotFound {
                workflow_id: workflow.id.clone(),
            }),
        }
    }

    async fn remove(&self, id: &WorkflowId) -> WorkflowResult<Option<VerificationWorkflow>> {
        let raw = self.client.take(&self.keys.workflow(id)).await?;
        self.client
            .index_remove(&self.keys.expiry_index(), id.as_str())
            .await?;

        match raw {
            Some(raw) => decode_workflow(&raw).map(Some),
            None => Ok(None),
        }
    }

    async fn list_expired(&self, now: DateTime<Utc>) -> WorkflowResult<Vec<WorkflowId>> {
        let ids = self
            .client
            .index_below(&self.keys.expiry_index(), now.timestamp_millis())
            .await?;
        if !ids.is_empty() {
            debug!(count = ids.len(), "Expired workflows found in Redis index");
        }
        Ok(ids.into_iter().map(WorkflowId::from).collect())
    }

    /// Counts index entries; a workflow whose key expired before the sweep
    /// removed it is still counted until then.
    async fn len(&self) -> WorkflowResult<usize> {
        Ok(self.client.index_len(&self.keys.expiry_index()).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use st_core::{VerificationPurpose, WorkflowStatus};
    use st_shared::Language;

    fn sample_workflow() -> VerificationWorkflow {
        VerificationWorkflow::new(
            "+998901234567".to_string(),
            VerificationPurpose::Registration,
            Language::Uzbek,
            Some("user-42".to_string()),
            2,
            Duration::minutes(10),
        )
    }

    #[test]
    fn test_key_layout() {
        let keys = WorkflowKeys::new("saytoai");
        let id = WorkflowId::from("wf_0123456789ab");

        assert_eq!(keys.workflow(&id), "saytoai:workflow:wf_0123456789ab");
        assert_eq!(keys.expiry_index(), "saytoai:workflow:expiry");
    }

    #[test]
    fn test_ttl_covers_deadline_and_retention() {
        let workflow = sample_workflow();
        let now = workflow.created_at;

        let ttl = record_ttl_seconds(&workflow, now, Duration::seconds(300));
        assert_eq!(ttl, 600 + 300);

        let late = workflow.expires_at + Duration::minutes(30);
        assert_eq!(record_ttl_seconds(&workflow, late, Duration::seconds(300)), 300);
        assert_eq!(record_ttl_seconds(&workflow, late, Duration::zero()), 1);
    }

    #[test]
    fn test_json_round_trip_keeps_workflow() {
        let mut workflow = sample_workflow();
        workflow.begin_cycle();
        workflow.issue_code(6, Duration::minutes(5));
        workflow
            .transition_to(WorkflowStatus::AwaitingConfirmation, "test")
            .unwrap();
        workflow.last_error = Some("Provider rejected the message: Insufficient balance".into());

        let raw = encode_workflow(&workflow).unwrap();
        let decoded = decode_workflow(&raw).unwrap();

        assert_eq!(decoded, workflow);
    }

    #[test]
    fn test_stored_json_uses_snake_case_fields() {
        let workflow = sample_workflow();
        let json: serde_json::Value = serde_json::from_str(&encode_workflow(&workflow).unwrap()).unwrap();

        assert_eq!(json["id"], workflow.id.as_str());
        assert_eq!(json["status"], "pending");
        assert_eq!(json[VERSION_FIELD], 0);
        assert_eq!(json["purpose"], "registration");
        assert_eq!(json["attempt_count"], 0);
    }

    #[test]
    fn test_corrupt_value_is_store_error() {
        assert!(matches!(
            decode_workflow("{\"id\":"),
            Err(WorkflowError::Store { .. })
        ));
    }
}
