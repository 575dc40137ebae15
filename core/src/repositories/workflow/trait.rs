//! Workflow store trait defining the key-value interface the manager runs on.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::entities::workflow::{VerificationWorkflow, WorkflowId};
use crate::errors::WorkflowResult;

/// Key-value store of verification workflows
///
/// Every call is atomic per key. Several managers, possibly in different
/// processes, may share one store; `update` is a compare-and-set on
/// [`VerificationWorkflow::version`] so only one of two writers that read
/// the same version wins.
///
/// # Eviction
/// - `update` of a key that was removed fails with `NotFound`, so a writer
///   that lost the race to a sweep never resurrects the workflow
/// - `list_expired` returns ids whose `expires_at` is before `now`
#[async_trait]
pub trait WorkflowStore: Send + Sync {
    /// Insert a new workflow
    ///
    /// # Returns
    /// * `Ok(())` - Stored
    /// * `Err(WorkflowError::InvalidRequest)` - The id is already taken
    /// * `Err(WorkflowError::Store)` - Backend failure
    async fn insert(&self, workflow: VerificationWorkflow) -> WorkflowResult<()>;

    /// Fetch a workflow by id
    async fn get(&self, id: &WorkflowId) -> WorkflowResult<Option<VerificationWorkflow>>;

    /// Replace an existing workflow if the stored version still equals
    /// `workflow.version`; on success the version is incremented in both
    /// the store and `workflow`
    ///
    /// # Returns
    /// * `Ok(())` - Replaced
    /// * `Err(WorkflowError::NotFound)` - The key is absent (never stored or evicted)
    /// * `Err(WorkflowError::Conflict)` - Another writer updated it first
    async fn update(&self, workflow: &mut VerificationWorkflow) -> WorkflowResult<()>;

    /// Remove a workflow, returning it if it was present
    async fn remove(&self, id: &WorkflowId) -> WorkflowResult<Option<VerificationWorkflow>>;

    /// Ids of workflows whose deadline has passed at `now`
    async fn list_expired(&self, now: DateTime<Utc>) -> WorkflowResult<Vec<WorkflowId>>;

    /// Number of stored workflows
    async fn len(&self) -> WorkflowResult<usize>;

    async fn is_empty(&self) -> WorkflowResult<bool> {
        Ok(self.len().await? == 0)
    }
}
