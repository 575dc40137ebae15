//! In-process workflow store backed by a `HashMap`

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::domain::entities::workflow::{VerificationWorkflow, WorkflowId};
use crate::errors::{WorkflowError, WorkflowResult};

use super::r#trait::WorkflowStore;

/// Workflow store for single-instance deployments and tests
///
/// The lock is held only for the duration of one map operation.
#[derive(Clone, Default)]
pub struct InMemoryWorkflowStore {
    workflows: Arc<RwLock<HashMap<WorkflowId, VerificationWorkflow>>>,
}

impl InMemoryWorkflowStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl WorkflowStore for InMemoryWorkflowStore {
    async fn insert(&self, workflow: VerificationWorkflow) -> WorkflowResult<()> {
        let mut workflows = self.workflows.write().await;

        if workflows.contains_key(&workflow.id) {
            return Err(WorkflowError::invalid_request(format!(
                "Workflow {} already exists",
                workflow.id
            )));
        }

        workflows.insert(workflow.id.clone(), workflow);
        Ok(())
    }

    async fn get(&self, id: &WorkflowId) -> WorkflowResult<Option<VerificationWorkflow>> {
        let workflows = self.workflows.read().await;
        Ok(workflows.get(id).cloned())
    }

    async fn update(&self, workflow: &mut VerificationWorkflow) -> WorkflowResult<()> {
        let mut workflows = self.workflows.write().await;

        match workflows.get_mut(&workflow.id) {
            Some(existing) if existing.version != workflow.version => {
                Err(WorkflowError::Conflict {
                    workflow_id: workflow.id.clone(),
                })
            }
            Some(existing) => {
                workflow.version += 1;
                *existing = workflow.clone();
                Ok(())
            }
            None => Err(WorkflowError::NotFound {
                workflow_id: workflow.id.clone(),
            }),
        }
    }

    async fn remove(&self, id: &WorkflowId) -> WorkflowResult<Option<VerificationWorkflow>> {
        let mut workflows = self.workflows.write().await;
        Ok(workflows.remove(id))
    }

    async fn list_expired(&self, now: DateTime<Utc>) -> WorkflowResult<Vec<WorkflowId>> {
        let workflows = self.workflows.read().await;
        Ok(workflows
            .values()
            .filter(|workflow| workflow.is_expired_at(now))
            .map(|workflow| workflow.id.clone())
            .collect())
    }

    async fn len(&self) -> WorkflowResult<usize> {
        Ok(self.workflows.read().await.len())
    }
}
