//! Background sweeper evicting expired workflows
//!
//! Expired workflows are also evicted lazily when an operation touches them;
//! the sweeper bounds how long an untouched workflow stays in the store.

use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::errors::WorkflowResult;
use crate::repositories::WorkflowStore;

use super::service::WorkflowManager;
use super::traits::{FreeChannel, PaidChannel};

/// Periodic driver of [`WorkflowManager::sweep_expired`]
pub struct WorkflowSweeper<F, P, S> {
    manager: WorkflowManager<F, P, S>,
    interval: Duration,
}

impl<F, P, S> WorkflowSweeper<F, P, S>
where
    F: FreeChannel + 'static,
    P: PaidChannel + 'static,
    S: WorkflowStore + 'static,
{
    /// Create a sweeper running at the manager's configured interval
    pub fn new(manager: WorkflowManager<F, P, S>) -> Self {
        let interval = manager.config().sweep_interval;
        Self { manager, interval }
    }

    pub fn with_interval(manager: WorkflowManager<F, P, S>, interval: Duration) -> Self {
        Self { manager, interval }
    }

    /// Run a single sweep
    pub async fn run_once(&self) -> WorkflowResult<SweepResult> {
        self.manager.sweep_expired().await
    }

    /// Start the sweeper as a background task
    ///
    /// The first sweep runs immediately. Abort the returned handle to stop.
    pub fn start_background_task(self: Arc<Self>) -> JoinHandle<()> {
        tokio::spawn(async move {
            info!(
                "Workflow sweeper started - will run every {} ms",
                self.interval.as_millis()
            );

            // interval() panics on a zero period
            let period = self.interval.max(Duration::from_millis(1));
            let mut interval_timer = tokio::time::interval(period);

            loop {
                interval_timer.tick().await;

                match self.run_once().await {
                    Ok(result) => {
                        if !result.is_success() {
                            warn!("Sweep completed with errors: {:?}", result.errors);
                        }
                    }
                    Err(e) => {
                        error!("Workflow sweep failed: {}", e);
                    }
                }
            }
        })
    }
}

/// Result of a sweep
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SweepResult {
    /// Workflows removed from the store
    pub evicted: usize,
    /// Evicted workflows that were still unresolved
    pub discarded: usize,
    /// Idle lock table entries dropped
    pub pruned_locks: usize,
    pub duration_ms: u64,
    /// Per-workflow failures
    pub errors: Vec<String>,
}

impl SweepResult {
    pub fn is_success(&self) -> bool {
        self.errors.is_empty()
    }
}
