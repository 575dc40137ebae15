//! Per-workflow operation locks and cancellable retry timers

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{oneshot, Mutex, OwnedMutexGuard};

use crate::domain::entities::workflow::WorkflowId;

/// Keyed lock table serializing operations on one workflow
///
/// Operations on different workflows never contend. The table mutex is only
/// held while looking up the entry, never across an await on the entry.
#[derive(Default)]
pub(crate) struct WorkflowLocks {
    table: Mutex<HashMap<WorkflowId, Arc<Mutex<()>>>>,
}

impl WorkflowLocks {
    pub(crate) async fn acquire(&self, id: &WorkflowId) -> OwnedMutexGuard<()> {
        let entry = {
            let mut table = self.table.lock().await;
            table.entry(id.clone()).or_default().clone()
        };
        entry.lock_owned().await
    }

    /// Drops entries nobody holds or waits on
    pub(crate) async fn prune(&self) -> usize {
        let mut table = self.table.lock().await;
        let before = table.len();
        table.retain(|_, lock| Arc::strong_count(lock) > 1);
        before - table.len()
    }

    #[cfg(test)]
    pub(crate) async fn len(&self) -> usize {
        self.table.lock().await.len()
    }
}

/// Cancellation handles of scheduled retries
///
/// Dropping or firing the sender cancels the timer task.
#[derive(Default)]
pub(crate) struct RetryTimers {
    pending: Mutex<HashMap<WorkflowId, oneshot::Sender<()>>>,
}

impl RetryTimers {
    /// Registers a timer and returns its cancellation receiver
    ///
    /// A timer already registered for the workflow is cancelled.
    pub(crate) async fn register(&self, id: &WorkflowId) -> oneshot::Receiver<()> {
        let (tx, rx) = oneshot::channel();
        let previous = self.pending.lock().await.insert(id.clone(), tx);
        if let Some(previous) = previous {
            let _ = previous.send(());
        }
        rx
    }

    /// Cancels the timer of a workflow; returns whether one was pending
    pub(crate) async fn cancel(&self, id: &WorkflowId) -> bool {
        match self.pending.lock().await.remove(id) {
            Some(tx) => {
                let _ = tx.send(());
                true
            }
            None => false,
        }
    }

    /// Forgets a timer that fired
    pub(crate) async fn complete(&self, id: &WorkflowId) {
        self.pending.lock().await.remove(id);
    }

    pub(crate) async fn len(&self) -> usize {
        self.pending.lock().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_same_workflow_is_serialized() {
        let locks = Arc::new(WorkflowLocks::default());
        let id = WorkflowId::from("wf_000000000001");

        let guard = locks.acquire(&id).await;
        let locks_clone = locks.clone();
        let id_clone = id.clone();
        let waiter = tokio::spawn(async move {
            let _guard = locks_clone.acquire(&id_clone).await;
        });

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        drop(guard);
        waiter.await.unwrap();
    }

    #[tokio::test]
    async fn test_different_workflows_do_not_contend() {
        let locks = WorkflowLocks::default();
        let _a = locks.acquire(&WorkflowId::from("wf_00000000000a")).await;
        let b = tokio::time::timeout(
            Duration::from_millis(50),
            locks.acquire(&WorkflowId::from("wf_00000000000b")),
        )
        .await;
        assert!(b.is_ok());
    }

    #[tokio::test]
    async fn test_prune_keeps_held_locks() {
        let locks = WorkflowLocks::default();
        let held = locks.acquire(&WorkflowId::from("wf_00000000000a")).await;
        drop(locks.acquire(&WorkflowId::from("wf_00000000000b")).await);

        assert_eq!(locks.prune().await, 1);
        assert_eq!(locks.len().await, 1);
        drop(held);
    }

    #[tokio::test]
    async fn test_cancel_signals_receiver() {
        let timers = RetryTimers::default();
        let id = WorkflowId::from("wf_00000000000c");
        let rx = timers.register(&id).await;

        assert!(timers.cancel(&id).await);
        assert!(rx.await.is_ok());
        assert!(!timers.cancel(&id).await);
        assert_eq!(timers.len().await, 0);
    }

    #[tokio::test]
    async fn test_register_replaces_previous_timer() {
        let timers = RetryTimers::default();
        let id = WorkflowId::from("wf_00000000000d");
        let first = timers.register(&id).await;
        let _second = timers.register(&id).await;

        assert!(first.await.is_ok());
        assert_eq!(timers.len().await, 1);
    }
}
