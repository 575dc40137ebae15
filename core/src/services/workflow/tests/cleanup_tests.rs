//! Tests for expiry and the background sweeper

use std::sync::Arc;
use std::time::Duration;

use super::mocks::*;
use crate::domain::entities::workflow::WorkflowStatus;
use crate::errors::WorkflowError;
use crate::repositories::WorkflowStore;
use crate::services::workflow::cleanup::WorkflowSweeper;
use crate::services::workflow::config::WorkflowServiceConfig;

fn short_lived(free: MockFreeChannel, paid: MockPaidChannel, cooldown_ms: i64) -> Harness {
    let config = WorkflowServiceConfig {
        confirmation_timeout: chrono::Duration::milliseconds(100),
        retry_cooldown: chrono::Duration::milliseconds(cooldown_ms),
        ..test_config()
    };
    Harness::new(free, paid, config)
}

#[tokio::test]
async fn test_sweep_evicts_expired_workflows() {
    let h = short_lived(
        MockFreeChannel::new(Behavior::Deliver),
        MockPaidChannel::new(Behavior::Deliver),
        50,
    );
    let id = h
        .manager
        .start_verification(start_request("login"))
        .await
        .unwrap()
        .workflow_id;

    tokio::time::sleep(Duration::from_millis(150)).await;
    let result = h.manager.sweep_expired().await.unwrap();

    assert_eq!(result.evicted, 1);
    assert_eq!(result.discarded, 1);
    assert!(result.is_success());
    assert!(matches!(
        h.manager.get_status(&id).await,
        Err(WorkflowError::NotFound { .. })
    ));
    assert_eq!(h.manager.stats().await.unwrap().stored_workflows, 0);
}

#[tokio::test]
async fn test_expired_workflow_is_evicted_on_access() {
    let h = short_lived(
        MockFreeChannel::new(Behavior::Deliver),
        MockPaidChannel::new(Behavior::Deliver),
        50,
    );
    let id = h
        .manager
        .start_verification(start_request("login"))
        .await
        .unwrap()
        .workflow_id;
    let code = h.last_free_code();

    tokio::time::sleep(Duration::from_millis(150)).await;

    assert!(matches!(
        h.manager.verify_code(&id, &code).await,
        Err(WorkflowError::NotFound { .. })
    ));
    assert!(h.store.get(&id).await.unwrap().is_none());
}

#[tokio::test]
async fn test_resolved_workflows_are_evicted_without_discarding() {
    let h = short_lived(
        MockFreeChannel::new(Behavior::Deliver),
        MockPaidChannel::new(Behavior::Deliver),
        50,
    );
    let id = h
        .manager
        .start_verification(start_request("login"))
        .await
        .unwrap()
        .workflow_id;
    let code = h.last_free_code();
    h.manager.verify_code(&id, &code).await.unwrap();

    tokio::time::sleep(Duration::from_millis(150)).await;
    let result = h.manager.sweep_expired().await.unwrap();

    assert_eq!(result.evicted, 1);
    assert_eq!(result.discarded, 0);
}

#[tokio::test]
async fn test_sweep_cancels_pending_retry() {
    let h = short_lived(
        MockFreeChannel::unknown_recipient(),
        MockPaidChannel::failing(),
        10_000,
    );
    let id = h
        .manager
        .start_verification(start_request("login"))
        .await
        .unwrap()
        .workflow_id;
    let response = h.manager.confirm_retry(&id, true).await.unwrap();
    assert_eq!(response.status, WorkflowStatus::RetryScheduled);

    tokio::time::sleep(Duration::from_millis(150)).await;
    let result = h.manager.sweep_expired().await.unwrap();

    assert_eq!(result.discarded, 1);
    let stats = h.manager.stats().await.unwrap();
    assert_eq!(stats.scheduled_retries, 0);
    assert_eq!(h.paid.call_count(), 1);
}

#[tokio::test]
async fn test_sweep_leaves_live_workflows() {
    let h = Harness::new(
        MockFreeChannel::new(Behavior::Deliver),
        MockPaidChannel::new(Behavior::Deliver),
        test_config(),
    );
    let id = h
        .manager
        .start_verification(start_request("login"))
        .await
        .unwrap()
        .workflow_id;

    let result = h.manager.sweep_expired().await.unwrap();

    assert_eq!(result.evicted, 0);
    assert!(h.manager.get_status(&id).await.is_ok());
}

#[tokio::test]
async fn test_background_sweeper_evicts() {
    let h = short_lived(
        MockFreeChannel::new(Behavior::Deliver),
        MockPaidChannel::new(Behavior::Deliver),
        50,
    );
    let id = h
        .manager
        .start_verification(start_request("login"))
        .await
        .unwrap()
        .workflow_id;

    let sweeper = Arc::new(WorkflowSweeper::with_interval(
        h.manager.clone(),
        Duration::from_millis(20),
    ));
    let handle = sweeper.start_background_task();

    tokio::time::sleep(Duration::from_millis(250)).await;
    handle.abort();

    assert!(h.store.get(&id).await.unwrap().is_none());
}

#[tokio::test]
async fn test_run_once_on_empty_store() {
    let h = Harness::new(
        MockFreeChannel::new(Behavior::Deliver),
        MockPaidChannel::new(Behavior::Deliver),
        test_config(),
    );
    let sweeper = WorkflowSweeper::new(h.manager.clone());

    let result = sweeper.run_once().await.unwrap();

    assert_eq!(result.evicted, 0);
    assert!(result.is_success());
}
