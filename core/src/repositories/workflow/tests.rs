use chrono::{Duration, Utc};
use st_shared::Language;

use super::{InMemoryWorkflowStore, WorkflowStore};
use crate::domain::entities::workflow::{VerificationPurpose, VerificationWorkflow, WorkflowStatus};
use crate::errors::WorkflowError;

fn workflow(timeout: Duration) -> VerificationWorkflow {
    VerificationWorkflow::new(
        "+998901234567".to_string(),
        VerificationPurpose::Login,
        Language::English,
        Some("user-1".to_string()),
        2,
        timeout,
    )
}

#[tokio::test]
async fn test_insert_and_get() {
    let store = InMemoryWorkflowStore::new();
    let wf = workflow(Duration::minutes(10));
    let id = wf.id.clone();

    store.insert(wf.clone()).await.unwrap();

    assert_eq!(store.get(&id).await.unwrap(), Some(wf));
    assert_eq!(store.len().await.unwrap(), 1);
    assert!(!store.is_empty().await.unwrap());
}

#[tokio::test]
async fn test_insert_duplicate_fails() {
    let store = InMemoryWorkflowStore::new();
    let wf = workflow(Duration::minutes(10));

    store.insert(wf.clone()).await.unwrap();
    let result = store.insert(wf).await;

    assert!(matches!(result, Err(WorkflowError::InvalidRequest { .. })));
}

#[tokio::test]
async fn test_update_replaces_value() {
    let store = InMemoryWorkflowStore::new();
    let mut wf = workflow(Duration::minutes(10));
    store.insert(wf.clone()).await.unwrap();

    wf.status = WorkflowStatus::AwaitingConfirmation;
    store.update(&mut wf).await.unwrap();

    let stored = store.get(&wf.id).await.unwrap().unwrap();
    assert_eq!(stored.status, WorkflowStatus::AwaitingConfirmation);
    assert_eq!(stored.version, 1);
    assert_eq!(wf.version, 1);
}

#[tokio::test]
async fn test_update_from_stale_copy_conflicts() {
    let store = InMemoryWorkflowStore::new();
    let wf = workflow(Duration::minutes(10));
    store.insert(wf.clone()).await.unwrap();

    let mut first = store.get(&wf.id).await.unwrap().unwrap();
    let mut second = first.clone();

    first.status = WorkflowStatus::AdminReview;
    store.update(&mut first).await.unwrap();

    second.status = WorkflowStatus::Discarded;
    let result = store.update(&mut second).await;

    assert!(matches!(result, Err(WorkflowError::Conflict { .. })));
    assert_eq!(second.version, 0);
    let stored = store.get(&wf.id).await.unwrap().unwrap();
    assert_eq!(stored.status, WorkflowStatus::AdminReview);
}

#[tokio::test]
async fn test_update_after_remove_is_not_found() {
    let store = InMemoryWorkflowStore::new();
    let mut wf = workflow(Duration::minutes(10));
    store.insert(wf.clone()).await.unwrap();

    let removed = store.remove(&wf.id).await.unwrap();
    assert!(removed.is_some());

    let result = store.update(&mut wf).await;
    assert!(matches!(result, Err(WorkflowError::NotFound { .. })));
    assert!(store.get(&wf.id).await.unwrap().is_none());
    assert!(store.remove(&wf.id).await.unwrap().is_none());
}

#[tokio::test]
async fn test_list_expired() {
    let store = InMemoryWorkflowStore::new();
    let live = workflow(Duration::minutes(10));
    let expired = workflow(Duration::seconds(-1));
    store.insert(live.clone()).await.unwrap();
    store.insert(expired.clone()).await.unwrap();

    let ids = store.list_expired(Utc::now()).await.unwrap();

    assert_eq!(ids, vec![expired.id]);
}
