//! Integration tests for the Redis workflow store and chat directory
//!
//! These tests require a running Redis instance to execute.
//! Run with: cargo test -p st_infra --test redis_integration -- --ignored

use chrono::{Duration, Utc};

use st_core::{
    VerificationPurpose, VerificationWorkflow, WorkflowError, WorkflowStatus, WorkflowStore,
};
use st_infra::cache::{CacheConfig, RedisChatDirectory, RedisClient, RedisWorkflowStore};
use st_infra::sms::ChatDirectory;
use st_shared::Language;

async fn client() -> RedisClient {
    let mut config = CacheConfig::new(
        std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://localhost:6379".to_string()),
    );
    config.key_prefix = format!("st-test-{}", uuid::Uuid::new_v4().simple());
    RedisClient::new(&config).await.unwrap()
}

fn workflow(timeout: Duration) -> VerificationWorkflow {
    VerificationWorkflow::new(
        "+998901234567".to_string(),
        VerificationPurpose::Login,
        Language::English,
        None,
        2,
        timeout,
    )
}

#[tokio::test]
#[ignore] // Requires Redis server
async fn test_health_check() {
    assert!(client().await.health_check().await.unwrap());
}

#[tokio::test]
#[ignore] // Requires Redis server
async fn test_insert_get_update_remove() {
    let store = RedisWorkflowStore::new(client().await);
    let mut wf = workflow(Duration::minutes(10));
    let id = wf.id.clone();

    store.insert(wf.clone()).await.unwrap();
    assert!(matches!(
        store.insert(wf.clone()).await,
        Err(WorkflowError::InvalidRequest { .. })
    ));
    assert_eq!(store.get(&id).await.unwrap(), Some(wf.clone()));
    assert_eq!(store.len().await.unwrap(), 1);

    wf.transition_to(WorkflowStatus::Discarded, "test").unwrap();
    store.update(&mut wf).await.unwrap();
    let stored = store.get(&id).await.unwrap().unwrap();
    assert_eq!(stored.status, WorkflowStatus::Discarded);
    assert_eq!(stored.version, 1);

    assert_eq!(store.remove(&id).await.unwrap(), Some(wf.clone()));
    assert_eq!(store.get(&id).await.unwrap(), None);
    assert!(store.is_empty().await.unwrap());
    assert!(matches!(
        store.update(&mut wf).await,
        Err(WorkflowError::NotFound { .. })
    ));
}

#[tokio::test]
#[ignore] // Requires Redis server
async fn test_update_rejects_stale_writer() {
    let store = RedisWorkflowStore::new(client().await);
    let wf = workflow(Duration::minutes(10));
    store.insert(wf.clone()).await.unwrap();

    let mut first = store.get(&wf.id).await.unwrap().unwrap();
    let mut second = first.clone();

    first.transition_to(WorkflowStatus::Discarded, "test").unwrap();
    store.update(&mut first).await.unwrap();

    second.transition_to(WorkflowStatus::AwaitingConfirmation, "test").unwrap();
    assert!(matches!(
        store.update(&mut second).await,
        Err(WorkflowError::Conflict { .. })
    ));
    assert_eq!(
        store.get(&wf.id).await.unwrap().unwrap().status,
        WorkflowStatus::Discarded
    );
    store.remove(&wf.id).await.unwrap();
}

#[tokio::test]
#[ignore] // Requires Redis server
async fn test_list_expired_uses_deadline() {
    let store = RedisWorkflowStore::new(client().await);
    let live = workflow(Duration::minutes(10));
    let stale = workflow(Duration::milliseconds(1));
    store.insert(live.clone()).await.unwrap();
    store.insert(stale.clone()).await.unwrap();

    let expired = store
        .list_expired(Utc::now() + Duration::seconds(1))
        .await
        .unwrap();

    assert_eq!(expired, vec![stale.id.clone()]);
    store.remove(&live.id).await.unwrap();
    store.remove(&stale.id).await.unwrap();
}

#[tokio::test]
#[ignore] // Requires Redis server
async fn test_chat_directory_round_trip() {
    let directory = RedisChatDirectory::new(client().await);

    directory.register("+998901234567", 4242).await.unwrap();
    assert_eq!(directory.chat_id("+998 90 123 45 67").await.unwrap(), Some(4242));

    directory.unregister("+998901234567").await.unwrap();
    assert_eq!(directory.chat_id("+998901234567").await.unwrap(), None);
}
