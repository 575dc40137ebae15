//! Redis cache client implementation
//!
//! A multiplexed async connection with reconnect and retry logic, exposing
//! the handful of commands the workflow store and chat directory need:
//! conditional writes with expiry, a versioned compare-and-set, atomic take,
//! and a sorted-set index.

use redis::{aio::MultiplexedConnection, AsyncCommands, Client, RedisError, RedisResult};
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

use st_shared::config::CacheConfig;

use crate::InfrastructureError;

type RedisFuture<T> = Pin<Box<dyn Future<Output = RedisResult<T>> + Send>>;

/// Replaces a JSON value only if its numeric `ARGV[1]` field equals `ARGV[2]`.
/// Replies 1 when written, 0 on a version mismatch, -1 when the key is absent.
const COMPARE_AND_SET_SCRIPT: &str = r#"
local current = redis.call('GET', KEYS[1])
if not current then
  return -1
end
local stored = cjson.decode(current)
if tonumber(stored[ARGV[1]] or 0) ~= tonumber(ARGV[2]) then
  return 0
end
redis.call('SET', KEYS[1], ARGV[3], 'EX', ARGV[4])
return 1
"#;

/// Result of [`RedisClient::compare_and_set`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwapOutcome {
    Swapped,
    VersionMismatch,
    Missing,
}

impl SwapOutcome {
    fn from_reply(reply: i64) -> Self {
        match reply {
            1 => SwapOutcome::Swapped,
            0 => SwapOutcome::VersionMismatch,
            _ => SwapOutcome::Missing,
        }
    }
}

/// Redis cache client with retry logic
///
/// Cloning is cheap; clones share the multiplexed connection.
#[derive(Clone)]
pub struct RedisClient {
    connection: MultiplexedConnection,
    key_prefix: String,
    /// Maximum number of attempts per operation
    max_retries: u32,
    /// Base delay between retries (exponential backoff)
    retry_delay_ms: u64,
}

impl RedisClient {
    /// Connect using the URL and retry settings of `config`
    pub async fn new(config: &CacheConfig) -> Result<Self, InfrastructureError> {
        info!("Creating Redis client with URL: {}", mask_url(&config.url));

        let client = Client::open(config.url.as_str()).map_err(|e| {
            error!("Failed to parse Redis URL: {}", e);
            InfrastructureError::Config(format!("Invalid Redis URL: {}", e))
        })?;

        let max_retries = config.max_retries.max(1);
        let connection =
            Self::create_connection_with_retry(client, max_retries, config.retry_delay_ms).await?;

        info!("Redis client created successfully");

        Ok(Self {
            connection,
            key_prefix: config.key_prefix.clone(),
            max_retries,
            retry_delay_ms: config.retry_delay_ms,
        })
    }

    /// Prefix every key of this deployment starts with
    pub fn key_prefix(&self) -> &str {
        &self.key_prefix
    }

    async fn create_connection_with_retry(
        client: Client,
        max_retries: u32,
        retry_delay_ms: u64,
    ) -> Result<MultiplexedConnection, InfrastructureError> {
        let mut attempts = 0;
        let mut delay = retry_delay_ms;

        loop {
            attempts += 1;
            debug!("Attempting to connect to Redis (attempt {})", attempts);

            match client.get_multiplexed_async_connection().await {
                Ok(connection) => {
                    info!("Successfully connected to Redis");
                    return Ok(connection);
                }
                Err(e) if attempts < max_retries => {
                    warn!(
                        "Failed to connect to Redis (attempt {}/{}): {}. Retrying in {}ms...",
                        attempts, max_retries, e, delay
                    );
                    sleep(Duration::from_millis(delay)).await;
                    delay = next_delay(delay);
                }
                Err(e) => {
                    error!(
                        "Failed to connect to Redis after {} attempts: {}",
                        attempts, e
                    );
                    return Err(InfrastructureError::Cache(e));
                }
            }
        }
    }

    /// Run `operation` on a fresh handle, retrying transient failures
    async fn execute_with_retry<F, T>(&self, operation: F) -> RedisResult<T>
    where
        F: Fn(MultiplexedConnection) -> RedisFuture<T>,
    {
        let mut attempts = 0;
        let mut delay = self.retry_delay_ms;

        loop {
            attempts += 1;

            match operation(self.connection.clone()).await {
                Ok(result) => return Ok(result),
                Err(e) if attempts < self.max_retries && is_retriable_error(&e) => {
                    warn!(
                        "Redis operation failed (attempt {}/{}): {}. Retrying in {}ms...",
                        attempts, self.max_retries, e, delay
                    );
                    sleep(Duration::from_millis(delay)).await;
                    delay = next_delay(delay);
                }
                Err(e) => {
                    error!("Redis operation failed after {} attempts: {}", attempts, e);
                    return Err(e);
                }
            }
        }
    }

    /// Check connectivity with PING
    pub async fn health_check(&self) -> Result<bool, InfrastructureError> {
        let response = self
            .execute_with_retry(|mut conn| {
                Box::pin(async move { redis::cmd("PING").query_async::<_, String>(&mut conn).await })
            })
            .await?;

        if response == "PONG" {
            debug!("Redis health check passed");
            Ok(true)
        } else {
            warn!("Redis health check returned unexpected response: {}", response);
            Ok(false)
        }
    }

    pub async fn get(&self, key: &str) -> Result<Option<String>, InfrastructureError> {
        debug!("Getting key '{}'", key);

        let value = self
            .execute_with_retry(|mut conn| {
                let key = key.to_string();
                Box::pin(async move { conn.get::<_, Option<String>>(key).await })
            })
            .await?;
        Ok(value)
    }

    /// Set a value without expiry
    pub async fn set(&self, key: &str, value: &str) -> Result<(), InfrastructureError> {
        debug!("Setting key '{}'", key);

        self.execute_with_retry(|mut conn| {
            let key = key.to_string();
            let value = value.to_string();
            Box::pin(async move { conn.set::<_, _, ()>(key, value).await })
        })
        .await?;
        Ok(())
    }

    /// `SET key value NX EX ttl`
    ///
    /// Returns `false` when the key already exists.
    pub async fn set_new_with_expiry(
        &self,
        key: &str,
        value: &str,
        expiry_seconds: u64,
    ) -> Result<bool, InfrastructureError> {
        self.conditional_set(key, value, expiry_seconds, "NX").await
    }

    async fn conditional_set(
        &self,
        key: &str,
        value: &str,
        expiry_seconds: u64,
        condition: &'static str,
    ) -> Result<bool, InfrastructureError> {
        debug!(
            "Setting key '{}' ({}) with expiry {}s",
            key, condition, expiry_seconds
        );

        let reply = self
            .execute_with_retry(|mut conn| {
                let key = key.to_string();
                let value = value.to_string();
                Box::pin(async move {
                    redis::cmd("SET")
                        .arg(key)
                        .arg(value)
                        .arg(condition)
                        .arg("EX")
                        .arg(expiry_seconds)
                        .query_async::<_, Option<String>>(&mut conn)
                        .await
                })
            })
            .await?;
        Ok(reply.is_some())
    }

    /// Replace a JSON value with expiry if its `version_field` still holds
    /// `expected_version`, atomically on the server
    pub async fn compare_and_set(
        &self,
        key: &str,
        version_field: &str,
        expected_version: u64,
        value: &str,
        expiry_seconds: u64,
    ) -> Result<SwapOutcome, InfrastructureError> {
        debug!(
            "Compare-and-set key '{}' at {} {} with expiry {}s",
            key, version_field, expected_version, expiry_seconds
        );

        let reply = self
            .execute_with_retry(|mut conn| {
                let key = key.to_string();
                let version_field = version_field.to_string();
                let value = value.to_string();
                Box::pin(async move {
                    let script = redis::Script::new(COMPARE_AND_SET_SCRIPT);
                    let mut invocation = script.key(key);
                    invocation
                        .arg(version_field)
                        .arg(expected_version)
                        .arg(value)
                        .arg(expiry_seconds);
                    invocation.invoke_async::<_, i64>(&mut conn).await
                })
            })
            .await?;
        Ok(SwapOutcome::from_reply(reply))
    }

    /// Read and delete a key in one transaction
    pub async fn take(&self, key: &str) -> Result<Option<String>, InfrastructureError> {
        debug!("Taking key '{}'", key);

        let (value, _deleted) = self
            .execute_with_retry(|mut conn| {
                let key = key.to_string();
                Box::pin(async move {
                    let mut pipe = redis::pipe();
                    pipe.atomic().get(&key).del(&key);
                    pipe.query_async::<_, (Option<String>, u32)>(&mut conn).await
                })
            })
            .await?;
        Ok(value)
    }

    /// Delete a key, returning whether it existed
    pub async fn delete(&self, key: &str) -> Result<bool, InfrastructureError> {
        debug!("Deleting key '{}'", key);

        let deleted = self
            .execute_with_retry(|mut conn| {
                let key = key.to_string();
                Box::pin(async move { conn.del::<_, u32>(key).await })
            })
            .await?;
        Ok(deleted > 0)
    }

    /// Add or move `member` in a sorted-set index
    pub async fn index_add(
        &self,
        index: &str,
        member: &str,
        score: i64,
    ) -> Result<(), InfrastructureError> {
        self.execute_with_retry(|mut conn| {
            let index = index.to_string();
            let member = member.to_string();
            Box::pin(async move {
                redis::cmd("ZADD")
                    .arg(index)
                    .arg(score)
                    .arg(member)
                    .query_async::<_, i64>(&mut conn)
                    .await
            })
        })
        .await?;
        Ok(())
    }

    pub async fn index_remove(&self, index: &str, member: &str) -> Result<(), InfrastructureError> {
        self.execute_with_retry(|mut conn| {
            let index = index.to_string();
            let member = member.to_string();
            Box::pin(async move {
                redis::cmd("ZREM")
                    .arg(index)
                    .arg(member)
                    .query_async::<_, i64>(&mut conn)
                    .await
            })
        })
        .await?;
        Ok(())
    }

    /// Members whose score is strictly below `max_score`
    pub async fn index_below(
        &self,
        index: &str,
        max_score: i64,
    ) -> Result<Vec<String>, InfrastructureError> {
        let members = self
            .execute_with_retry(|mut conn| {
                let index = index.to_string();
                Box::pin(async move {
                    redis::cmd("ZRANGEBYSCORE")
                        .arg(index)
                        .arg("-inf")
                        .arg(format!("({}", max_score))
                        .query_async::<_, Vec<String>>(&mut conn)
                        .await
                })
            })
            .await?;
        Ok(members)
    }

    pub async fn index_len(&self, index: &str) -> Result<usize, InfrastructureError> {
        let len = self
            .execute_with_retry(|mut conn| {
                let index = index.to_string();
                Box::pin(async move {
                    redis::cmd("ZCARD")
                        .arg(index)
                        .query_async::<_, usize>(&mut conn)
                        .await
                })
            })
            .await?;
        Ok(len)
    }
}

/// Exponential backoff capped at 5 seconds
fn next_delay(delay_ms: u64) -> u64 {
    (delay_ms.max(1) * 2).min(5000)
}

/// Whether a failed operation is transient and worth retrying
pub(crate) fn is_retriable_error(error: &RedisError) -> bool {
    matches!(
        error.kind(),
        redis::ErrorKind::IoError
            | redis::ErrorKind::ClientError
            | redis::ErrorKind::BusyLoadingError
            | redis::ErrorKind::TryAgain
    )
}

/// Mask credentials of a Redis URL for logging
pub(crate) fn mask_url(url: &str) -> String {
    if let (Some(at_pos), Some(proto_end)) = (url.rfind('@'), url.find("://")) {
        if at_pos > proto_end {
            return format!("{}****{}", &url[..proto_end + 3], &url[at_pos..]);
        }
    }
    url.to_string()
}
