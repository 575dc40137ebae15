//! Redis-backed storage
//!
//! The workflow store lets the web API, the admin API and the bot share
//! verification workflows; the chat directory maps phones to Telegram chats.

pub mod chat_directory;
pub mod redis_client;
pub mod workflow_store;

pub use chat_directory::RedisChatDirectory;
pub use redis_client::{RedisClient, SwapOutcome};
pub use workflow_store::{RedisWorkflowStore, WorkflowKeys, DEFAULT_RETENTION_SECONDS};

pub use st_shared::config::CacheConfig;
