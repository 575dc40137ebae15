//! Assembly of a production workflow manager
//!
//! Every service embedding the workflow (web API, admin API, bot) calls
//! [`build_workflow_manager`] with the same configuration; they then share
//! workflows through Redis.

use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::info;

use st_core::{WorkflowManager, WorkflowServiceConfig, WorkflowSweeper};

use crate::cache::{RedisChatDirectory, RedisClient, RedisWorkflowStore};
use crate::config::InfrastructureConfig;
use crate::sms::{
    create_free_channel, create_paid_channel, ChatDirectory, FreeChannelAdapter,
    PaidChannelAdapter,
};
use crate::InfrastructureError;

pub type ProductionWorkflowManager =
    WorkflowManager<FreeChannelAdapter, PaidChannelAdapter, RedisWorkflowStore>;

/// Connected infrastructure handles
pub struct Infrastructure {
    pub manager: ProductionWorkflowManager,
    /// Directory the bot registers phone to chat pairings in
    pub chat_directory: Arc<RedisChatDirectory>,
}

impl Infrastructure {
    /// Start the expiry sweeper at the configured interval
    pub fn spawn_sweeper(&self) -> JoinHandle<()> {
        Arc::new(WorkflowSweeper::new(self.manager.clone())).start_background_task()
    }
}

/// Connect to Redis and wire channels, store and manager
pub async fn connect(config: &InfrastructureConfig) -> Result<Infrastructure, InfrastructureError> {
    info!("Initializing infrastructure services...");

    let redis = RedisClient::new(&config.cache).await?;
    let chat_directory = Arc::new(RedisChatDirectory::new(redis.clone()));
    let directory: Arc<dyn ChatDirectory> = chat_directory.clone();

    let free = create_free_channel(&config.telegram, directory)?;
    let paid = create_paid_channel(&config.eskiz)?;
    let store = RedisWorkflowStore::new(redis);

    let workflow_config =
        WorkflowServiceConfig::try_from(&config.workflow).map_err(InfrastructureError::Config)?;
    let manager = WorkflowManager::new(
        Arc::new(free),
        Arc::new(paid),
        Arc::new(store),
        workflow_config,
    );

    info!("Infrastructure services initialized successfully");
    Ok(Infrastructure {
        manager,
        chat_directory,
    })
}

/// Shorthand for [`connect`] when only the manager is needed
pub async fn build_workflow_manager(
    config: &InfrastructureConfig,
) -> Result<ProductionWorkflowManager, InfrastructureError> {
    Ok(connect(config).await?.manager)
}
