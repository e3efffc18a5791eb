//! CLI subcommands.

pub mod config;
pub mod enqueue;
pub mod status;

use anyhow::{Context, Result};
use tasker_core::config::TaskerConfig;
use tasker_core::store::RedisQueueStore;

/// Resolve configuration the same way the dispatcher does.
pub fn load_config(path: Option<&str>) -> Result<TaskerConfig> {
    let config = match path {
        Some(path) => TaskerConfig::from_file(path),
        None => TaskerConfig::load(),
    };
    config.context("Failed to load configuration")
}

/// Open a store connection for a one-shot command.
pub async fn connect(config: &TaskerConfig) -> Result<RedisQueueStore> {
    RedisQueueStore::connect(config)
        .await
        .with_context(|| format!("Failed to connect to {}", config.redis_url()))
}
