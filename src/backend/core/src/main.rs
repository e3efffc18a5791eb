//! Tasker Dispatcher - Main entry point
//!
//! Runs the scheduler and the worker pool against Redis until SIGTERM or
//! Ctrl-C, then drains in-flight workers and exits 0. Any startup failure
//! (invalid configuration, unreachable store) exits 1.

use std::sync::Arc;

use tasker_core::{
    config::TaskerConfig,
    observability,
    orchestrator::{Dispatcher, TaskerContext},
    store::RedisQueueStore,
    tasks::{EchoTask, SleepTask, TaskRegistry},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Load configuration
    let config = match std::env::var("TASKER_CONFIG") {
        Ok(path) => TaskerConfig::from_file(&path)?,
        Err(_) => TaskerConfig::load()?,
    };

    // Initialize observability
    observability::init(&config)?;
    observability::metrics::register_metrics();
    if let Some(addr) = config.observability.metrics_addr {
        observability::metrics::install_prometheus(addr)?;
    }

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        "Starting Tasker Dispatcher"
    );

    // Connect to Redis
    let store = match RedisQueueStore::connect(&config).await {
        Ok(store) => store,
        Err(e) => {
            e.log();
            return Err(e.into());
        }
    };

    // Register tasks
    let mut registry = TaskRegistry::new();
    registry.register(EchoTask);
    registry.register(SleepTask);

    let ctx = TaskerContext::new(config, Arc::new(store), registry);
    let dispatcher = Dispatcher::connect(ctx).await?;

    let report = dispatcher.run().await;
    tracing::info!(
        ticks = report.ticks,
        completed = report.pool.completed,
        retried = report.pool.retried,
        failed = report.pool.failed,
        fatal = report.pool.fatal,
        crashed = report.pool.crashed,
        "Dispatcher shutdown complete"
    );

    Ok(())
}
