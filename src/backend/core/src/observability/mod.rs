//! Observability: Logging and Metrics.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::TaskerConfig;

/// Initialize the logging stack.
///
/// `RUST_LOG` takes precedence over `observability.log_level`. Nothing is
/// installed when `logging` is off, so every event is discarded.
pub fn init(config: &TaskerConfig) -> anyhow::Result<()> {
    if !config.logging {
        return Ok(());
    }

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.observability.log_level))?;

    if config.observability.json_logging {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .try_init()?;
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().with_target(false))
            .try_init()?;
    }

    Ok(())
}

/// Metrics registry and helpers.
pub mod metrics {
    use metrics::{describe_counter, describe_gauge, describe_histogram, gauge};
    use metrics_exporter_prometheus::PrometheusBuilder;
    use std::net::SocketAddr;

    /// Register all metric descriptions.
    pub fn register_metrics() {
        // Counters
        describe_counter!(
            "tasker_tasks_enqueued_total",
            "Tasks inserted into the delayed container"
        );
        describe_counter!(
            "tasker_tasks_completed_total",
            "Tasks whose perform returned normally"
        );
        describe_counter!(
            "tasker_tasks_retried_total",
            "Tasks re-enqueued after a retryable failure"
        );
        describe_counter!(
            "tasker_tasks_failed_total",
            "Tasks that failed terminally"
        );
        describe_counter!(
            "tasker_promotions_total",
            "Delayed entries promoted to a ready list"
        );
        describe_counter!(
            "tasker_promotion_conflicts_total",
            "Promotions aborted by a concurrent write"
        );
        describe_counter!(
            "tasker_workers_spawned_total",
            "Workers spawned"
        );
        describe_counter!(
            "tasker_workers_exited_total",
            "Workers reaped after a controlled exit"
        );
        describe_counter!(
            "tasker_workers_crashed_total",
            "Workers that panicked or were cancelled"
        );
        describe_counter!(
            "tasker_errors_total",
            "Engine errors by code"
        );

        // Gauges
        describe_gauge!(
            "tasker_workers_live",
            "Live workers per queue"
        );
        describe_gauge!(
            "tasker_queue_depth",
            "Ready tasks per queue"
        );

        // Histograms
        describe_histogram!(
            "tasker_task_duration_seconds",
            "Task perform duration in seconds"
        );
    }

    /// Serve Prometheus scrapes on `addr`.
    pub fn install_prometheus(addr: SocketAddr) -> anyhow::Result<()> {
        PrometheusBuilder::new().with_http_listener(addr).install()?;
        tracing::info!(%addr, "Prometheus exporter listening");
        Ok(())
    }

    /// Update queue depth.
    pub fn set_queue_depth(queue: &str, depth: usize) {
        gauge!("tasker_queue_depth", "queue" => queue.to_string()).set(depth as f64);
    }
}
