//! Top-level supervisor.
//!
//! The dispatcher owns the worker pool and the scheduler task. Each tick it
//! reaps finished workers and, unless quiescing, tops every queue back up to
//! its maximum. A termination signal or [`Dispatcher::stop_gracefully`] only
//! stops new spawns; `run` returns once the last in-flight worker is reaped.

use serde::Serialize;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::context::TaskerContext;
use super::scheduler::Scheduler;
use super::worker_pool::{WorkerPool, WorkerPoolStats};
use crate::error::{ErrorCode, Result, TaskerError};
use crate::observability::metrics::set_queue_depth;

/// Triggers graceful stop from anywhere.
#[derive(Debug, Clone)]
pub struct StopHandle {
    token: CancellationToken,
}

impl StopHandle {
    /// Stop spawning workers. Idempotent.
    pub fn stop_gracefully(&self) {
        if !self.token.is_cancelled() {
            info!("Graceful stop requested, draining workers");
        }
        self.token.cancel();
    }

    pub fn is_quiescing(&self) -> bool {
        self.token.is_cancelled()
    }
}

/// Summary returned when [`Dispatcher::run`] finishes.
#[derive(Debug, Clone, Serialize)]
pub struct DispatcherReport {
    /// Supervisor ticks executed
    pub ticks: u64,
    /// Whether a scheduler ran in this process
    pub scheduler_ran: bool,
    /// Final pool statistics
    pub pool: WorkerPoolStats,
}

pub struct Dispatcher {
    ctx: TaskerContext,
    shutdown: CancellationToken,
}

impl Dispatcher {
    pub fn new(ctx: TaskerContext) -> Self {
        Self {
            ctx,
            shutdown: CancellationToken::new(),
        }
    }

    /// Validate the configuration and verify the store is reachable before
    /// building the dispatcher.
    pub async fn connect(ctx: TaskerContext) -> Result<Self> {
        ctx.config().validate()?;

        if let Err(e) = ctx.store().ping().await {
            return Err(match e.code() {
                ErrorCode::StoreConnectionFailed => e,
                _ => TaskerError::connection_failed(ctx.store().name(), e.to_string()).with_source(e),
            });
        }
        Ok(Self::new(ctx))
    }

    pub fn context(&self) -> &TaskerContext {
        &self.ctx
    }

    pub fn stop_handle(&self) -> StopHandle {
        StopHandle {
            token: self.shutdown.clone(),
        }
    }

    /// Stop spawning workers. Idempotent; in-flight workers are not touched.
    pub fn stop_gracefully(&self) {
        self.stop_handle().stop_gracefully();
    }

    pub fn is_quiescing(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    /// Supervise until quiescing and fully drained.
    pub async fn run(&self) -> DispatcherReport {
        let config = self.ctx.config();
        let tick = config.tick;

        info!(
            namespace = %config.namespace,
            store = self.ctx.store().name(),
            queues = ?config.workers,
            tasks = ?self.ctx.registry().names(),
            "Dispatcher starting"
        );

        let signals = listen_for_signals(self.stop_handle());

        let scheduler_shutdown = CancellationToken::new();
        let scheduler = config.scheduler_enabled.then(|| {
            tokio::spawn(Scheduler::new(self.ctx.clone()).run(scheduler_shutdown.clone()))
        });

        let mut pool = WorkerPool::new(self.ctx.clone(), self.shutdown.clone());
        let mut ticks = 0u64;
        let mut draining_logged = false;

        loop {
            let live = pool.reap();

            if self.is_quiescing() {
                if live == 0 {
                    break;
                }
                if !draining_logged {
                    info!(live, "Waiting for in-flight workers");
                    draining_logged = true;
                }
            } else {
                pool.top_up();
            }

            if config.observability.metrics_addr.is_some() {
                self.sample_queue_depths().await;
            }

            ticks += 1;
            tokio::time::sleep(tick).await;
        }

        scheduler_shutdown.cancel();
        if let Some(handle) = scheduler {
            if let Err(e) = handle.await {
                error!(error = %e, "Scheduler task ended abnormally");
            }
        }
        signals.abort();

        let report = DispatcherReport {
            ticks,
            scheduler_ran: config.scheduler_enabled,
            pool: pool.stats(),
        };
        info!(
            ticks = report.ticks,
            spawned = report.pool.spawned,
            crashed = report.pool.crashed,
            "Dispatcher stopped"
        );
        report
    }

    async fn sample_queue_depths(&self) {
        let keys = self.ctx.keys();
        for queue in self.ctx.config().workers.keys() {
            match self.ctx.store().list_len(&keys.ready(queue)).await {
                Ok(depth) => set_queue_depth(queue, depth),
                Err(e) => debug!(queue = %queue, error = %e, "Queue depth sample failed"),
            }
        }
    }
}

/// Wait for SIGTERM or Ctrl-C, then stop gracefully.
fn listen_for_signals(stop: StopHandle) -> JoinHandle<()> {
    tokio::spawn(async move {
        let ctrl_c = async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(error = %e, "Failed to install Ctrl+C handler");
                std::future::pending::<()>().await;
            }
        };

        #[cfg(unix)]
        let terminate = async {
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(mut signal) => {
                    signal.recv().await;
                }
                Err(e) => {
                    warn!(error = %e, "Failed to install SIGTERM handler");
                    std::future::pending::<()>().await;
                }
            }
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            _ = ctrl_c => {},
            _ = terminate => {},
        }

        info!("Shutdown signal received");
        stop.stop_gracefully();
    })
}
