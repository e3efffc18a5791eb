//! Worker Pool - Keeps each queue staffed up to its configured maximum.
//!
//! The `WorkerPool` provides:
//! - One supervised tokio task per worker, tracked per queue
//! - Non-blocking reaping of finished workers and crash detection
//! - Top-up of per-queue deficits, suppressed while quiescing
//! - Pool statistics and metrics
//!
//! There is no restart backoff: a task that deterministically crashes its
//! worker is respawned against every tick until it is removed from the queue.

use std::collections::HashMap;
use std::time::Instant;

use futures::FutureExt;
use metrics::{counter, gauge};
use serde::Serialize;
use tokio::task::{JoinError, JoinHandle};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::context::TaskerContext;
use super::worker::{Worker, WorkerOutcome};
use crate::error::{ErrorCode, Result, TaskerError};

/// A live worker.
#[derive(Debug)]
struct WorkerHandle {
    id: Uuid,
    started_at: Instant,
    join: JoinHandle<WorkerOutcome>,
}

/// Statistics for the worker pool.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct WorkerPoolStats {
    /// Workers spawned
    pub spawned: u64,
    /// Workers that finished with a completed task
    pub completed: u64,
    /// Workers that re-enqueued their task
    pub retried: u64,
    /// Workers whose task failed terminally
    pub failed: u64,
    /// Workers that dropped an unrunnable payload
    pub fatal: u64,
    /// Workers that exited on quiesce without a task
    pub stopped: u64,
    /// Workers that panicked or were cancelled
    pub crashed: u64,
    /// Spawn attempts that failed
    pub spawn_failures: u64,
    /// Currently live workers
    pub live: usize,
}

impl WorkerPoolStats {
    /// Workers reaped so far, whatever their outcome.
    pub fn reaped(&self) -> u64 {
        self.completed + self.retried + self.failed + self.fatal + self.stopped + self.crashed
    }

    fn record(&mut self, outcome: &WorkerOutcome) {
        match outcome {
            WorkerOutcome::Completed => self.completed += 1,
            WorkerOutcome::Retried { .. } => self.retried += 1,
            WorkerOutcome::Failed => self.failed += 1,
            WorkerOutcome::Fatal(_) => self.fatal += 1,
            WorkerOutcome::Stopped => self.stopped += 1,
        }
    }
}

/// Per-queue pool of single-task workers.
pub struct WorkerPool {
    ctx: TaskerContext,
    shutdown: CancellationToken,
    workers: HashMap<String, Vec<WorkerHandle>>,
    stats: WorkerPoolStats,
}

impl WorkerPool {
    /// Create a pool. Spawning stops once `shutdown` is cancelled.
    pub fn new(ctx: TaskerContext, shutdown: CancellationToken) -> Self {
        tracing::info!(
            queues = ?ctx.config().workers,
            capacity = ctx.config().total_capacity(),
            "Worker pool created"
        );

        Self {
            ctx,
            shutdown,
            workers: HashMap::new(),
            stats: WorkerPoolStats::default(),
        }
    }

    pub fn is_quiescing(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    /// Live workers bound to `queue`.
    pub fn live_count(&self, queue: &str) -> usize {
        self.workers.get(queue).map(Vec::len).unwrap_or(0)
    }

    /// Live workers across all queues.
    pub fn live(&self) -> usize {
        self.workers.values().map(Vec::len).sum()
    }

    pub fn stats(&self) -> WorkerPoolStats {
        WorkerPoolStats {
            live: self.live(),
            ..self.stats.clone()
        }
    }

    /// Remove finished workers and log how they ended.
    ///
    /// Never blocks. Returns the live count afterwards.
    pub fn reap(&mut self) -> usize {
        let stats = &mut self.stats;

        for (queue, handles) in self.workers.iter_mut() {
            handles.retain_mut(|handle| {
                if !handle.join.is_finished() {
                    return true;
                }
                // A finished handle can still report pending when the
                // cooperative budget is spent; keep it for the next reap.
                match (&mut handle.join).now_or_never() {
                    Some(result) => {
                        Self::finish(stats, queue, handle, result);
                        false
                    }
                    None => true,
                }
            });
            gauge!("tasker_workers_live", "queue" => queue.clone()).set(handles.len() as f64);
        }

        self.live()
    }

    fn finish(
        stats: &mut WorkerPoolStats,
        queue: &str,
        handle: &WorkerHandle,
        result: std::result::Result<WorkerOutcome, JoinError>,
    ) {
        let runtime_ms = handle.started_at.elapsed().as_millis() as u64;

        match result {
            Ok(outcome) => {
                stats.record(&outcome);
                let exit_code = outcome.exit_code();
                if exit_code == 0 {
                    tracing::debug!(
                        worker_id = %handle.id,
                        queue = %queue,
                        exit_code,
                        outcome = outcome.label(),
                        runtime_ms,
                        "Worker exited"
                    );
                } else {
                    tracing::warn!(
                        worker_id = %handle.id,
                        queue = %queue,
                        exit_code,
                        outcome = outcome.label(),
                        runtime_ms,
                        "Worker exited with failure"
                    );
                }
                counter!("tasker_workers_exited_total", "queue" => queue.to_string(), "outcome" => outcome.label())
                    .increment(1);
            }
            Err(join_error) => {
                stats.crashed += 1;
                let reason = if join_error.is_panic() { "panicked" } else { "cancelled" };
                TaskerError::with_internal(ErrorCode::WorkerCrashed, "Worker crashed, its task is lost", join_error.to_string())
                    .with_context("worker_id", handle.id.to_string())
                    .with_context("queue", queue)
                    .with_context("reason", reason)
                    .with_context("runtime_ms", runtime_ms)
                    .log();
                counter!("tasker_workers_crashed_total", "queue" => queue.to_string()).increment(1);
            }
        }
    }

    /// Spawn workers to cover each queue's deficit.
    ///
    /// Queues with a maximum of 0 are skipped. Does nothing while quiescing.
    /// Returns the number of workers spawned.
    pub fn top_up(&mut self) -> usize {
        if self.is_quiescing() {
            return 0;
        }

        let queues: Vec<(String, usize)> = self
            .ctx
            .config()
            .workers
            .iter()
            .filter(|(_, max)| **max > 0)
            .map(|(queue, max)| (queue.clone(), *max))
            .collect();

        let mut spawned = 0;
        for (queue, max) in queues {
            let deficit = max.saturating_sub(self.live_count(&queue));
            for _ in 0..deficit {
                match self.spawn_worker(&queue) {
                    Ok(()) => spawned += 1,
                    Err(e) => {
                        // Capacity stays degraded until the next tick
                        self.stats.spawn_failures += 1;
                        e.log();
                        break;
                    }
                }
            }
        }

        if spawned > 0 {
            tracing::debug!(spawned, live = self.live(), "Worker pool topped up");
        }
        spawned
    }

    fn spawn_worker(&mut self, queue: &str) -> Result<()> {
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| TaskerError::spawn_failed(queue, e.to_string()))?;

        let worker = Worker::new(self.ctx.clone(), queue, self.shutdown.clone());
        let id = worker.id();
        let join = runtime.spawn(worker.run());

        self.workers.entry(queue.to_string()).or_default().push(WorkerHandle {
            id,
            started_at: Instant::now(),
            join,
        });
        self.stats.spawned += 1;
        counter!("tasker_workers_spawned_total", "queue" => queue.to_string()).increment(1);
        Ok(())
    }
}

impl std::fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerPool")
            .field("quiescing", &self.is_quiescing())
            .field("stats", &self.stats())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{TaskerConfig, TaskerOptions};
    use crate::store::InMemoryQueueStore;
    use crate::tasks::TaskRegistry;
    use std::sync::Arc;
    use std::time::Duration;

    fn pool(workers: &[(&str, usize)]) -> (WorkerPool, CancellationToken) {
        let config = TaskerConfig::configure(
            TaskerOptions::default()
                .workers(workers.iter().map(|(q, m)| (q.to_string(), *m)))
                .read_write_timeout(Duration::from_millis(20)),
        );
        let ctx = TaskerContext::new(config, Arc::new(InMemoryQueueStore::new()), TaskRegistry::new());
        let shutdown = CancellationToken::new();
        (WorkerPool::new(ctx, shutdown.clone()), shutdown)
    }

    #[test]
    fn test_spawn_without_runtime_is_counted() {
        let (mut pool, _shutdown) = pool(&[("default", 2)]);
        assert_eq!(pool.top_up(), 0);

        let stats = pool.stats();
        assert_eq!(stats.spawn_failures, 1);
        assert_eq!(stats.live, 0);
    }

    #[tokio::test]
    async fn test_top_up_fills_deficit_only() {
        let (mut pool, shutdown) = pool(&[("high", 0), ("default", 3), ("low", 1)]);

        assert_eq!(pool.top_up(), 4);
        assert_eq!(pool.live_count("default"), 3);
        assert_eq!(pool.live_count("low"), 1);
        assert_eq!(pool.live_count("high"), 0);

        // Already at capacity
        assert_eq!(pool.top_up(), 0);
        assert_eq!(pool.reap(), 4);

        shutdown.cancel();
    }

    #[tokio::test]
    async fn test_no_spawn_while_quiescing() {
        let (mut pool, shutdown) = pool(&[("default", 2)]);
        shutdown.cancel();
        assert_eq!(pool.top_up(), 0);
        assert_eq!(pool.stats().spawned, 0);
    }

    #[tokio::test]
    async fn test_reap_collects_stopped_workers() {
        let (mut pool, shutdown) = pool(&[("default", 2)]);
        pool.top_up();
        shutdown.cancel();

        // Idle workers notice quiescing after their current pop times out
        let deadline = Instant::now() + Duration::from_secs(2);
        while pool.reap() > 0 && Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        let stats = pool.stats();
        assert_eq!(stats.live, 0);
        assert_eq!(stats.stopped, 2);
        assert_eq!(stats.reaped(), 2);
    }
}
