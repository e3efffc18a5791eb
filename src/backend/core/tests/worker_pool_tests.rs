//! Tests for worker pool staffing and reaping.
//!
//! Tests cover:
//! - Live counts never exceeding per-queue maxima
//! - Replenishment after workers finish
//! - Outcome accounting (completed, fatal, stopped)
//! - Crash detection without affecting other workers
//! - Quiescing stops new spawns while live workers drain

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use tasker_core::config::{TaskerConfig, TaskerOptions};
use tasker_core::orchestrator::{TaskerContext, WorkerPool};
use tasker_core::store::{InMemoryQueueStore, QueueStore};
use tasker_core::tasks::{Task, TaskContext, TaskHandler, TaskRegistry, TaskResult};

// ============================================================================
// Test Handlers
// ============================================================================

struct Counts {
    runs: Arc<AtomicUsize>,
}

#[async_trait]
impl TaskHandler for Counts {
    fn name(&self) -> &'static str {
        "counts"
    }

    async fn perform(&self, _ctx: &TaskContext) -> TaskResult {
        self.runs.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

struct Panics;

#[async_trait]
impl TaskHandler for Panics {
    fn name(&self) -> &'static str {
        "panics"
    }

    async fn perform(&self, _ctx: &TaskContext) -> TaskResult {
        panic!("handler bug");
    }
}

// ============================================================================
// Helpers
// ============================================================================

struct Harness {
    pool: WorkerPool,
    store: InMemoryQueueStore,
    shutdown: CancellationToken,
    runs: Arc<AtomicUsize>,
}

fn harness(workers: &[(&str, usize)]) -> Harness {
    let store = InMemoryQueueStore::new();
    let runs = Arc::new(AtomicUsize::new(0));

    let mut registry = TaskRegistry::new();
    registry.register(Counts { runs: runs.clone() });
    registry.register(Panics);

    let config = TaskerConfig::configure(
        TaskerOptions::default()
            .workers(workers.iter().map(|(q, max)| (q.to_string(), *max)))
            .read_write_timeout(Duration::from_millis(20)),
    );
    let ctx = TaskerContext::new(config, Arc::new(store.clone()), registry);
    let shutdown = CancellationToken::new();

    Harness {
        pool: WorkerPool::new(ctx, shutdown.clone()),
        store,
        shutdown,
        runs,
    }
}

async fn push(store: &InMemoryQueueStore, queue: &str, task: &Task) {
    store
        .push(&format!("tasker:{queue}"), &task.encode().unwrap())
        .await
        .unwrap();
}

/// Reap until no worker is left or the deadline passes.
async fn drain(pool: &mut WorkerPool) {
    for _ in 0..200 {
        if pool.reap() == 0 {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

// ============================================================================
// Staffing Tests
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_live_count_never_exceeds_maximum() {
    let mut h = harness(&[("default", 3), ("low", 1)]);
    for n in 0..20 {
        push(&h.store, "default", &Task::new("counts").with_argument("n", n)).await;
    }

    for _ in 0..100 {
        h.pool.reap();
        h.pool.top_up();
        assert!(h.pool.live_count("default") <= 3);
        assert!(h.pool.live_count("low") <= 1);
        if h.runs.load(Ordering::SeqCst) == 20 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    assert_eq!(h.runs.load(Ordering::SeqCst), 20);
    assert_eq!(h.pool.live_count("default"), 3);
    assert_eq!(h.pool.live_count("low"), 1);

    h.shutdown.cancel();
    drain(&mut h.pool).await;
    assert_eq!(h.pool.stats().completed, 20);
}

#[tokio::test]
async fn test_finished_worker_is_replaced() {
    let mut h = harness(&[("default", 1)]);
    assert_eq!(h.pool.top_up(), 1);

    push(&h.store, "default", &Task::new("counts")).await;
    for _ in 0..200 {
        if h.runs.load(Ordering::SeqCst) == 1 && h.pool.reap() == 0 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert_eq!(h.pool.stats().completed, 1);

    assert_eq!(h.pool.top_up(), 1);
    assert_eq!(h.pool.stats().spawned, 2);
    assert_eq!(h.pool.live(), 1);

    h.shutdown.cancel();
    drain(&mut h.pool).await;
}

// ============================================================================
// Outcome Tests
// ============================================================================

#[tokio::test]
async fn test_unknown_task_type_is_fatal() {
    let mut h = harness(&[("default", 1)]);
    push(&h.store, "default", &Task::new("never_registered")).await;

    h.pool.top_up();
    // The worker drops the payload and exits without being asked to stop
    drain(&mut h.pool).await;

    let stats = h.pool.stats();
    assert_eq!(stats.fatal, 1);
    assert!(!h.pool.is_quiescing());
    assert_eq!(stats.reaped(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_crash_is_isolated_to_one_worker() {
    let mut h = harness(&[("default", 2)]);
    push(&h.store, "default", &Task::new("panics")).await;
    push(&h.store, "default", &Task::new("counts")).await;

    h.pool.top_up();
    for _ in 0..200 {
        h.pool.reap();
        if h.pool.stats().reaped() == 2 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    let stats = h.pool.stats();
    assert_eq!(stats.crashed, 1);
    assert_eq!(stats.completed, 1);
    assert_eq!(h.runs.load(Ordering::SeqCst), 1);
    assert_eq!(h.store.list_len("tasker:default").await.unwrap(), 0);
    assert_eq!(h.store.sorted_len("tasker:scheduled").await.unwrap(), 0);
}

// ============================================================================
// Quiesce Tests
// ============================================================================

#[tokio::test]
async fn test_quiescing_drains_without_spawning() {
    let mut h = harness(&[("default", 2), ("low", 1)]);
    assert_eq!(h.pool.top_up(), 3);

    h.shutdown.cancel();
    assert!(h.pool.is_quiescing());
    assert_eq!(h.pool.top_up(), 0);

    drain(&mut h.pool).await;

    let stats = h.pool.stats();
    assert_eq!(stats.spawned, 3);
    assert_eq!(stats.stopped, 3);
    assert_eq!(stats.live, 0);
}
