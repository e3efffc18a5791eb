//! Tests for delayed-task promotion.
//!
//! Tests cover:
//! - Execution delay is honoured to the sub-second
//! - Promotion within one tick of becoming due
//! - Exactly-once promotion with racing schedulers
//! - Optimistic transaction abort on concurrent modification
//! - Failed ticks retried without stopping the loop

use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tasker_core::clock::ManualClock;
use tasker_core::config::{TaskerConfig, TaskerOptions};
use tasker_core::error::{ErrorCode, Result, TaskerError};
use tasker_core::orchestrator::{Scheduler, TaskerContext};
use tasker_core::store::{InMemoryQueueStore, QueueStore, Transaction, WatchGuard};
use tasker_core::tasks::{Task, TaskRegistry};
use tokio_util::sync::CancellationToken;

fn context(store: &InMemoryQueueStore, clock: &ManualClock) -> TaskerContext {
    let config = TaskerConfig::configure(
        TaskerOptions::default()
            .workers([("default", 1), ("low", 1)])
            .tick(Duration::from_millis(10)),
    );
    TaskerContext::new(config, Arc::new(store.clone()), TaskRegistry::new())
        .with_clock(Arc::new(clock.clone()))
}

/// Fails the first `failures` range reads, then delegates.
struct FlakyRange {
    inner: InMemoryQueueStore,
    failures: usize,
    calls: Arc<AtomicUsize>,
}

#[async_trait]
impl QueueStore for FlakyRange {
    async fn push(&self, key: &str, value: &str) -> Result<()> {
        self.inner.push(key, value).await
    }

    async fn blocking_pop(&self, key: &str, timeout: Duration) -> Result<Option<String>> {
        self.inner.blocking_pop(key, timeout).await
    }

    async fn sorted_insert(&self, key: &str, score: f64, member: &str) -> Result<bool> {
        self.inner.sorted_insert(key, score, member).await
    }

    async fn sorted_range_by_max_score(&self, key: &str, max: f64) -> Result<Vec<String>> {
        if self.calls.fetch_add(1, Ordering::SeqCst) < self.failures {
            return Err(TaskerError::new(ErrorCode::StoreTimeout, "range read timed out"));
        }
        self.inner.sorted_range_by_max_score(key, max).await
    }

    async fn sorted_remove(&self, key: &str, member: &str) -> Result<bool> {
        self.inner.sorted_remove(key, member).await
    }

    async fn watch(&self, key: &str) -> Result<Box<dyn WatchGuard>> {
        self.inner.watch(key).await
    }

    async fn ping(&self) -> Result<()> {
        self.inner.ping().await
    }

    async fn list_len(&self, key: &str) -> Result<usize> {
        self.inner.list_len(key).await
    }

    async fn sorted_len(&self, key: &str) -> Result<usize> {
        self.inner.sorted_len(key).await
    }

    fn name(&self) -> &'static str {
        "flaky-range"
    }
}

// ============================================================================
// Delay Tests
// ============================================================================

#[tokio::test]
async fn test_delayed_task_not_promoted_early() {
    let store = InMemoryQueueStore::new();
    let clock = ManualClock::new(1_000.0);
    let ctx = context(&store, &clock);
    let scheduler = Scheduler::new(ctx.clone());

    let task = Task::new("echo").with_execution_delay(Duration::from_secs(5));
    ctx.queue().enqueue(&task).await.unwrap();

    for step in 1..50 {
        clock.set(1_000.0 + f64::from(step) * 0.1);
        let report = scheduler.tick().await.unwrap();
        assert_eq!(report.promoted, 0);
        assert_eq!(store.list_len("tasker:default").await.unwrap(), 0);
    }

    // Sub-second scores keep it pending until the full delay has passed
    clock.set(1_004.999);
    assert_eq!(scheduler.tick().await.unwrap().promoted, 0);

    clock.set(1_005.0);
    let report = scheduler.tick().await.unwrap();
    assert_eq!(report.promoted, 1);
    assert_eq!(
        store.list_snapshot("tasker:default"),
        vec![task.encode().unwrap()]
    );
    assert_eq!(store.sorted_len("tasker:scheduled").await.unwrap(), 0);
}

#[tokio::test]
async fn test_running_scheduler_promotes_within_a_tick() {
    let store = InMemoryQueueStore::new();
    let clock = ManualClock::new(1_000.0);
    let ctx = context(&store, &clock);

    ctx.queue()
        .enqueue(&Task::new("echo").with_execution_delay(Duration::from_secs(5)))
        .await
        .unwrap();

    let shutdown = CancellationToken::new();
    let handle = tokio::spawn(Scheduler::new(ctx).run(shutdown.clone()));

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(store.list_len("tasker:default").await.unwrap(), 0);

    clock.advance(Duration::from_secs(5));
    // Tick is 10ms; allow generous slack
    let mut promoted = false;
    for _ in 0..50 {
        if store.list_len("tasker:default").await.unwrap() == 1 {
            promoted = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(promoted);

    shutdown.cancel();
    handle.await.unwrap();
}

#[tokio::test]
async fn test_promotes_to_target_queue() {
    let store = InMemoryQueueStore::new();
    let clock = ManualClock::default();
    let ctx = context(&store, &clock);

    let low = Task::new("echo").on_queue("low").with_argument("n", 1);
    ctx.queue().enqueue(&low).await.unwrap();

    Scheduler::new(ctx).tick().await.unwrap();

    assert_eq!(store.list_snapshot("tasker:low"), vec![low.encode().unwrap()]);
    assert_eq!(store.list_len("tasker:default").await.unwrap(), 0);
}

// ============================================================================
// Exactly-Once Tests
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_racing_schedulers_promote_exactly_once() {
    let store = InMemoryQueueStore::new();
    let clock = ManualClock::default();
    let ctx = context(&store, &clock);

    let total = 200;
    for n in 0..total {
        ctx.queue()
            .enqueue(&Task::new("echo").with_argument("n", n))
            .await
            .unwrap();
    }

    let mut handles = Vec::new();
    for _ in 0..4 {
        let scheduler = Scheduler::new(ctx.clone());
        let store = store.clone();
        handles.push(tokio::spawn(async move {
            let mut promoted = 0;
            while store.sorted_len("tasker:scheduled").await.unwrap() > 0 {
                promoted += scheduler.tick().await.unwrap().promoted;
                tokio::task::yield_now().await;
            }
            promoted
        }));
    }

    let mut promoted = 0;
    for handle in handles {
        promoted += handle.await.unwrap();
    }

    let ready = store.list_snapshot("tasker:default");
    let unique: HashSet<_> = ready.iter().collect();
    assert_eq!(promoted, total as usize);
    assert_eq!(ready.len(), total as usize);
    assert_eq!(unique.len(), total as usize);
}

#[tokio::test]
async fn test_stale_watch_aborts_and_entry_survives() {
    let store = InMemoryQueueStore::new();
    let clock = ManualClock::default();
    let ctx = context(&store, &clock);

    let task = Task::new("echo");
    ctx.queue().enqueue(&task).await.unwrap();
    let member = store.sorted_snapshot("tasker:scheduled")[0].0.clone();

    // A slow scheduler watches, then a fast one promotes first
    let mut slow = store.watch("tasker:scheduled").await.unwrap();
    assert!(slow.sorted_contains("tasker:scheduled", &member).await.unwrap());

    let fast = Scheduler::new(ctx.clone()).tick().await.unwrap();
    assert_eq!(fast.promoted, 1);

    let committed = slow
        .commit(
            Transaction::new()
                .push("tasker:default", task.encode().unwrap())
                .sorted_remove("tasker:scheduled", &member),
        )
        .await
        .unwrap();

    assert!(!committed);
    assert_eq!(store.list_len("tasker:default").await.unwrap(), 1);

    // The next tick finds nothing left to promote
    let report = Scheduler::new(ctx).tick().await.unwrap();
    assert!(report.is_idle());
}

#[tokio::test]
async fn test_aborted_commit_leaves_entry_for_next_tick() {
    let store = InMemoryQueueStore::new();
    let clock = ManualClock::default();
    let ctx = context(&store, &clock);

    let first = Task::new("echo").with_argument("n", 1);
    ctx.queue().enqueue(&first).await.unwrap();
    let member = store.sorted_snapshot("tasker:scheduled")[0].0.clone();

    let mut watch = store.watch("tasker:scheduled").await.unwrap();
    assert!(watch.sorted_contains("tasker:scheduled", &member).await.unwrap());

    // Any write to the delayed container invalidates the watch
    ctx.queue()
        .enqueue(&Task::new("echo").with_argument("n", 2))
        .await
        .unwrap();

    let committed = watch
        .commit(
            Transaction::new()
                .push("tasker:default", first.encode().unwrap())
                .sorted_remove("tasker:scheduled", &member),
        )
        .await
        .unwrap();
    assert!(!committed);
    assert_eq!(store.list_len("tasker:default").await.unwrap(), 0);
    assert_eq!(store.sorted_len("tasker:scheduled").await.unwrap(), 2);

    let report = Scheduler::new(ctx).tick().await.unwrap();
    assert_eq!(report.promoted, 2);
    assert_eq!(store.list_len("tasker:default").await.unwrap(), 2);
}

// ============================================================================
// Failure Recovery Tests
// ============================================================================

#[tokio::test]
async fn test_run_survives_failed_ticks() {
    let store = InMemoryQueueStore::new();
    let clock = ManualClock::default();
    let calls = Arc::new(AtomicUsize::new(0));
    let flaky = FlakyRange {
        inner: store.clone(),
        failures: 3,
        calls: calls.clone(),
    };

    let config = TaskerConfig::configure(
        TaskerOptions::default()
            .workers([("default", 1)])
            .tick(Duration::from_millis(10)),
    );
    let ctx = TaskerContext::new(config, Arc::new(flaky), TaskRegistry::new())
        .with_clock(Arc::new(clock.clone()));

    let task = Task::new("echo");
    ctx.queue().enqueue(&task).await.unwrap();

    let scheduler = Scheduler::new(ctx.clone());
    assert!(scheduler.tick().await.is_err());

    let shutdown = CancellationToken::new();
    let handle = tokio::spawn(Scheduler::new(ctx).run(shutdown.clone()));

    let mut promoted = false;
    for _ in 0..100 {
        if store.list_len("tasker:default").await.unwrap() == 1 {
            promoted = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    assert!(promoted);
    assert!(calls.load(Ordering::SeqCst) > 3);
    assert!(!handle.is_finished());
    assert_eq!(store.list_snapshot("tasker:default"), vec![task.encode().unwrap()]);
    assert_eq!(store.sorted_len("tasker:scheduled").await.unwrap(), 0);

    shutdown.cancel();
    handle.await.unwrap();
}
