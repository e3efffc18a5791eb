//! Benchmarks for task encoding and delayed-task promotion
//!
//! Run with: cargo bench

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::sync::Arc;
use std::time::Duration;

use tasker_core::clock::ManualClock;
use tasker_core::config::TaskerConfig;
use tasker_core::orchestrator::{Scheduler, TaskerContext};
use tasker_core::store::InMemoryQueueStore;
use tasker_core::tasks::{Task, TaskRegistry};

fn sample_task(arguments: usize) -> Task {
    let mut task = Task::new("echo").with_retry_strategy(
        [1, 5, 10, 15, 20].into_iter().map(Duration::from_secs),
    );
    for n in 0..arguments {
        task = task.with_argument(format!("arg_{n}"), n);
    }
    task
}

/// Benchmark payload encoding with varying argument counts.
fn bench_encode(c: &mut Criterion) {
    let mut group = c.benchmark_group("task_encode");

    for arguments in [1, 10, 100].iter() {
        let task = sample_task(*arguments);
        group.bench_with_input(BenchmarkId::from_parameter(arguments), &task, |b, task| {
            b.iter(|| black_box(task.encode()));
        });
    }
    group.finish();
}

/// Benchmark payload decoding with varying argument counts.
fn bench_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("task_decode");

    for arguments in [1, 10, 100].iter() {
        let payload = sample_task(*arguments).encode().unwrap_or_default();
        group.bench_with_input(BenchmarkId::from_parameter(arguments), &payload, |b, payload| {
            b.iter(|| black_box(Task::decode(payload)));
        });
    }
    group.finish();
}

fn bench_fingerprint(c: &mut Criterion) {
    let task = sample_task(10);
    c.bench_function("task_fingerprint", |b| {
        b.iter(|| black_box(task.fingerprint(black_box("tasker"))));
    });
}

/// Benchmark a scheduler tick promoting a full batch of due tasks.
fn bench_promotion(c: &mut Criterion) {
    let runtime = match tokio::runtime::Runtime::new() {
        Ok(runtime) => runtime,
        Err(_) => return,
    };
    let mut group = c.benchmark_group("scheduler_tick");

    for batch in [10, 100, 1000].iter() {
        group.throughput(Throughput::Elements(*batch as u64));
        group.bench_with_input(BenchmarkId::from_parameter(batch), batch, |b, &batch| {
            b.to_async(&runtime).iter(|| async move {
                let store = InMemoryQueueStore::new();
                let ctx = TaskerContext::new(
                    TaskerConfig::default(),
                    Arc::new(store),
                    TaskRegistry::new(),
                )
                .with_clock(Arc::new(ManualClock::default()));

                let queue = ctx.queue();
                for n in 0..batch {
                    let _ = queue.enqueue(&Task::new("echo").with_argument("n", n)).await;
                }
                black_box(Scheduler::new(ctx).tick().await)
            });
        });
    }
    group.finish();
}

criterion_group!(
    benches,
    bench_encode,
    bench_decode,
    bench_fingerprint,
    bench_promotion,
);
criterion_main!(benches);
