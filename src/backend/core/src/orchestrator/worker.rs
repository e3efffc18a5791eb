//! Single-task execution unit.
//!
//! A worker pops exactly one payload from its queue, runs it to a controlled
//! outcome and exits. The outcome carries the exit status the pool logs at
//! reap time. A panic inside `perform` is not caught here: it ends the tokio
//! task and surfaces to the pool as a crash, and the task is lost.

use std::time::Instant;

use metrics::{counter, histogram};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::context::TaskerContext;
use crate::error::{ErrorCode, Result, TaskerError};
use crate::tasks::{HookPoint, Task, TaskContext, TaskError};

/// How a worker ended.
#[derive(Debug, Clone, PartialEq)]
pub enum WorkerOutcome {
    /// `perform` returned normally
    Completed,
    /// Re-enqueued into the delayed container
    Retried { retry_count: u32, ready_at: f64 },
    /// Terminal failure, not retried
    Failed,
    /// The payload could not be run at all; it is dropped
    Fatal(ErrorCode),
    /// Quiescing was observed before any payload arrived
    Stopped,
}

impl WorkerOutcome {
    /// Process-style exit status: 0 for normal or controlled transient
    /// outcomes, 1 for failures.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Completed | Self::Retried { .. } | Self::Stopped => 0,
            Self::Failed | Self::Fatal(_) => 1,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::Retried { .. } => "retried",
            Self::Failed => "failed",
            Self::Fatal(_) => "fatal",
            Self::Stopped => "stopped",
        }
    }
}

/// Executes one task from a queue.
pub struct Worker {
    id: Uuid,
    queue: String,
    ctx: TaskerContext,
    shutdown: CancellationToken,
}

impl Worker {
    pub fn new(ctx: TaskerContext, queue: impl Into<String>, shutdown: CancellationToken) -> Self {
        Self {
            id: Uuid::new_v4(),
            queue: queue.into(),
            ctx,
            shutdown,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn queue(&self) -> &str {
        &self.queue
    }

    /// Receive one payload and process it.
    pub async fn run(self) -> WorkerOutcome {
        debug!(worker_id = %self.id, queue = %self.queue, "Worker started");

        let payload = match self.receive().await {
            Ok(Some(payload)) => payload,
            Ok(None) => return WorkerOutcome::Stopped,
            Err(e) => {
                e.log();
                return WorkerOutcome::Fatal(e.code());
            }
        };

        self.process(&payload).await
    }

    /// Block on the ready list until a payload arrives.
    ///
    /// Quiescing is checked between pop cycles, never during one: an
    /// in-flight pop is not abandoned, since the store may already have
    /// removed the payload. A zero timeout still waits indefinitely for
    /// work, but in slices of one tick so a stop request is observed.
    async fn receive(&self) -> Result<Option<String>> {
        let key = self.ctx.keys().ready(&self.queue);
        let config = self.ctx.config();
        let timeout = if config.read_write_timeout.is_zero() {
            config.tick
        } else {
            config.read_write_timeout
        };

        loop {
            if self.shutdown.is_cancelled() {
                return Ok(None);
            }
            if let Some(payload) = self.ctx.store().blocking_pop(&key, timeout).await? {
                return Ok(Some(payload));
            }
        }
    }

    /// Decode, dispatch and classify one payload.
    pub async fn process(&self, payload: &str) -> WorkerOutcome {
        let task = match Task::decode(payload) {
            Ok(task) => task,
            Err(e) => {
                error!(worker_id = %self.id, queue = %self.queue, error = %e, "Dropping undecodable payload");
                return WorkerOutcome::Fatal(e.code());
            }
        };

        let Some(handler) = self.ctx.registry().get(&task.task_type) else {
            let e = TaskerError::task_not_registered(&task.task_type);
            error!(worker_id = %self.id, queue = %self.queue, error = %e, "Dropping task of unknown type");
            return WorkerOutcome::Fatal(e.code());
        };

        let namespace = self.ctx.keys().namespace().to_string();
        let task_ctx = TaskContext::new(task.clone(), &namespace);
        let fingerprint = task_ctx.fingerprint().to_string();
        let hooks = self.ctx.hooks();

        hooks.run(HookPoint::BeforePerform, &task);

        let started = Instant::now();
        let result = handler.perform(&task_ctx).await;
        histogram!("tasker_task_duration_seconds", "queue" => self.queue.clone())
            .record(started.elapsed().as_secs_f64());

        match result {
            Ok(()) => {
                info!(
                    fingerprint = %fingerprint,
                    attempt = task.retry_count + 1,
                    duration_ms = started.elapsed().as_millis() as u64,
                    "Task completed"
                );
                hooks.run(HookPoint::Completed, &task);
                counter!("tasker_tasks_completed_total", "queue" => self.queue.clone()).increment(1);
                WorkerOutcome::Completed
            }
            Err(err) if err.is_retryable() => self.retry(task, &fingerprint, err).await,
            Err(err) => self.fail(&task, &fingerprint, &err),
        }
    }

    async fn retry(&self, task: Task, fingerprint: &str, err: TaskError) -> WorkerOutcome {
        let Some(next) = task.next_attempt() else {
            warn!(fingerprint = %fingerprint, retry_count = task.retry_count, "Retry limit reached");
            return self.fail(&task, fingerprint, &err);
        };

        let ready_at = next.ready_at(self.ctx.clock().now());
        if let Err(e) = self.ctx.queue().enqueue_at(&next, ready_at).await {
            let e = TaskerError::with_internal(
                ErrorCode::TaskRequeueFailed,
                "Failed to re-enqueue task for retry",
                e.to_string(),
            )
            .with_context("fingerprint", fingerprint)
            .with_source(e);
            e.log();
            return WorkerOutcome::Fatal(e.code());
        }

        warn!(
            fingerprint = %fingerprint,
            retry_count = next.retry_count,
            delay_ms = next.delay().as_millis() as u64,
            error = %err,
            "Task failed, retry scheduled"
        );
        self.ctx.hooks().run(HookPoint::Retried, &next);
        counter!("tasker_tasks_retried_total", "queue" => self.queue.clone()).increment(1);

        WorkerOutcome::Retried {
            retry_count: next.retry_count,
            ready_at,
        }
    }

    fn fail(&self, task: &Task, fingerprint: &str, err: &TaskError) -> WorkerOutcome {
        error!(
            fingerprint = %fingerprint,
            retry_count = task.retry_count,
            kind = ?err.kind,
            error = %err,
            "Task failed"
        );
        self.ctx.hooks().run(HookPoint::Failed, task);
        counter!("tasker_tasks_failed_total", "queue" => self.queue.clone()).increment(1);
        WorkerOutcome::Failed
    }
}
