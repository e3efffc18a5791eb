#![allow(clippy::result_large_err)]
//! # Tasker Core
//!
//! Redis-backed background task dispatcher with delayed scheduling and retry
//! backoff.
//!
//! ## Architecture
//!
//! - **Store**: Minimal list / sorted-set / optimistic-transaction contract, with Redis and in-memory backends
//! - **Tasks**: Serializable task descriptors, handler trait, registry, hooks and the producer API
//! - **Scheduler**: Promotes due delayed tasks exactly once, even with redundant schedulers
//! - **Worker Pool**: One supervised worker per task, per-queue concurrency limits
//! - **Dispatcher**: Supervisor loop with signal-driven graceful stop
//! - **Observability**: Structured logging and Prometheus metrics

pub mod clock;
pub mod config;
pub mod error;
pub mod observability;
pub mod orchestrator;
pub mod store;
pub mod tasks;

pub use error::{ErrorCode, ErrorSeverity, Result, TaskerError};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::clock::{Clock, ManualClock, SystemClock};
    pub use crate::config::{TaskerConfig, TaskerOptions};
    pub use crate::error::{ErrorCode, ErrorSeverity, Result, TaskerError};
    pub use crate::orchestrator::{
        Dispatcher, DispatcherReport, PromotionReport, Scheduler, StopHandle, TaskerContext,
        Worker, WorkerOutcome, WorkerPool, WorkerPoolStats,
    };
    pub use crate::store::{InMemoryQueueStore, QueueStore, RedisQueueStore, StoreKeys};
    pub use crate::tasks::{
        Arguments, HookPoint, Hooks, Task, TaskContext, TaskError, TaskErrorKind, TaskHandler,
        TaskQueue, TaskRegistry, TaskResult,
    };
}
