//! Task model for Tasker.
//!
//! This module provides everything a producer or a worker needs to know about
//! a unit of work:
//!
//! - **Task**: Serializable descriptor with retry strategy and fingerprint
//! - **TaskHandler**: Trait implemented by each concrete task type
//! - **TaskRegistry**: Resolves encoded type names to handlers
//! - **Hooks**: Callbacks at fixed lifecycle points
//! - **TaskQueue**: Producer API (`enqueue`, `schedule_async`)
//!
//! # Lifecycle
//!
//! ```text
//!  enqueue ──▶ Delayed ──(promotion)──▶ Ready ──(pop)──▶ InFlight
//!                 ▲                                         │
//!                 └──────────── Retried ◀───────────────────┤
//!                                                           ├──▶ Completed
//!                                                           └──▶ Failed
//! ```
//!
//! # Usage
//!
//! ```rust,ignore
//! use tasker_core::tasks::{Arguments, TaskContext, TaskHandler, TaskResult};
//!
//! struct Resize;
//!
//! #[async_trait]
//! impl TaskHandler for Resize {
//!     fn name(&self) -> &'static str { "resize" }
//!     fn queue(&self) -> &str { "low" }
//!
//!     async fn perform(&self, ctx: &TaskContext) -> TaskResult {
//!         let path: String = ctx.argument("path")?;
//!         // ...
//!         Ok(())
//!     }
//! }
//!
//! ctx.queue().schedule_async(&Resize, args).await?;
//! ```

pub mod hooks;
pub mod queue;
pub mod registry;
pub mod task;

pub use hooks::{Hook, HookPoint, Hooks};
pub use queue::TaskQueue;
pub use registry::TaskRegistry;
pub use task::{
    Arguments, DelayedEntry, Task, TaskContext, TaskError, TaskErrorKind, TaskHandler,
    TaskResult, DEFAULT_QUEUE,
};

// Built-in tasks
mod builtin;
pub use builtin::{EchoTask, SleepTask};
