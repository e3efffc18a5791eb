//! Dispatcher, scheduler and worker pool.
//!
//! ```text
//!                      ┌──────────────┐
//!   SIGTERM / Ctrl-C ─▶│  Dispatcher  │── tick: reap, top up
//!                      └──────┬───────┘
//!                ┌────────────┴────────────┐
//!                ▼                         ▼
//!        ┌──────────────┐          ┌──────────────┐
//!        │  Scheduler   │          │  WorkerPool  │── one Worker per task
//!        └──────┬───────┘          └──────┬───────┘
//!               │ promote (WATCH/MULTI)   │ BLPOP
//!               ▼                         ▼
//!    <ns>:scheduled ───────────────▶ <ns>:<queue>
//! ```
//!
//! Components share nothing but the [`TaskerContext`] (read-only) and the
//! store.

pub mod context;
pub mod dispatcher;
pub mod scheduler;
pub mod worker;
pub mod worker_pool;

pub use context::TaskerContext;
pub use dispatcher::{Dispatcher, DispatcherReport, StopHandle};
pub use scheduler::{PromotionReport, Scheduler};
pub use worker::{Worker, WorkerOutcome};
pub use worker_pool::{WorkerPool, WorkerPoolStats};
