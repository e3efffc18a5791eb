//! Task definitions and traits.
//!
//! This module provides the core abstractions for defining background tasks:
//!
//! - **Task**: Serializable descriptor (type, queue, arguments, retry policy)
//! - **TaskHandler trait**: The interface every concrete task type implements
//! - **TaskContext**: Context passed to handlers during execution
//! - **TaskError**: Outcome classification (retryable, terminal, not implemented)

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use crate::error::{Result, TaskerError};

/// Task arguments. Keys are kept sorted so the JSON encoding is canonical.
pub type Arguments = BTreeMap<String, serde_json::Value>;

/// Queue used when a task does not name one.
pub const DEFAULT_QUEUE: &str = "default";

// ═══════════════════════════════════════════════════════════════════════════════
// Task Error
// ═══════════════════════════════════════════════════════════════════════════════

/// How the worker should treat a failed `perform`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskErrorKind {
    /// Retried per the task's retry strategy
    Retryable,
    /// The task asked not to be retried
    Terminal,
    /// The handler has no executable logic
    NotImplemented,
}

/// Error type for task execution failures.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskError {
    /// Error message
    pub message: String,
    /// Retry classification
    pub kind: TaskErrorKind,
    /// Optional error code
    pub code: Option<String>,
    /// Additional context
    pub context: Option<serde_json::Value>,
}

impl TaskError {
    /// Create a new retryable error.
    pub fn retryable(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            kind: TaskErrorKind::Retryable,
            code: None,
            context: None,
        }
    }

    /// Create an error that must not be retried.
    pub fn terminal(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            kind: TaskErrorKind::Terminal,
            code: None,
            context: None,
        }
    }

    /// Raised by handlers that do not override `perform`.
    pub fn not_implemented(task_type: &str) -> Self {
        Self {
            message: format!("task '{}' does not implement perform()", task_type),
            kind: TaskErrorKind::NotImplemented,
            code: None,
            context: None,
        }
    }

    /// Add an error code.
    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    /// Add context.
    pub fn with_context(mut self, context: impl Serialize) -> Self {
        self.context = serde_json::to_value(context).ok();
        self
    }

    /// Whether the retry strategy applies.
    pub fn is_retryable(&self) -> bool {
        self.kind == TaskErrorKind::Retryable
    }
}

impl fmt::Display for TaskError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)?;
        if let Some(code) = &self.code {
            write!(f, " (code: {})", code)?;
        }
        Ok(())
    }
}

impl std::error::Error for TaskError {}

impl From<TaskerError> for TaskError {
    fn from(error: TaskerError) -> Self {
        Self::retryable(error.user_message().to_string()).with_code(error.code().to_string())
    }
}

impl From<anyhow::Error> for TaskError {
    fn from(error: anyhow::Error) -> Self {
        Self::retryable(format!("{:#}", error))
    }
}

/// Result type for task execution.
pub type TaskResult = std::result::Result<(), TaskError>;

// ═══════════════════════════════════════════════════════════════════════════════
// Task
// ═══════════════════════════════════════════════════════════════════════════════

/// A unit of asynchronous work.
///
/// Tasks are not persisted once they complete or fail; the store holds one
/// only while it is delayed or ready.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    /// Name of the registered handler
    pub task_type: String,
    /// Target queue
    pub queue: String,
    /// Opaque arguments handed to `perform`
    #[serde(default)]
    pub arguments: Arguments,
    /// Retries already consumed
    #[serde(default)]
    pub retry_count: u32,
    /// Delay before each successive retry; empty means no retries
    #[serde(default)]
    pub retry_strategy: Vec<Duration>,
    /// Defer before first eligibility
    #[serde(default)]
    pub execution_delay: Duration,
}

impl Task {
    /// Create a task on the default queue with no retries.
    pub fn new(task_type: impl Into<String>) -> Self {
        Self {
            task_type: task_type.into(),
            queue: DEFAULT_QUEUE.to_string(),
            arguments: Arguments::new(),
            retry_count: 0,
            retry_strategy: Vec::new(),
            execution_delay: Duration::ZERO,
        }
    }

    pub fn on_queue(mut self, queue: impl Into<String>) -> Self {
        self.queue = queue.into();
        self
    }

    pub fn with_argument(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.arguments.insert(key.into(), value.into());
        self
    }

    pub fn with_arguments(mut self, arguments: Arguments) -> Self {
        self.arguments = arguments;
        self
    }

    pub fn with_retry_strategy(mut self, strategy: impl IntoIterator<Item = Duration>) -> Self {
        self.retry_strategy = strategy.into_iter().collect();
        self
    }

    pub fn with_execution_delay(mut self, delay: Duration) -> Self {
        self.execution_delay = delay;
        self
    }

    /// Deterministic identity used for log correlation.
    ///
    /// `<namespace>:<queue>:<task_type>:<sha256 of canonical arguments>`.
    /// Not used for uniqueness enforcement.
    pub fn fingerprint(&self, namespace: &str) -> String {
        // BTreeMap serialization is key-sorted, and Value maps are too
        let canonical = serde_json::to_vec(&self.arguments).unwrap_or_default();
        let digest = Sha256::digest(&canonical);
        format!(
            "{}:{}:{}:{}",
            namespace,
            self.queue,
            self.task_type,
            hex::encode(digest)
        )
    }

    /// Delay applied when this task is (re-)enqueued.
    ///
    /// A first schedule uses `execution_delay`; a retry uses the strategy
    /// entry for the attempt, so the first retry reads index 0.
    pub fn delay(&self) -> Duration {
        match self.retry_count {
            0 => self.execution_delay,
            n => self
                .retry_strategy
                .get(n as usize - 1)
                .copied()
                .unwrap_or(Duration::ZERO),
        }
    }

    /// Score of this task in the delayed container, given the current time.
    pub fn ready_at(&self, now: f64) -> f64 {
        now + self.delay().as_secs_f64()
    }

    /// Whether another retry is allowed.
    pub fn can_retry(&self) -> bool {
        (self.retry_count as usize) < self.retry_strategy.len()
    }

    /// The task to re-enqueue after a retryable failure, or `None` once the
    /// strategy is exhausted.
    pub fn next_attempt(&self) -> Option<Task> {
        if !self.can_retry() {
            return None;
        }
        let mut next = self.clone();
        next.retry_count += 1;
        Some(next)
    }

    /// Text-safe payload stored in the ready list.
    pub fn encode(&self) -> Result<String> {
        let json = serde_json::to_vec(self)?;
        Ok(BASE64.encode(json))
    }

    /// Inverse of [`Task::encode`].
    pub fn decode(payload: &str) -> Result<Self> {
        let json = BASE64.decode(payload.trim())?;
        serde_json::from_slice(&json)
            .map_err(|e| TaskerError::deserialization(e.to_string()).with_source(e))
    }

    /// Member stored in the delayed container.
    pub fn envelope(&self) -> Result<DelayedEntry> {
        Ok(DelayedEntry {
            queue: self.queue.clone(),
            data: self.encode()?,
        })
    }
}

/// Delayed container member: the target queue plus the encoded task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DelayedEntry {
    pub queue: String,
    pub data: String,
}

impl DelayedEntry {
    pub fn to_member(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_member(member: &str) -> Result<Self> {
        serde_json::from_str(member)
            .map_err(|e| TaskerError::deserialization(e.to_string()).with_source(e))
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Task Context
// ═══════════════════════════════════════════════════════════════════════════════

/// Context passed to a handler during execution.
#[derive(Debug, Clone)]
pub struct TaskContext {
    task: Task,
    fingerprint: String,
}

impl TaskContext {
    pub fn new(task: Task, namespace: &str) -> Self {
        let fingerprint = task.fingerprint(namespace);
        Self { task, fingerprint }
    }

    pub fn task(&self) -> &Task {
        &self.task
    }

    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    pub fn arguments(&self) -> &Arguments {
        &self.task.arguments
    }

    /// Typed argument lookup.
    ///
    /// A missing or mistyped argument is a terminal error: retrying the same
    /// arguments cannot succeed.
    pub fn argument<T: DeserializeOwned>(&self, key: &str) -> std::result::Result<T, TaskError> {
        let value = self
            .task
            .arguments
            .get(key)
            .ok_or_else(|| TaskError::terminal(format!("missing argument '{}'", key)))?;
        serde_json::from_value(value.clone())
            .map_err(|e| TaskError::terminal(format!("invalid argument '{}': {}", key, e)))
    }

    /// Attempt number, starting at 1.
    pub fn attempt(&self) -> u32 {
        self.task.retry_count + 1
    }

    pub fn log_info(&self, message: &str) {
        tracing::info!(
            task_type = %self.task.task_type,
            fingerprint = %self.fingerprint,
            attempt = self.attempt(),
            "{}",
            message
        );
    }

    pub fn log_warn(&self, message: &str) {
        tracing::warn!(
            task_type = %self.task.task_type,
            fingerprint = %self.fingerprint,
            attempt = self.attempt(),
            "{}",
            message
        );
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Task Handler
// ═══════════════════════════════════════════════════════════════════════════════

/// A concrete task type.
///
/// # Example
///
/// ```ignore
/// use tasker_core::tasks::{TaskContext, TaskHandler, TaskResult};
///
/// struct SendEmail;
///
/// #[async_trait::async_trait]
/// impl TaskHandler for SendEmail {
///     fn name(&self) -> &'static str { "send_email" }
///
///     async fn perform(&self, ctx: &TaskContext) -> TaskResult {
///         let to: String = ctx.argument("to")?;
///         // ... send the email
///         Ok(())
///     }
/// }
/// ```
#[async_trait]
pub trait TaskHandler: Send + Sync + 'static {
    /// Registered type name, stored in every encoded task.
    fn name(&self) -> &'static str;

    /// Queue new tasks of this type land on.
    fn queue(&self) -> &str {
        DEFAULT_QUEUE
    }

    /// Delays between retries.
    fn retry_strategy(&self) -> Vec<Duration> {
        Vec::new()
    }

    /// Defer before first eligibility.
    fn execution_delay(&self) -> Duration {
        Duration::ZERO
    }

    /// Execute the task.
    async fn perform(&self, ctx: &TaskContext) -> TaskResult {
        Err(TaskError::not_implemented(&ctx.task().task_type))
    }

    /// Build a task of this type from the handler's defaults.
    fn build(&self, arguments: Arguments) -> Task {
        Task::new(self.name())
            .on_queue(self.queue())
            .with_arguments(arguments)
            .with_retry_strategy(self.retry_strategy())
            .with_execution_delay(self.execution_delay())
    }
}
