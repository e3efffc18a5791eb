//! Error handling for Tasker Core.
//!
//! This module provides:
//! - A single engine error type with machine-readable codes and error chaining
//! - User-friendly messages vs detailed internal messages
//! - Severity classification driving log levels
//! - Metrics integration for error tracking
//!
//! Errors raised by task `perform` bodies are a separate concern and live in
//! [`crate::tasks::TaskError`]; this type covers the engine itself (store
//! access, encoding, worker spawning, configuration).
//!
//! # Usage
//!
//! ```rust,ignore
//! use tasker_core::error::{TaskerError, Result, ErrorCode};
//!
//! fn load() -> Result<()> {
//!     Err(TaskerError::new(ErrorCode::InvalidConfiguration, "namespace must not be empty"))
//! }
//! ```

use metrics::counter;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::collections::HashMap;
use std::fmt;
use thiserror::Error;
use tracing::{error, warn};

// ═══════════════════════════════════════════════════════════════════════════════
// Result Type Alias
// ═══════════════════════════════════════════════════════════════════════════════

/// A specialized Result type for Tasker operations.
pub type Result<T> = std::result::Result<T, TaskerError>;

// ═══════════════════════════════════════════════════════════════════════════════
// Error Codes
// ═══════════════════════════════════════════════════════════════════════════════

/// Machine-readable error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // Store Errors (1000-1099)
    StoreConnectionFailed,
    StoreError,
    StoreTimeout,

    // Worker Errors (1100-1199)
    SpawnFailed,
    WorkerCrashed,

    // Task Errors (1200-1299)
    TaskNotRegistered,
    TaskRequeueFailed,

    // Serialization Errors (2200-2299)
    SerializationError,
    DeserializationError,

    // Configuration Errors (5000-5099)
    ConfigurationError,
    MissingConfiguration,
    InvalidConfiguration,

    // Internal Errors (9000-9099)
    InternalError,
    UnknownError,
}

impl ErrorCode {
    /// Get the numeric code for this error.
    pub const fn numeric_code(&self) -> u32 {
        match self {
            Self::StoreConnectionFailed => 1000,
            Self::StoreError => 1001,
            Self::StoreTimeout => 1002,

            Self::SpawnFailed => 1100,
            Self::WorkerCrashed => 1101,

            Self::TaskNotRegistered => 1200,
            Self::TaskRequeueFailed => 1201,

            Self::SerializationError => 2200,
            Self::DeserializationError => 2201,

            Self::ConfigurationError => 5000,
            Self::MissingConfiguration => 5001,
            Self::InvalidConfiguration => 5002,

            Self::InternalError => 9000,
            Self::UnknownError => 9099,
        }
    }

    /// Check if this error is transient (worth retrying on the next tick).
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::StoreConnectionFailed | Self::StoreError | Self::StoreTimeout
        )
    }

    /// Get the error category for grouping.
    pub const fn category(&self) -> &'static str {
        match self.numeric_code() {
            1000..=1099 => "store",
            1100..=1199 => "worker",
            1200..=1299 => "task",
            2200..=2299 => "serialization",
            5000..=5099 => "configuration",
            9000..=9099 => "internal",
            _ => "unknown",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Error Severity
// ═══════════════════════════════════════════════════════════════════════════════

/// Severity level for errors (affects logging).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorSeverity {
    /// Bad input from a producer or operator
    Low,
    /// Operational issues (transient store hiccups)
    Medium,
    /// Data loss or broken payloads
    High,
    /// The engine cannot make progress
    Critical,
}

impl ErrorSeverity {
    /// Get severity based on error code.
    pub const fn from_code(code: &ErrorCode) -> Self {
        match code {
            ErrorCode::ConfigurationError
            | ErrorCode::MissingConfiguration
            | ErrorCode::InvalidConfiguration => Self::Low,

            ErrorCode::StoreError | ErrorCode::StoreTimeout | ErrorCode::SpawnFailed => {
                Self::Medium
            }

            ErrorCode::WorkerCrashed
            | ErrorCode::TaskNotRegistered
            | ErrorCode::TaskRequeueFailed
            | ErrorCode::SerializationError
            | ErrorCode::DeserializationError => Self::High,

            ErrorCode::StoreConnectionFailed
            | ErrorCode::InternalError
            | ErrorCode::UnknownError => Self::Critical,
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Main Error Type
// ═══════════════════════════════════════════════════════════════════════════════

/// The main error type for Tasker Core.
#[derive(Error, Debug)]
pub struct TaskerError {
    /// Machine-readable error code
    code: ErrorCode,

    /// Operator-facing message
    user_message: Cow<'static, str>,

    /// Detailed internal message (for logging only)
    internal_message: Option<String>,

    /// Additional structured context
    context: HashMap<String, serde_json::Value>,

    /// The source error that caused this error
    #[source]
    source: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
}

impl fmt::Display for TaskerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.user_message)?;
        if let Some(ref internal) = self.internal_message {
            write!(f, " (internal: {})", internal)?;
        }
        Ok(())
    }
}

impl TaskerError {
    // ─────────────────────────────────────────────────────────────────────────
    // Constructors
    // ─────────────────────────────────────────────────────────────────────────

    /// Create a new error with code and user message.
    pub fn new(code: ErrorCode, user_message: impl Into<Cow<'static, str>>) -> Self {
        let error = Self {
            code,
            user_message: user_message.into(),
            internal_message: None,
            context: HashMap::new(),
            source: None,
        };
        error.record_metrics();
        error
    }

    /// Create an error with both user and internal messages.
    pub fn with_internal(
        code: ErrorCode,
        user_message: impl Into<Cow<'static, str>>,
        internal_message: impl Into<String>,
    ) -> Self {
        let mut error = Self::new(code, user_message);
        error.internal_message = Some(internal_message.into());
        error
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::with_internal(ErrorCode::InternalError, "An internal error occurred", message)
    }

    /// The backing store could not be reached.
    pub fn connection_failed(address: impl Into<String>, reason: impl Into<String>) -> Self {
        let address = address.into();
        Self::with_internal(
            ErrorCode::StoreConnectionFailed,
            format!("Unable to connect to store at {}", address),
            reason,
        )
        .with_context("address", address)
    }

    /// A worker could not be started.
    pub fn spawn_failed(queue: impl Into<String>, reason: impl Into<String>) -> Self {
        let queue = queue.into();
        Self::with_internal(
            ErrorCode::SpawnFailed,
            format!("Failed to spawn worker for queue '{}'", queue),
            reason,
        )
        .with_context("queue", queue)
    }

    /// A payload names a task type nobody registered.
    pub fn task_not_registered(task_type: impl Into<String>) -> Self {
        let task_type = task_type.into();
        Self::new(
            ErrorCode::TaskNotRegistered,
            format!("No handler registered for task type '{}'", task_type),
        )
        .with_context("task_type", task_type)
    }

    /// A payload could not be decoded.
    pub fn deserialization(reason: impl Into<String>) -> Self {
        Self::with_internal(
            ErrorCode::DeserializationError,
            "Unable to decode task payload",
            reason,
        )
    }

    /// Create a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidConfiguration, message.into())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Builder Methods
    // ─────────────────────────────────────────────────────────────────────────

    /// Add a source error.
    pub fn with_source<E>(mut self, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        self.source = Some(Box::new(source));
        self
    }

    /// Add context.
    pub fn with_context(mut self, key: impl Into<String>, value: impl Serialize) -> Self {
        if let Ok(v) = serde_json::to_value(value) {
            self.context.insert(key.into(), v);
        }
        self
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Accessors
    // ─────────────────────────────────────────────────────────────────────────

    /// Get the error code.
    pub fn code(&self) -> ErrorCode {
        self.code
    }

    /// Get the operator-facing message.
    pub fn user_message(&self) -> &str {
        &self.user_message
    }

    /// Get the internal message (if any).
    pub fn internal_message(&self) -> Option<&str> {
        self.internal_message.as_deref()
    }

    /// Get the structured context.
    pub fn context(&self) -> &HashMap<String, serde_json::Value> {
        &self.context
    }

    /// Check if this error is transient.
    pub fn is_retryable(&self) -> bool {
        self.code.is_retryable()
    }

    /// Get the error severity.
    pub fn severity(&self) -> ErrorSeverity {
        ErrorSeverity::from_code(&self.code)
    }

    /// Process exit code for a binary that stops on this error.
    pub fn exit_code(&self) -> i32 {
        1
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Logging
    // ─────────────────────────────────────────────────────────────────────────

    /// Log this error with appropriate severity.
    pub fn log(&self) {
        let code = self.code.to_string();
        let category = self.code.category();

        match self.severity() {
            ErrorSeverity::Critical | ErrorSeverity::High => {
                error!(
                    error_code = %code,
                    category = category,
                    internal = ?self.internal_message,
                    context = ?self.context,
                    "{}",
                    self.user_message
                );
            }
            ErrorSeverity::Medium | ErrorSeverity::Low => {
                warn!(
                    error_code = %code,
                    category = category,
                    internal = ?self.internal_message,
                    "{}",
                    self.user_message
                );
            }
        }
    }

    fn record_metrics(&self) {
        counter!(
            "tasker_errors_total",
            "code" => self.code.to_string(),
            "category" => self.code.category()
        )
        .increment(1);
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// From Implementations for Common Error Types
// ═══════════════════════════════════════════════════════════════════════════════

impl From<redis::RedisError> for TaskerError {
    fn from(error: redis::RedisError) -> Self {
        let (code, user_msg) = if error.is_connection_refusal() || error.is_connection_dropped() {
            (ErrorCode::StoreConnectionFailed, "Unable to connect to store")
        } else if error.is_timeout() {
            (ErrorCode::StoreTimeout, "Store operation timed out")
        } else {
            (ErrorCode::StoreError, "A store error occurred")
        };

        Self::with_internal(code, user_msg, error.to_string()).with_source(error)
    }
}

impl From<serde_json::Error> for TaskerError {
    fn from(error: serde_json::Error) -> Self {
        let code = if error.is_syntax() || error.is_data() || error.is_eof() {
            ErrorCode::DeserializationError
        } else {
            ErrorCode::SerializationError
        };

        Self::with_internal(code, "Failed to process JSON data", error.to_string())
            .with_source(error)
    }
}

impl From<base64::DecodeError> for TaskerError {
    fn from(error: base64::DecodeError) -> Self {
        Self::deserialization(error.to_string()).with_source(error)
    }
}

impl From<config::ConfigError> for TaskerError {
    fn from(error: config::ConfigError) -> Self {
        let (code, user_msg) = match &error {
            config::ConfigError::NotFound(_) => (
                ErrorCode::MissingConfiguration,
                "Required configuration not found",
            ),
            config::ConfigError::PathParse(_) | config::ConfigError::FileParse { .. } => (
                ErrorCode::InvalidConfiguration,
                "Configuration file is invalid",
            ),
            _ => (ErrorCode::ConfigurationError, "Configuration error occurred"),
        };

        Self::with_internal(code, user_msg, error.to_string())
    }
}

impl From<anyhow::Error> for TaskerError {
    fn from(error: anyhow::Error) -> Self {
        match error.downcast::<TaskerError>() {
            Ok(tasker_error) => tasker_error,
            Err(error) => Self::with_internal(
                ErrorCode::InternalError,
                "An internal error occurred",
                error.to_string(),
            ),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════════
