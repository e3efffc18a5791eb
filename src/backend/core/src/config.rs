//! Configuration management.
//!
//! Configuration is resolved once at startup and shared read-only through
//! [`crate::orchestrator::TaskerContext`]. Sources, lowest precedence first:
//! built-in defaults, an optional file, then `TASKER__*` environment variables.

use std::net::SocketAddr;
use std::time::Duration;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::{Result, TaskerError};

/// Main dispatcher configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskerConfig {
    /// Store host
    #[serde(default = "default_host")]
    pub host: String,

    /// Store port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Prefix of every key the engine touches
    #[serde(default = "default_namespace")]
    pub namespace: String,

    /// Enable log output
    #[serde(default = "default_logging")]
    pub logging: bool,

    /// Maximum concurrent workers per queue, in declaration order
    #[serde(default = "default_workers")]
    pub workers: IndexMap<String, usize>,

    /// Reuse store connections between commands
    #[serde(default = "default_persistent")]
    pub persistent: bool,

    /// Blocking pop timeout (zero waits indefinitely, rechecking for stop every tick)
    #[serde(default, with = "humantime_serde")]
    pub read_write_timeout: Duration,

    /// Dispatcher and scheduler poll interval
    #[serde(default = "default_tick", with = "humantime_serde")]
    pub tick: Duration,

    /// Run the delayed-task scheduler in this process
    #[serde(default = "default_scheduler_enabled")]
    pub scheduler_enabled: bool,

    /// Observability configuration
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// Default log filter when `RUST_LOG` is unset
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Emit JSON log lines
    #[serde(default)]
    pub json_logging: bool,

    /// Prometheus scrape listener
    #[serde(default)]
    pub metrics_addr: Option<SocketAddr>,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            json_logging: false,
            metrics_addr: None,
        }
    }
}

impl Default for TaskerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            namespace: default_namespace(),
            logging: default_logging(),
            workers: default_workers(),
            persistent: default_persistent(),
            read_write_timeout: Duration::ZERO,
            tick: default_tick(),
            scheduler_enabled: default_scheduler_enabled(),
            observability: ObservabilityConfig::default(),
        }
    }
}

/// User overrides merged over the defaults by [`TaskerConfig::configure`].
///
/// Every field left `None` keeps its default. A provided `workers` table
/// replaces the default table entirely.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskerOptions {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub namespace: Option<String>,
    pub logging: Option<bool>,
    pub workers: Option<IndexMap<String, usize>>,
    pub persistent: Option<bool>,
    #[serde(default, with = "humantime_serde")]
    pub read_write_timeout: Option<Duration>,
    #[serde(default, with = "humantime_serde")]
    pub tick: Option<Duration>,
    pub scheduler_enabled: Option<bool>,
}

impl TaskerOptions {
    pub fn workers<I, Q>(mut self, workers: I) -> Self
    where
        I: IntoIterator<Item = (Q, usize)>,
        Q: Into<String>,
    {
        self.workers = Some(workers.into_iter().map(|(q, max)| (q.into(), max)).collect());
        self
    }

    pub fn namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    pub fn read_write_timeout(mut self, timeout: Duration) -> Self {
        self.read_write_timeout = Some(timeout);
        self
    }

    pub fn tick(mut self, tick: Duration) -> Self {
        self.tick = Some(tick);
        self
    }

    pub fn logging(mut self, enabled: bool) -> Self {
        self.logging = Some(enabled);
        self
    }

    pub fn scheduler_enabled(mut self, enabled: bool) -> Self {
        self.scheduler_enabled = Some(enabled);
        self
    }
}

// Default value functions
fn default_host() -> String { "127.0.0.1".to_string() }
fn default_port() -> u16 { 6379 }
fn default_namespace() -> String { "tasker".to_string() }
fn default_logging() -> bool { true }
fn default_persistent() -> bool { true }
fn default_tick() -> Duration { Duration::from_secs(1) }
fn default_scheduler_enabled() -> bool { true }
fn default_log_level() -> String { "info".to_string() }

fn default_workers() -> IndexMap<String, usize> {
    IndexMap::from([
        ("high".to_string(), 0),
        ("default".to_string(), 10),
        ("low".to_string(), 0),
    ])
}

/// Name of the delayed container suffix; no queue may reuse it.
pub const SCHEDULED_SUFFIX: &str = "scheduled";

impl TaskerConfig {
    /// Merge user options over the documented defaults.
    pub fn configure(options: TaskerOptions) -> Self {
        let defaults = Self::default();
        Self {
            host: options.host.unwrap_or(defaults.host),
            port: options.port.unwrap_or(defaults.port),
            namespace: options.namespace.unwrap_or(defaults.namespace),
            logging: options.logging.unwrap_or(defaults.logging),
            workers: options.workers.unwrap_or(defaults.workers),
            persistent: options.persistent.unwrap_or(defaults.persistent),
            read_write_timeout: options
                .read_write_timeout
                .unwrap_or(defaults.read_write_timeout),
            tick: options.tick.unwrap_or(defaults.tick),
            scheduler_enabled: options
                .scheduler_enabled
                .unwrap_or(defaults.scheduler_enabled),
            observability: defaults.observability,
        }
    }

    /// Load configuration from the environment.
    pub fn load() -> Result<Self> {
        let config = config::Config::builder()
            .add_source(config::Environment::with_prefix("TASKER").separator("__"))
            .build()?;

        let cfg: TaskerConfig = config.try_deserialize()?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Load from a specific file path, with environment overrides.
    pub fn from_file(path: &str) -> Result<Self> {
        let config = config::Config::builder()
            .add_source(config::File::with_name(path))
            .add_source(config::Environment::with_prefix("TASKER").separator("__"))
            .build()?;

        let cfg: TaskerConfig = config.try_deserialize()?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Reject settings that would corrupt the key layout.
    pub fn validate(&self) -> Result<()> {
        if self.namespace.trim().is_empty() {
            return Err(TaskerError::configuration("namespace must not be empty"));
        }
        if self.workers.contains_key(SCHEDULED_SUFFIX) {
            return Err(TaskerError::configuration(format!(
                "queue name '{}' collides with the delayed container",
                SCHEDULED_SUFFIX
            )));
        }
        if self.workers.keys().any(|q| q.is_empty()) {
            return Err(TaskerError::configuration("queue names must not be empty"));
        }
        if self.tick.is_zero() {
            return Err(TaskerError::configuration("tick must be greater than zero"));
        }
        Ok(())
    }

    /// Connection URL for the Redis store.
    pub fn redis_url(&self) -> String {
        format!("redis://{}:{}/", self.host, self.port)
    }

    /// Configured maximum for a queue (0 when undeclared).
    pub fn max_workers(&self, queue: &str) -> usize {
        self.workers.get(queue).copied().unwrap_or(0)
    }

    /// Total worker capacity across all queues.
    pub fn total_capacity(&self) -> usize {
        self.workers.values().sum()
    }
}
