//! Backing store contract.
//!
//! The engine only needs a handful of primitives: a FIFO list with an atomic
//! blocking pop, a sorted set scored by time, and an optimistic transaction
//! (watch a key, queue writes, commit only if the key was left untouched).
//! Any store offering these can replace Redis without touching the
//! orchestration code.
//!
//! Key layout:
//!
//! ```text
//! <namespace>:scheduled   sorted set, member = {"queue","data"} envelope, score = ready_at
//! <namespace>:<queue>     list, element = base64 task payload
//! ```

use async_trait::async_trait;
use std::time::Duration;

use crate::config::SCHEDULED_SUFFIX;
use crate::error::Result;

pub mod memory;
pub mod redis;

pub use self::memory::InMemoryQueueStore;
pub use self::redis::RedisQueueStore;

/// A write queued inside a [`Transaction`].
#[derive(Debug, Clone, PartialEq)]
pub enum TxOp {
    /// Append to the tail of a list.
    Push { key: String, value: String },
    /// Remove a member from a sorted set.
    SortedRemove { key: String, member: String },
}

/// Writes applied atomically by [`WatchGuard::commit`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Transaction {
    ops: Vec<TxOp>,
}

impl Transaction {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.ops.push(TxOp::Push {
            key: key.into(),
            value: value.into(),
        });
        self
    }

    pub fn sorted_remove(mut self, key: impl Into<String>, member: impl Into<String>) -> Self {
        self.ops.push(TxOp::SortedRemove {
            key: key.into(),
            member: member.into(),
        });
        self
    }

    pub fn ops(&self) -> &[TxOp] {
        &self.ops
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }
}

/// A key under optimistic watch.
///
/// Dropping the guard without committing releases the watch.
#[async_trait]
pub trait WatchGuard: Send {
    /// Read a sorted-set membership on the watched connection.
    async fn sorted_contains(&mut self, key: &str, member: &str) -> Result<bool>;

    /// Apply the transaction atomically.
    ///
    /// Returns `false` without applying anything if the watched key was
    /// modified since [`QueueStore::watch`].
    async fn commit(self: Box<Self>, tx: Transaction) -> Result<bool>;

    /// Release the watch without writing.
    async fn unwatch(self: Box<Self>) -> Result<()>;
}

/// Primitives the engine requires from its backing store.
#[async_trait]
pub trait QueueStore: Send + Sync {
    /// Append a value to the tail of a list.
    async fn push(&self, key: &str, value: &str) -> Result<()>;

    /// Remove and return the head of a list, waiting up to `timeout`.
    ///
    /// A zero timeout waits indefinitely. `None` means the wait timed out.
    async fn blocking_pop(&self, key: &str, timeout: Duration) -> Result<Option<String>>;

    /// Insert or rescore a sorted-set member. Returns `true` if it was new.
    async fn sorted_insert(&self, key: &str, score: f64, member: &str) -> Result<bool>;

    /// Members with `score <= max`, lowest score first.
    async fn sorted_range_by_max_score(&self, key: &str, max: f64) -> Result<Vec<String>>;

    /// Remove a sorted-set member. Returns `true` if it was present.
    async fn sorted_remove(&self, key: &str, member: &str) -> Result<bool>;

    /// Start watching a key for concurrent modification.
    async fn watch(&self, key: &str) -> Result<Box<dyn WatchGuard>>;

    /// Verify the store is reachable.
    async fn ping(&self) -> Result<()>;

    /// Length of a list.
    async fn list_len(&self, key: &str) -> Result<usize>;

    /// Cardinality of a sorted set.
    async fn sorted_len(&self, key: &str) -> Result<usize>;

    /// Backend name (for logging).
    fn name(&self) -> &'static str;
}

/// Builds store keys for a namespace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreKeys {
    namespace: String,
}

impl StoreKeys {
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Namespace-wide delayed container.
    pub fn scheduled(&self) -> String {
        format!("{}:{}", self.namespace, SCHEDULED_SUFFIX)
    }

    /// Ready list of a queue.
    pub fn ready(&self, queue: &str) -> String {
        format!("{}:{}", self.namespace, queue)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_keys() {
        let keys = StoreKeys::new("tasker");
        assert_eq!(keys.scheduled(), "tasker:scheduled");
        assert_eq!(keys.ready("default"), "tasker:default");
        assert_eq!(keys.namespace(), "tasker");
    }

    #[test]
    fn test_transaction_builder() {
        let tx = Transaction::new()
            .push("tasker:default", "payload")
            .sorted_remove("tasker:scheduled", "member");

        assert_eq!(tx.ops().len(), 2);
        assert_eq!(
            tx.ops()[0],
            TxOp::Push {
                key: "tasker:default".to_string(),
                value: "payload".to_string()
            }
        );
        assert!(Transaction::new().is_empty());
    }
}
