//! In-memory store for tests and single-process embedding.
//!
//! Optimistic transactions are emulated with a per-key version counter: every
//! write bumps the version of the key it touches, and a commit is rejected if
//! the watched key's version moved since the watch was taken.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;

use super::{QueueStore, Transaction, TxOp, WatchGuard};
use crate::error::Result;

#[derive(Debug, Default)]
struct MemoryState {
    lists: HashMap<String, VecDeque<String>>,
    sorted: HashMap<String, HashMap<String, f64>>,
    versions: HashMap<String, u64>,
}

impl MemoryState {
    fn bump(&mut self, key: &str) {
        *self.versions.entry(key.to_string()).or_insert(0) += 1;
    }

    fn version(&self, key: &str) -> u64 {
        self.versions.get(key).copied().unwrap_or(0)
    }

    fn push(&mut self, key: &str, value: &str) {
        self.lists
            .entry(key.to_string())
            .or_default()
            .push_back(value.to_string());
        self.bump(key);
    }

    fn pop_front(&mut self, key: &str) -> Option<String> {
        let value = self.lists.get_mut(key)?.pop_front()?;
        self.bump(key);
        Some(value)
    }

    fn sorted_remove(&mut self, key: &str, member: &str) -> bool {
        let removed = self
            .sorted
            .get_mut(key)
            .map(|set| set.remove(member).is_some())
            .unwrap_or(false);
        if removed {
            self.bump(key);
        }
        removed
    }
}

/// In-memory [`QueueStore`].
///
/// Cloning shares the underlying state.
#[derive(Debug, Clone, Default)]
pub struct InMemoryQueueStore {
    state: Arc<Mutex<MemoryState>>,
    pushed: Arc<Notify>,
}

impl InMemoryQueueStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of a list, head first.
    pub fn list_snapshot(&self, key: &str) -> Vec<String> {
        self.state
            .lock()
            .lists
            .get(key)
            .map(|l| l.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Snapshot of a sorted set as `(member, score)`, lowest score first.
    pub fn sorted_snapshot(&self, key: &str) -> Vec<(String, f64)> {
        let state = self.state.lock();
        let mut entries: Vec<(String, f64)> = state
            .sorted
            .get(key)
            .map(|set| set.iter().map(|(m, s)| (m.clone(), *s)).collect())
            .unwrap_or_default();
        entries.sort_by(|a, b| a.1.total_cmp(&b.1).then_with(|| a.0.cmp(&b.0)));
        entries
    }
}

#[async_trait]
impl QueueStore for InMemoryQueueStore {
    async fn push(&self, key: &str, value: &str) -> Result<()> {
        self.state.lock().push(key, value);
        self.pushed.notify_waiters();
        Ok(())
    }

    async fn blocking_pop(&self, key: &str, timeout: Duration) -> Result<Option<String>> {
        let deadline = (!timeout.is_zero()).then(|| tokio::time::Instant::now() + timeout);

        loop {
            // Register for wakeups before checking so a concurrent push is not missed.
            let notified = self.pushed.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Some(value) = self.state.lock().pop_front(key) {
                return Ok(Some(value));
            }

            match deadline {
                None => notified.await,
                Some(deadline) => {
                    if tokio::time::timeout_at(deadline, notified).await.is_err() {
                        return Ok(None);
                    }
                }
            }
        }
    }

    async fn sorted_insert(&self, key: &str, score: f64, member: &str) -> Result<bool> {
        let mut state = self.state.lock();
        let previous = state
            .sorted
            .entry(key.to_string())
            .or_default()
            .insert(member.to_string(), score);
        state.bump(key);
        Ok(previous.is_none())
    }

    async fn sorted_range_by_max_score(&self, key: &str, max: f64) -> Result<Vec<String>> {
        let state = self.state.lock();
        let mut due: Vec<(&String, f64)> = state
            .sorted
            .get(key)
            .map(|set| set.iter().filter(|(_, s)| **s <= max).map(|(m, s)| (m, *s)).collect())
            .unwrap_or_default();
        due.sort_by(|a, b| a.1.total_cmp(&b.1).then_with(|| a.0.cmp(b.0)));
        Ok(due.into_iter().map(|(m, _)| m.clone()).collect())
    }

    async fn sorted_remove(&self, key: &str, member: &str) -> Result<bool> {
        Ok(self.state.lock().sorted_remove(key, member))
    }

    async fn watch(&self, key: &str) -> Result<Box<dyn WatchGuard>> {
        let version = self.state.lock().version(key);
        Ok(Box::new(MemoryWatch {
            store: self.clone(),
            key: key.to_string(),
            version,
        }))
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }

    async fn list_len(&self, key: &str) -> Result<usize> {
        Ok(self.state.lock().lists.get(key).map(|l| l.len()).unwrap_or(0))
    }

    async fn sorted_len(&self, key: &str) -> Result<usize> {
        Ok(self.state.lock().sorted.get(key).map(|s| s.len()).unwrap_or(0))
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}

struct MemoryWatch {
    store: InMemoryQueueStore,
    key: String,
    version: u64,
}

#[async_trait]
impl WatchGuard for MemoryWatch {
    async fn sorted_contains(&mut self, key: &str, member: &str) -> Result<bool> {
        Ok(self
            .store
            .state
            .lock()
            .sorted
            .get(key)
            .map(|set| set.contains_key(member))
            .unwrap_or(false))
    }

    async fn commit(self: Box<Self>, tx: Transaction) -> Result<bool> {
        let mut pushed = false;
        {
            let mut state = self.store.state.lock();
            if state.version(&self.key) != self.version {
                return Ok(false);
            }
            for op in tx.ops() {
                match op {
                    TxOp::Push { key, value } => {
                        state.push(key, value);
                        pushed = true;
                    }
                    TxOp::SortedRemove { key, member } => {
                        state.sorted_remove(key, member);
                    }
                }
            }
        }
        if pushed {
            self.store.pushed.notify_waiters();
        }
        Ok(true)
    }

    async fn unwatch(self: Box<Self>) -> Result<()> {
        Ok(())
    }
}
