//! Producer side: putting tasks into the delayed container.

use std::sync::Arc;

use metrics::counter;
use tracing::debug;

use super::task::{Arguments, Task, TaskHandler};
use crate::clock::Clock;
use crate::error::Result;
use crate::store::{QueueStore, StoreKeys};

/// Enqueues tasks for a namespace.
///
/// Every task, immediate or not, goes through the delayed container; the
/// scheduler promotes it once its score is due.
#[derive(Clone)]
pub struct TaskQueue {
    store: Arc<dyn QueueStore>,
    keys: StoreKeys,
    clock: Arc<dyn Clock>,
}

impl TaskQueue {
    pub fn new(store: Arc<dyn QueueStore>, keys: StoreKeys, clock: Arc<dyn Clock>) -> Self {
        Self { store, keys, clock }
    }

    /// Insert the task into the delayed container, scored by its ready time.
    ///
    /// Returns `false` if an identical entry was already pending; it is
    /// rescored instead of duplicated.
    pub async fn enqueue(&self, task: &Task) -> Result<bool> {
        self.enqueue_at(task, task.ready_at(self.clock.now())).await
    }

    /// Insert the task with an explicit score.
    pub async fn enqueue_at(&self, task: &Task, ready_at: f64) -> Result<bool> {
        let member = task.envelope()?.to_member()?;
        let added = self
            .store
            .sorted_insert(&self.keys.scheduled(), ready_at, &member)
            .await?;

        counter!("tasker_tasks_enqueued_total", "queue" => task.queue.clone()).increment(1);
        debug!(
            fingerprint = %task.fingerprint(self.keys.namespace()),
            queue = %task.queue,
            retry_count = task.retry_count,
            ready_at,
            added,
            "Task enqueued"
        );
        Ok(added)
    }

    /// Build a task from the handler's defaults and enqueue it.
    pub async fn schedule_async(&self, handler: &dyn TaskHandler, arguments: Arguments) -> Result<Task> {
        let task = handler.build(arguments);
        self.enqueue(&task).await?;
        Ok(task)
    }

    pub fn keys(&self) -> &StoreKeys {
        &self.keys
    }
}

impl std::fmt::Debug for TaskQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskQueue")
            .field("store", &self.store.name())
            .field("keys", &self.keys)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::store::InMemoryQueueStore;
    use crate::tasks::builtin::SleepTask;
    use crate::tasks::task::DelayedEntry;
    use std::time::Duration;

    fn queue() -> (TaskQueue, InMemoryQueueStore, ManualClock) {
        let store = InMemoryQueueStore::new();
        let clock = ManualClock::new(1_000.0);
        let queue = TaskQueue::new(
            Arc::new(store.clone()),
            StoreKeys::new("tasker"),
            Arc::new(clock.clone()),
        );
        (queue, store, clock)
    }

    #[tokio::test]
    async fn test_enqueue_scores_by_execution_delay() {
        let (queue, store, _clock) = queue();
        let task = Task::new("echo")
            .with_argument("arg", 7)
            .with_execution_delay(Duration::from_secs(5));

        assert!(queue.enqueue(&task).await.unwrap());

        let entries = store.sorted_snapshot("tasker:scheduled");
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].1, 1_005.0);
        let entry = DelayedEntry::from_member(&entries[0].0).unwrap();
        assert_eq!(entry.queue, "default");
        assert_eq!(Task::decode(&entry.data).unwrap(), task);
    }

    #[tokio::test]
    async fn test_identical_enqueue_is_rescored() {
        let (queue, store, clock) = queue();
        let task = Task::new("echo");

        assert!(queue.enqueue(&task).await.unwrap());
        clock.advance(Duration::from_secs(3));
        assert!(!queue.enqueue(&task).await.unwrap());

        let entries = store.sorted_snapshot("tasker:scheduled");
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].1, 1_003.0);
    }

    #[tokio::test]
    async fn test_schedule_async_uses_handler_defaults() {
        let (queue, store, _clock) = queue();
        let mut args = Arguments::new();
        args.insert("seconds".to_string(), 0.into());

        let task = queue.schedule_async(&SleepTask, args).await.unwrap();

        assert_eq!(task.task_type, "sleep");
        assert_eq!(task.retry_strategy, SleepTask.retry_strategy());
        assert_eq!(store.sorted_len("tasker:scheduled").await.unwrap(), 1);
    }
}
