//! Process-scoped state shared by every component.
//!
//! Built once at startup and cloned into the scheduler and each worker.
//! Nothing in it is mutated after construction.

use std::sync::Arc;

use crate::clock::{Clock, SystemClock};
use crate::config::TaskerConfig;
use crate::store::{QueueStore, StoreKeys};
use crate::tasks::{Hooks, TaskQueue, TaskRegistry};

#[derive(Clone)]
pub struct TaskerContext {
    config: Arc<TaskerConfig>,
    store: Arc<dyn QueueStore>,
    registry: Arc<TaskRegistry>,
    hooks: Arc<Hooks>,
    clock: Arc<dyn Clock>,
}

impl TaskerContext {
    pub fn new(config: TaskerConfig, store: Arc<dyn QueueStore>, registry: TaskRegistry) -> Self {
        Self {
            config: Arc::new(config),
            store,
            registry: Arc::new(registry),
            hooks: Arc::new(Hooks::new()),
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_hooks(mut self, hooks: Hooks) -> Self {
        self.hooks = Arc::new(hooks);
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn config(&self) -> &TaskerConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn QueueStore> {
        &self.store
    }

    pub fn registry(&self) -> &TaskRegistry {
        &self.registry
    }

    pub fn hooks(&self) -> &Hooks {
        &self.hooks
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    pub fn keys(&self) -> StoreKeys {
        StoreKeys::new(self.config.namespace.clone())
    }

    /// Producer handle bound to this context's store and namespace.
    pub fn queue(&self) -> TaskQueue {
        TaskQueue::new(self.store.clone(), self.keys(), self.clock.clone())
    }
}

impl std::fmt::Debug for TaskerContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskerContext")
            .field("namespace", &self.config.namespace)
            .field("store", &self.store.name())
            .field("registry", &self.registry)
            .field("hooks", &self.hooks)
            .finish()
    }
}
