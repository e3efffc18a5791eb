//! Lifecycle hooks.
//!
//! Callbacks registered here run inside the worker at fixed points of a
//! task's execution. `BeforePerform` is the place to refresh resources that
//! may have gone stale (database handles, sockets) before user code runs.

use std::collections::HashMap;
use std::sync::Arc;

use super::task::Task;

/// Point in the task lifecycle at which a hook fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HookPoint {
    BeforePerform,
    Completed,
    Retried,
    Failed,
}

pub type Hook = Arc<dyn Fn(&Task) + Send + Sync>;

/// Hook callbacks grouped by [`HookPoint`], run in registration order.
#[derive(Default, Clone)]
pub struct Hooks {
    hooks: HashMap<HookPoint, Vec<Hook>>,
}

impl Hooks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add<F>(&mut self, point: HookPoint, hook: F)
    where
        F: Fn(&Task) + Send + Sync + 'static,
    {
        self.hooks.entry(point).or_default().push(Arc::new(hook));
    }

    /// Builder form of [`Hooks::add`].
    pub fn with<F>(mut self, point: HookPoint, hook: F) -> Self
    where
        F: Fn(&Task) + Send + Sync + 'static,
    {
        self.add(point, hook);
        self
    }

    pub fn run(&self, point: HookPoint, task: &Task) {
        if let Some(hooks) = self.hooks.get(&point) {
            for hook in hooks {
                hook(task);
            }
        }
    }

    pub fn count(&self, point: HookPoint) -> usize {
        self.hooks.get(&point).map(Vec::len).unwrap_or(0)
    }
}

impl std::fmt::Debug for Hooks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let counts: HashMap<_, _> = self.hooks.iter().map(|(p, h)| (*p, h.len())).collect();
        f.debug_struct("Hooks").field("hooks", &counts).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_hooks_run_in_order_per_point() {
        let order = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let (a, b) = (order.clone(), order.clone());

        let hooks = Hooks::new()
            .with(HookPoint::Completed, move |_| a.lock().push("first"))
            .with(HookPoint::Completed, move |_| b.lock().push("second"));

        hooks.run(HookPoint::Completed, &Task::new("echo"));
        hooks.run(HookPoint::Failed, &Task::new("echo"));

        assert_eq!(*order.lock(), vec!["first", "second"]);
        assert_eq!(hooks.count(HookPoint::Completed), 2);
        assert_eq!(hooks.count(HookPoint::Failed), 0);
    }

    #[test]
    fn test_hook_sees_task() {
        let seen = Arc::new(AtomicUsize::new(0));
        let counter = seen.clone();
        let mut hooks = Hooks::new();
        hooks.add(HookPoint::Retried, move |task| {
            counter.store(task.retry_count as usize, Ordering::SeqCst);
        });

        let mut task = Task::new("echo");
        task.retry_count = 3;
        hooks.run(HookPoint::Retried, &task);
        assert_eq!(seen.load(Ordering::SeqCst), 3);
    }
}
