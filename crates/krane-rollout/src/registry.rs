//! In-memory record of the ephemeral tasks the engine created.
//!
//! Tasks are created once and then only observed. The registry remembers
//! what was last seen for each task name so that a task that disappears
//! from the store is reported instead of silently re-created.

use std::collections::HashMap;
use std::sync::RwLock;

use krane_core::meta::object_key;

/// Last observed lifecycle state of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskObservation {
    /// Created by this process, not yet observed.
    Created,
    /// Present, no container state reported yet.
    Pending,
    Running,
    Exited(i32),
    /// Previously created or observed, now missing from the store.
    Vanished,
}

/// Task key (`{namespace}/{name}`) to last observation.
#[derive(Debug, Default)]
pub struct TaskRegistry {
    tasks: RwLock<HashMap<String, TaskObservation>>,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an observation. Returns the previous one.
    pub fn observe(
        &self,
        namespace: &str,
        task: &str,
        observation: TaskObservation,
    ) -> Option<TaskObservation> {
        let mut tasks = self.tasks.write().unwrap_or_else(|e| e.into_inner());
        tasks.insert(object_key(namespace, task), observation)
    }

    pub fn get(&self, namespace: &str, task: &str) -> Option<TaskObservation> {
        let tasks = self.tasks.read().unwrap_or_else(|e| e.into_inner());
        tasks.get(&object_key(namespace, task)).copied()
    }

    /// Whether the task was created or seen before.
    pub fn is_known(&self, namespace: &str, task: &str) -> bool {
        self.get(namespace, task).is_some()
    }

    /// Drop the entries of the given tasks.
    pub fn forget(&self, namespace: &str, tasks: &[String]) {
        let mut tasks_map = self.tasks.write().unwrap_or_else(|e| e.into_inner());
        for task in tasks {
            tasks_map.remove(&object_key(namespace, task));
        }
    }

    pub fn len(&self) -> usize {
        self.tasks.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn observe_returns_previous() {
        let registry = TaskRegistry::new();
        assert_eq!(
            registry.observe("default", "r-judge", TaskObservation::Created),
            None
        );
        assert_eq!(
            registry.observe("default", "r-judge", TaskObservation::Running),
            Some(TaskObservation::Created)
        );
        assert_eq!(
            registry.get("default", "r-judge"),
            Some(TaskObservation::Running)
        );
        assert!(!registry.is_known("other", "r-judge"));
    }

    #[test]
    fn forget_removes_only_named_tasks() {
        let registry = TaskRegistry::new();
        registry.observe("default", "a-testjob", TaskObservation::Exited(0));
        registry.observe("default", "a-judge", TaskObservation::Running);
        registry.observe("default", "b-judge", TaskObservation::Pending);

        registry.forget("default", &["a-testjob".to_string(), "a-judge".to_string()]);

        assert_eq!(registry.len(), 1);
        assert!(registry.is_known("default", "b-judge"));
    }
}
