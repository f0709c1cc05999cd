//! Set of task ids the client is waiting on.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

#[derive(Debug, Clone, Default)]
pub struct PendingTaskRegistry {
    ids: Arc<Mutex<HashSet<String>>>,
}

impl PendingTaskRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` if the id was not already pending.
    pub fn register(&self, task_id: &str) -> bool {
        self.lock().insert(task_id.to_string())
    }

    /// Returns `true` if the id was pending.
    pub fn remove(&self, task_id: &str) -> bool {
        self.lock().remove(task_id)
    }

    #[must_use]
    pub fn contains(&self, task_id: &str) -> bool {
        self.lock().contains(task_id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Sorted copy of the pending ids.
    #[must_use]
    pub fn snapshot(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.lock().iter().cloned().collect();
        ids.sort();
        ids
    }

    fn lock(&self) -> MutexGuard<'_, HashSet<String>> {
        self.ids.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
