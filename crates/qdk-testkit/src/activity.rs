//! Recording [`ActivityLogger`] for assertions.

use qdk_reset::activity::{ActivityError, ActivityLogger};
use serde_json::Value;
use std::sync::{Arc, Mutex, MutexGuard};

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// One captured activity entry.
#[derive(Debug, Clone)]
pub struct LoggedAction {
    pub actor_id: i64,
    pub action: String,
    pub origin: String,
    pub details: Value,
}

/// Activity logger that keeps entries in memory instead of writing JSONL.
pub struct MemoryActivityLog {
    entries: Mutex<Vec<LoggedAction>>,
}

impl MemoryActivityLog {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            entries: Mutex::new(Vec::new()),
        })
    }

    pub fn entries(&self) -> Vec<LoggedAction> {
        lock(&self.entries).clone()
    }

    /// Action names in append order.
    pub fn actions(&self) -> Vec<String> {
        lock(&self.entries).iter().map(|e| e.action.clone()).collect()
    }

    /// How many entries carry this action name.
    pub fn count(&self, action: &str) -> usize {
        lock(&self.entries)
            .iter()
            .filter(|e| e.action == action)
            .count()
    }
}

impl ActivityLogger for MemoryActivityLog {
    fn log(
        &self,
        actor_id: i64,
        action: &str,
        origin: &str,
        details: Value,
    ) -> Result<(), ActivityError> {
        lock(&self.entries).push(LoggedAction {
            actor_id,
            action: action.to_string(),
            origin: origin.to_string(),
            details,
        });
        Ok(())
    }
}
