//! Shared application state injected into every Axum handler.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use crate::config::Config;
use crate::entities::SqliteStore;
use crate::orchestrator::Orchestrator;

/// Tracks in-flight background tasks by key (the placeholder id).
pub struct TaskManager {
    handles: Mutex<HashMap<String, tokio::task::AbortHandle>>,
}

impl std::fmt::Debug for TaskManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "TaskManager({} handles)", self.in_flight())
    }
}

impl TaskManager {
    pub fn new() -> Self {
        Self { handles: Mutex::new(HashMap::new()) }
    }

    // A poisoned map is still structurally sound; keep tracking.
    fn lock(&self) -> MutexGuard<'_, HashMap<String, tokio::task::AbortHandle>> {
        self.handles.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Spawn `fut` unless a task with the same key is already running.
    ///
    /// Returns `false` (and drops `fut`) on a duplicate key. The entry is
    /// removed when the task finishes.
    pub fn spawn_unique<F>(self: &Arc<Self>, key: impl Into<String>, fut: F) -> bool
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let key = key.into();
        let mut map = self.lock();
        if map.contains_key(&key) {
            return false;
        }
        // The task's own `remove` blocks on this lock until the insert below lands.
        let registry = Arc::clone(self);
        let done_key = key.clone();
        let handle = tokio::spawn(async move {
            fut.await;
            registry.remove(&done_key);
        });
        map.insert(key, handle.abort_handle());
        true
    }

    pub fn in_flight(&self) -> usize {
        self.lock().len()
    }

    pub fn remove(&self, key: &str) {
        self.lock().remove(key);
    }

    /// Wait until every tracked task has finished or `timeout` elapses.
    ///
    /// Tasks still running at the deadline are aborted and their keys returned.
    pub async fn drain(&self, timeout: Duration) -> Vec<String> {
        let deadline = tokio::time::Instant::now() + timeout;
        while self.in_flight() > 0 && tokio::time::Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(25)).await;
        }
        let mut map = self.lock();
        map.drain()
            .map(|(key, handle)| {
                handle.abort();
                key
            })
            .collect()
    }
}

impl Default for TaskManager {
    fn default() -> Self {
        Self::new()
    }
}

/// State shared across all HTTP handlers.
#[derive(Clone, Debug)]
pub struct AppState {
    /// Server configuration (env-derived).
    pub config: Arc<Config>,
    /// Channel, message and image store.
    pub store: Arc<SqliteStore>,
    /// Owns the deferred-completion pipeline.
    pub orchestrator: Orchestrator,
}
