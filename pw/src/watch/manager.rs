//! NotificationManager - registry of per-subscriber background tasks
//!
//! The NotificationManager is responsible for:
//! - Spawning one watch task per subscriber key as a tokio task
//! - Rejecting a second start while a key is still registered
//! - Cancelling a single task, or every task at shutdown
//! - Waiting until every task it ever launched has returned
//!
//! Each task runs under a child of the caller's cancellation token, so
//! cancelling the parent scope stops every task derived from it.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info};

type Registry = Arc<Mutex<HashMap<String, TaskEntry>>>;

/// Registry entry for one running task
#[derive(Debug)]
struct TaskEntry {
    cancel: CancellationToken,
    /// Distinguishes this launch from an earlier task under the same key
    generation: u64,
}

/// Removes the task's own entry when the task finishes, including on panic
struct ExitGuard {
    registry: Registry,
    key: String,
    generation: u64,
}

impl Drop for ExitGuard {
    fn drop(&mut self) {
        let mut registry = lock(&self.registry);
        // A stop followed by a fresh start reuses the key; leave the newer entry alone
        if registry.get(&self.key).is_some_and(|e| e.generation == self.generation) {
            registry.remove(&self.key);
            debug!(key = %self.key, "ExitGuard::drop: removed own registry entry");
        } else {
            debug!(key = %self.key, "ExitGuard::drop: entry already removed or replaced");
        }
        info!(key = %self.key, "Notification routine exited");
    }
}

fn lock(registry: &Registry) -> MutexGuard<'_, HashMap<String, TaskEntry>> {
    // The map stays consistent across a panic: every mutation is a single insert or remove
    registry.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Owns the set of running per-subscriber tasks
///
/// The lock guarding the registry is held only for map updates, never
/// across an await, so every method except [`stop_all`](Self::stop_all)
/// returns without waiting on a task.
#[derive(Debug, Default)]
pub struct NotificationManager {
    registry: Registry,
    tracker: TaskTracker,
    next_generation: AtomicU64,
}

impl NotificationManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Launch `body` for `key` unless a task is already registered for it
    ///
    /// Returns `false` without side effects when `key` is taken. Otherwise
    /// `body` receives a child token of `parent` and runs as its own tokio
    /// task; when it returns the key becomes startable again. Must be called
    /// from within a tokio runtime.
    pub fn start<F, Fut>(&self, parent: &CancellationToken, key: &str, body: F) -> bool
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        debug!(%key, "start: called");
        let cancel = parent.child_token();
        let generation = {
            let mut registry = lock(&self.registry);
            if registry.contains_key(key) {
                info!(%key, "Notification already active");
                return false;
            }
            let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
            registry.insert(
                key.to_string(),
                TaskEntry {
                    cancel: cancel.clone(),
                    generation,
                },
            );
            generation
        };

        let guard = ExitGuard {
            registry: Arc::clone(&self.registry),
            key: key.to_string(),
            generation,
        };
        let task = body(cancel);
        self.tracker.spawn(async move {
            let _guard = guard;
            task.await;
        });

        info!(%key, generation, "Starting notification");
        true
    }

    /// Whether a task is currently registered for `key`
    pub fn active(&self, key: &str) -> bool {
        let active = lock(&self.registry).contains_key(key);
        debug!(%key, active, "active: called");
        active
    }

    /// Unregister `key` and signal its task to stop
    ///
    /// Does not wait for the task to exit. Returns whether `key` was found.
    pub fn stop(&self, key: &str) -> bool {
        debug!(%key, "stop: called");
        let entry = lock(&self.registry).remove(key);
        match entry {
            Some(entry) => {
                info!(%key, "Stopping notification");
                entry.cancel.cancel();
                true
            }
            None => {
                debug!(%key, "stop: not registered");
                false
            }
        }
    }

    /// Cancel every registered task and wait for all launched tasks to return
    ///
    /// A task body that never observes cancellation makes this wait forever;
    /// callers wanting a bound should wrap it in `tokio::time::timeout`.
    /// Safe to call more than once.
    pub async fn stop_all(&self) {
        debug!("stop_all: called");
        let drained: Vec<(String, TaskEntry)> = lock(&self.registry).drain().collect();

        if !drained.is_empty() {
            info!("Stopping all notifications ({})", drained.len());
        }
        for (key, entry) in drained {
            debug!(%key, "stop_all: cancelling");
            entry.cancel.cancel();
        }

        // Closing only lets wait() complete; tasks started later are still tracked
        self.tracker.close();
        debug!(in_flight = self.tracker.len(), "stop_all: waiting for tasks to exit");
        self.tracker.wait().await;
        debug!("stop_all: complete");
    }

    /// Number of registered keys
    pub fn len(&self) -> usize {
        lock(&self.registry).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
