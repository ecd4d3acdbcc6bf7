//! Periodic status polling per location path.

use crate::status::get_status_snapshot;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::Duration;
use tiller_domain::GitStatusSnapshot;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

struct PollTask {
    handle: JoinHandle<()>,
    rx: watch::Receiver<Option<GitStatusSnapshot>>,
}

/// Runs one polling task per watched repository path.
///
/// Each task recomputes the snapshot on an interval and publishes it
/// over a watch channel; subscribers only see changed values. Pollers
/// are independently cancellable and share no locks with thread
/// supervisors.
pub struct StatusPoller {
    tasks: Mutex<HashMap<PathBuf, PollTask>>,
    interval: Duration,
}

impl StatusPoller {
    pub fn new(interval: Duration) -> Self {
        Self {
            tasks: Mutex::new(HashMap::new()),
            interval,
        }
    }

    /// Start (or join) watching a path.
    ///
    /// Returns a receiver holding the latest snapshot; `None` until
    /// the first poll completes.
    pub fn watch(&self, path: impl Into<PathBuf>) -> watch::Receiver<Option<GitStatusSnapshot>> {
        let path = path.into();
        let mut tasks = self.tasks.lock().unwrap();

        if let Some(task) = tasks.get(&path) {
            return task.rx.clone();
        }

        let (tx, rx) = watch::channel(None);
        let interval = self.interval;
        let poll_path = path.clone();
        let handle = tokio::spawn(async move {
            loop {
                let snapshot_path = poll_path.clone();
                let result =
                    tokio::task::spawn_blocking(move || get_status_snapshot(&snapshot_path)).await;

                match result {
                    Ok(Ok(snapshot)) => {
                        // watch dedupes on the receiver side only via
                        // borrow comparisons; avoid waking subscribers
                        // for identical snapshots.
                        let changed = tx.borrow().as_ref() != Some(&snapshot);
                        if changed && tx.send(Some(snapshot)).is_err() {
                            break;
                        }
                    }
                    Ok(Err(e)) => {
                        debug!(path = %poll_path.display(), error = %e, "Status poll failed");
                    }
                    Err(e) => {
                        warn!(error = %e, "Status poll task panicked");
                        break;
                    }
                }

                tokio::time::sleep(interval).await;
            }
        });

        tasks.insert(path, PollTask { handle, rx: rx.clone() });
        rx
    }

    /// Stop watching a path. No-op when not watched.
    pub fn unwatch(&self, path: &PathBuf) {
        let mut tasks = self.tasks.lock().unwrap();
        if let Some(task) = tasks.remove(path) {
            task.handle.abort();
            debug!(path = %path.display(), "Stopped status poller");
        }
    }

    /// Number of active pollers (diagnostics).
    pub fn active(&self) -> usize {
        self.tasks.lock().unwrap().len()
    }
}

impl Drop for StatusPoller {
    fn drop(&mut self) {
        let tasks = self.tasks.lock().unwrap();
        for task in tasks.values() {
            task.handle.abort();
        }
    }
}
