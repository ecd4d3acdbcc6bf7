//! Shared daemon state.

use command_runner::CommandRunner;
use git_ops::StatusPoller;
use std::sync::Arc;
use std::time::Duration;
use thread_lifecycle_orchestrator::ThreadOrchestrator;
use tiller_domain::MemoryStore;

/// Git status poll cadence.
const GIT_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// State shared across all IPC handlers.
#[derive(Clone)]
pub struct DaemonState {
    /// The thread execution engine.
    pub engine: ThreadOrchestrator<MemoryStore>,
    /// Project command supervisor.
    pub commands: CommandRunner,
    /// Git status pollers, one per watched path.
    pub git_poller: Arc<StatusPoller>,
}

impl DaemonState {
    pub fn new() -> Self {
        let store = Arc::new(MemoryStore::new());
        Self {
            engine: ThreadOrchestrator::new(store),
            commands: CommandRunner::new(),
            git_poller: Arc::new(StatusPoller::new(GIT_POLL_INTERVAL)),
        }
    }
}
