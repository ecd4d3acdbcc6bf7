//! Process handles with whole-tree termination.

use std::time::Duration;
use tokio::process::{Child, ChildStderr, ChildStdin, ChildStdout};
use tokio::time::timeout;
use tracing::{debug, warn};

/// A handle to a spawned process and its process group.
pub struct ExecHandle {
    child: Child,
    /// Process group ID captured at spawn. The child was started as
    /// its own group leader, so this equals the child's PID.
    #[cfg(unix)]
    pgid: Option<i32>,
}

impl ExecHandle {
    pub(crate) fn new(child: Child) -> Self {
        #[cfg(unix)]
        let pgid = child.id().map(|pid| pid as i32);
        Self {
            child,
            #[cfg(unix)]
            pgid,
        }
    }

    /// The OS process ID, if the process is still tracked.
    pub fn pid(&self) -> Option<u32> {
        self.child.id()
    }

    /// Takes the stdin pipe. Can only be taken once.
    pub fn take_stdin(&mut self) -> Option<ChildStdin> {
        self.child.stdin.take()
    }

    /// Takes the stdout pipe. Can only be taken once.
    pub fn take_stdout(&mut self) -> Option<ChildStdout> {
        self.child.stdout.take()
    }

    /// Takes the stderr pipe. Can only be taken once.
    pub fn take_stderr(&mut self) -> Option<ChildStderr> {
        self.child.stderr.take()
    }

    /// Waits for the process to exit.
    pub async fn wait(&mut self) -> std::io::Result<std::process::ExitStatus> {
        self.child.wait().await
    }

    /// Returns the exit status if the process has already exited.
    pub fn try_wait(&mut self) -> std::io::Result<Option<std::process::ExitStatus>> {
        self.child.try_wait()
    }

    /// Terminates the whole process tree.
    ///
    /// Sends SIGTERM to the process group, waits up to `grace`, then
    /// SIGKILLs the group. Terminating an already-exited process is a
    /// no-op, not an error.
    pub async fn terminate(&mut self, grace: Duration) {
        if matches!(self.child.try_wait(), Ok(Some(_))) {
            debug!("Process already exited, nothing to terminate");
            return;
        }

        self.signal_group(Signal::Term);

        match timeout(grace, self.child.wait()).await {
            Ok(Ok(status)) => {
                debug!(status = ?status.code(), "Process exited within grace period");
            }
            Ok(Err(e)) => {
                warn!(error = %e, "Error waiting for process during terminate");
            }
            Err(_) => {
                warn!(pid = ?self.child.id(), "Grace period elapsed, killing process group");
                self.signal_group(Signal::Kill);
                let _ = self.child.wait().await;
            }
        }
    }

    #[cfg(unix)]
    fn signal_group(&mut self, signal: Signal) {
        let sig = match signal {
            Signal::Term => libc::SIGTERM,
            Signal::Kill => libc::SIGKILL,
        };
        if let Some(pgid) = self.pgid {
            // Negative PID addresses the whole group, taking ssh/wsl
            // proxy children down with the leader.
            unsafe {
                libc::kill(-pgid, sig);
            }
        } else {
            let _ = self.child.start_kill();
        }
    }

    #[cfg(not(unix))]
    fn signal_group(&mut self, _signal: Signal) {
        let _ = self.child.start_kill();
    }
}

enum Signal {
    Term,
    Kill,
}

impl std::fmt::Debug for ExecHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecHandle")
            .field("pid", &self.child.id())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::ExecutionContext;

    fn local_context() -> ExecutionContext {
        ExecutionContext::Local {
            path: std::env::temp_dir().to_string_lossy().into_owned(),
        }
    }

    #[tokio::test]
    async fn terminate_kills_a_sleeping_process() {
        let mut handle = local_context().spawn("sleep 30").unwrap();
        assert!(handle.pid().is_some());

        handle.terminate(Duration::from_secs(2)).await;
        assert!(matches!(handle.try_wait(), Ok(Some(_))));
    }

    #[tokio::test]
    async fn terminate_after_exit_is_a_noop() {
        let mut handle = local_context().spawn("true").unwrap();
        let _ = handle.wait().await;

        // Second and third terminations must not error or hang.
        handle.terminate(Duration::from_millis(100)).await;
        handle.terminate(Duration::from_millis(100)).await;
    }

    #[tokio::test]
    async fn terminate_takes_down_descendants() {
        // The spawned shell forks a grandchild; group termination must
        // reach it. We only assert the leader dies promptly here.
        let mut handle = local_context().spawn("sleep 30 & wait").unwrap();
        handle.terminate(Duration::from_secs(2)).await;
        assert!(matches!(handle.try_wait(), Ok(Some(_))));
    }
}
