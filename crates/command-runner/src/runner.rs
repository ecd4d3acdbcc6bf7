//! Command supervisor registry.

use crate::error::{CommandError, CommandResult};
use crate::ring::LogRing;
use exec_ops::{ExecHandle, ExecutionContext};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tiller_domain::{CommandId, CommandLogLine, CommandStatus, LogStream, ProjectCommand};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::{broadcast, watch};
use tracing::{debug, info, warn};

/// Grace period between SIGTERM and SIGKILL when stopping a command.
const STOP_GRACE: Duration = Duration::from_secs(5);

struct CommandEntry {
    status: CommandStatus,
    stop_tx: Option<broadcast::Sender<()>>,
    /// Flips to true when the supervisor task has fully torn down.
    done_rx: Option<watch::Receiver<bool>>,
    logs: Arc<LogRing>,
}

impl CommandEntry {
    fn idle() -> Self {
        Self {
            status: CommandStatus::Idle,
            stop_tx: None,
            done_rx: None,
            logs: Arc::new(LogRing::default()),
        }
    }
}

/// Supervises project commands, one supervisor task per running
/// command. Architecturally parallel to the thread supervisor but with
/// no session concept.
#[derive(Clone)]
pub struct CommandRunner {
    entries: Arc<Mutex<HashMap<CommandId, CommandEntry>>>,
}

impl CommandRunner {
    pub fn new() -> Self {
        Self {
            entries: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Start a command on the given execution target.
    ///
    /// Fails with `AlreadyRunning` if the command has a live
    /// supervisor. Each invocation starts a fresh log ring.
    pub fn start(
        &self,
        command: &ProjectCommand,
        context: &ExecutionContext,
    ) -> CommandResult<()> {
        let (stop_tx, stop_rx) = broadcast::channel::<()>(1);
        let (done_tx, done_rx) = watch::channel(false);
        let logs = Arc::new(LogRing::default());

        // Registration and the running check happen under one lock so
        // concurrent starts race on the entry, not on the process.
        {
            let mut entries = self.entries.lock().unwrap();
            let entry = entries
                .entry(command.id.clone())
                .or_insert_with(CommandEntry::idle);
            if entry.status == CommandStatus::Running {
                return Err(CommandError::AlreadyRunning(command.id.clone()));
            }
            entry.status = CommandStatus::Running;
            entry.stop_tx = Some(stop_tx);
            entry.done_rx = Some(done_rx);
            entry.logs = logs.clone();
        }

        let handle = match context.spawn(&command.command) {
            Ok(handle) => handle,
            Err(e) => {
                // Roll the entry back so a later start can succeed.
                let mut entries = self.entries.lock().unwrap();
                if let Some(entry) = entries.get_mut(&command.id) {
                    entry.status = CommandStatus::Error { exit_code: -1 };
                    entry.stop_tx = None;
                    entry.done_rx = None;
                }
                return Err(CommandError::Spawn(e));
            }
        };

        info!(command_id = %command.id, name = %command.name, pid = ?handle.pid(), "Command started");

        let entries = self.entries.clone();
        let command_id = command.id.clone();
        tokio::spawn(async move {
            supervise(handle, command_id, entries, logs, stop_rx, done_tx).await;
        });

        Ok(())
    }

    /// Stop a command and wait for its supervisor to tear down.
    ///
    /// Idempotent: stopping a command that is not running, or stopping
    /// twice, is a no-op.
    pub async fn stop(&self, command_id: &CommandId) {
        let (stop_tx, mut done_rx) = {
            let entries = self.entries.lock().unwrap();
            match entries.get(command_id) {
                Some(entry) if entry.status == CommandStatus::Running => {
                    (entry.stop_tx.clone(), entry.done_rx.clone())
                }
                _ => return,
            }
        };

        if let Some(tx) = stop_tx {
            let _ = tx.send(());
        }

        if let Some(ref mut done) = done_rx {
            // The supervisor flips this after the process is reaped,
            // so restart cannot race the old instance for ports.
            while !*done.borrow() {
                if done.changed().await.is_err() {
                    break;
                }
            }
        }
    }

    /// Stop, wait for termination, then start again.
    pub async fn restart(
        &self,
        command: &ProjectCommand,
        context: &ExecutionContext,
    ) -> CommandResult<()> {
        self.stop(&command.id).await;
        self.start(command, context)
    }

    /// Current status. `Idle` for commands never started.
    pub fn status(&self, command_id: &CommandId) -> CommandStatus {
        self.entries
            .lock()
            .unwrap()
            .get(command_id)
            .map(|entry| entry.status)
            .unwrap_or(CommandStatus::Idle)
    }

    /// Captured log lines with `seq > after_seq`, up to `limit`.
    pub fn logs(
        &self,
        command_id: &CommandId,
        after_seq: Option<u64>,
        limit: usize,
    ) -> Vec<CommandLogLine> {
        self.entries
            .lock()
            .unwrap()
            .get(command_id)
            .map(|entry| entry.logs.lines_after(after_seq, limit))
            .unwrap_or_default()
    }

    /// Drop all state for a deleted command. Running commands are
    /// signalled to stop first.
    pub fn forget(&self, command_id: &CommandId) {
        let entry = self.entries.lock().unwrap().remove(command_id);
        if let Some(entry) = entry {
            if let Some(tx) = entry.stop_tx {
                let _ = tx.send(());
            }
        }
    }

    fn set_status(
        entries: &Mutex<HashMap<CommandId, CommandEntry>>,
        command_id: &CommandId,
        status: CommandStatus,
    ) {
        let mut entries = entries.lock().unwrap();
        if let Some(entry) = entries.get_mut(command_id) {
            entry.status = status;
            entry.stop_tx = None;
        }
    }
}

impl Default for CommandRunner {
    fn default() -> Self {
        Self::new()
    }
}

/// Supervisor task: pump output into the ring until the process exits
/// or a stop is requested, then record the final status.
async fn supervise(
    mut handle: ExecHandle,
    command_id: CommandId,
    entries: Arc<Mutex<HashMap<CommandId, CommandEntry>>>,
    logs: Arc<LogRing>,
    mut stop_rx: broadcast::Receiver<()>,
    done_tx: watch::Sender<bool>,
) {
    let mut stdout = handle.take_stdout().map(|s| BufReader::new(s).lines());
    let mut stderr = handle.take_stderr().map(|s| BufReader::new(s).lines());
    let mut stopped = false;

    loop {
        let stdout_line = async {
            match stdout.as_mut() {
                Some(lines) => lines.next_line().await,
                None => std::future::pending().await,
            }
        };
        let stderr_line = async {
            match stderr.as_mut() {
                Some(lines) => lines.next_line().await,
                None => std::future::pending().await,
            }
        };

        tokio::select! {
            _ = stop_rx.recv() => {
                debug!(command_id = %command_id, "Stop signal received - terminating command");
                handle.terminate(STOP_GRACE).await;
                stopped = true;
                break;
            }

            line = stdout_line => {
                match line {
                    Ok(Some(line)) => logs.push(LogStream::Stdout, line),
                    Ok(None) | Err(_) => {
                        stdout = None;
                        if stderr.is_none() {
                            break;
                        }
                    }
                }
            }

            line = stderr_line => {
                match line {
                    Ok(Some(line)) => logs.push(LogStream::Stderr, line),
                    Ok(None) | Err(_) => {
                        stderr = None;
                        if stdout.is_none() {
                            break;
                        }
                    }
                }
            }
        }
    }

    let status = if stopped {
        // An explicit stop wins the race against natural exit.
        let _ = handle.wait().await;
        CommandStatus::Stopped
    } else {
        match handle.wait().await {
            Ok(exit) if exit.success() => CommandStatus::Stopped,
            Ok(exit) => {
                let code = exit.code().unwrap_or(-1);
                warn!(command_id = %command_id, exit_code = code, "Command exited with failure");
                CommandStatus::Error { exit_code: code }
            }
            Err(e) => {
                warn!(command_id = %command_id, error = %e, "Error waiting for command");
                CommandStatus::Error { exit_code: -1 }
            }
        }
    };

    info!(command_id = %command_id, status = ?status, "Command finished");
    CommandRunner::set_status(&entries, &command_id, status);
    let _ = done_tx.send(true);
}

#[cfg(test)]
mod tests {
    use super::*;
    use tiller_domain::ProjectId;

    fn local_context() -> ExecutionContext {
        ExecutionContext::Local {
            path: std::env::temp_dir().to_string_lossy().into_owned(),
        }
    }

    fn command(script: &str) -> ProjectCommand {
        ProjectCommand {
            id: CommandId::new(),
            project_id: ProjectId::new(),
            name: "test".to_string(),
            command: script.to_string(),
            cwd: None,
        }
    }

    async fn wait_until_not_running(runner: &CommandRunner, id: &CommandId) -> CommandStatus {
        for _ in 0..200 {
            let status = runner.status(id);
            if status != CommandStatus::Running {
                return status;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        panic!("command did not finish");
    }

    #[tokio::test]
    async fn captures_stdout_and_stderr() {
        let runner = CommandRunner::new();
        let cmd = command("echo out; echo err >&2");

        runner.start(&cmd, &local_context()).unwrap();
        wait_until_not_running(&runner, &cmd.id).await;

        let lines = runner.logs(&cmd.id, None, 100);
        assert!(lines
            .iter()
            .any(|l| l.stream == LogStream::Stdout && l.content == "out"));
        assert!(lines
            .iter()
            .any(|l| l.stream == LogStream::Stderr && l.content == "err"));
    }

    #[tokio::test]
    async fn double_start_is_rejected() {
        let runner = CommandRunner::new();
        let cmd = command("sleep 5");

        runner.start(&cmd, &local_context()).unwrap();
        let err = runner.start(&cmd, &local_context()).unwrap_err();
        assert!(matches!(err, CommandError::AlreadyRunning(_)));

        runner.stop(&cmd.id).await;
    }

    #[tokio::test]
    async fn stop_is_idempotent() {
        let runner = CommandRunner::new();
        let cmd = command("sleep 5");

        runner.start(&cmd, &local_context()).unwrap();
        runner.stop(&cmd.id).await;
        runner.stop(&cmd.id).await;

        assert_eq!(runner.status(&cmd.id), CommandStatus::Stopped);

        // Stopping after natural exit is also a no-op.
        let short = command("true");
        runner.start(&short, &local_context()).unwrap();
        wait_until_not_running(&runner, &short.id).await;
        runner.stop(&short.id).await;
    }

    #[tokio::test]
    async fn nonzero_exit_is_an_error() {
        let runner = CommandRunner::new();
        let cmd = command("exit 7");

        runner.start(&cmd, &local_context()).unwrap();
        let status = wait_until_not_running(&runner, &cmd.id).await;
        assert_eq!(status, CommandStatus::Error { exit_code: 7 });
    }

    #[tokio::test]
    async fn restart_waits_for_termination() {
        let runner = CommandRunner::new();
        let cmd = command("echo round; sleep 5");

        runner.start(&cmd, &local_context()).unwrap();
        runner.restart(&cmd, &local_context()).await.unwrap();

        assert_eq!(runner.status(&cmd.id), CommandStatus::Running);
        runner.stop(&cmd.id).await;

        // The restart started a fresh ring for the new invocation.
        let lines = runner.logs(&cmd.id, None, 100);
        assert!(lines.len() <= 1);
    }

    #[tokio::test]
    async fn status_for_unknown_command_is_idle() {
        let runner = CommandRunner::new();
        assert_eq!(runner.status(&CommandId::new()), CommandStatus::Idle);
        assert!(runner.logs(&CommandId::new(), None, 10).is_empty());
    }
}
