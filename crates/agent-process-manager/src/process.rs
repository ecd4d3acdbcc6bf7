//! Assistant CLI process handle.

use crate::config::AgentConfig;
use crate::error::{AgentProcessError, AgentProcessResult};
use crate::stream::AgentEventStream;
use exec_ops::ExecutionContext;
use serde_json::json;
use tokio::io::AsyncWriteExt;
use tokio::process::ChildStdin;
use tokio::sync::broadcast;
use tracing::{debug, info};

/// A handle to a running assistant process.
pub struct AgentProcess {
    /// Stop signal sender.
    stop_tx: broadcast::Sender<()>,
    /// The event stream (taken on first call to take_stream).
    stream: Option<AgentEventStream>,
    /// Request writer over the process stdin (taken once).
    writer: Option<RequestWriter>,
    /// Process ID if available.
    pid: Option<u32>,
}

impl AgentProcess {
    /// Spawn a new assistant process on the given execution target.
    ///
    /// Returns a handle that can be used to control the process, feed
    /// it follow-up requests, and receive events.
    pub fn spawn(config: AgentConfig, context: &ExecutionContext) -> AgentProcessResult<Self> {
        let command_line = config.build_command_line();

        info!(
            provider = %config.provider,
            model = %config.model,
            working_path = %context.working_path(),
            has_resume = config.resume_session_id.is_some(),
            plan_mode = config.plan_mode,
            "Spawning assistant process"
        );
        debug!(command = %command_line, "Assistant command");

        let mut handle = context.spawn(&command_line)?;
        let pid = handle.pid();
        info!(pid = ?pid, "Assistant process spawned");

        let stdin = handle
            .take_stdin()
            .ok_or(AgentProcessError::MissingPipe("stdin"))?;

        let (stop_tx, stop_rx) = broadcast::channel::<()>(1);
        let stream = AgentEventStream::new(handle, stop_rx)?;

        Ok(Self {
            stop_tx,
            stream: Some(stream),
            writer: Some(RequestWriter { stdin }),
            pid,
        })
    }

    /// Take the event stream from this process handle.
    ///
    /// This can only be called once. Subsequent calls will return `None`.
    pub fn take_stream(&mut self) -> Option<AgentEventStream> {
        self.stream.take()
    }

    /// Take the request writer from this process handle.
    ///
    /// This can only be called once. Subsequent calls will return `None`.
    pub fn take_writer(&mut self) -> Option<RequestWriter> {
        self.writer.take()
    }

    /// Get a clone of the stop signal sender.
    ///
    /// This can be used to stop the process from another task.
    pub fn stop_sender(&self) -> broadcast::Sender<()> {
        self.stop_tx.clone()
    }

    /// Send a stop signal to the process.
    pub fn stop(&self) {
        info!(pid = ?self.pid, "Sending stop signal to assistant process");
        let _ = self.stop_tx.send(());
    }

    /// Get the process ID if available.
    pub fn pid(&self) -> Option<u32> {
        self.pid
    }
}

impl std::fmt::Debug for AgentProcess {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentProcess")
            .field("pid", &self.pid)
            .field("stream_taken", &self.stream.is_none())
            .finish_non_exhaustive()
    }
}

/// Writes structured request frames to the assistant process stdin.
///
/// One frame per line; the frame format mirrors the stream-json input
/// mode of the assistant CLI.
pub struct RequestWriter {
    stdin: ChildStdin,
}

impl RequestWriter {
    /// Write a user message frame.
    ///
    /// With `plan_mode` set the assistant answers the message with a
    /// proposed plan instead of acting directly.
    pub async fn send_user_message(&mut self, content: &str, plan_mode: bool) -> AgentProcessResult<()> {
        let mut frame = json!({
            "type": "user",
            "content": content,
        });
        if plan_mode {
            frame["mode"] = json!("plan");
        }
        self.write_frame(&frame).await
    }

    /// Write an answers frame for a pending clarification question.
    pub async fn send_answers(
        &mut self,
        answers: &std::collections::BTreeMap<String, String>,
    ) -> AgentProcessResult<()> {
        self.write_frame(&json!({
            "type": "answer",
            "answers": answers,
        }))
        .await
    }

    /// Resume after plan approval (`execute`) or rejection (`discard`).
    pub async fn send_plan_decision(&mut self, execute: bool) -> AgentProcessResult<()> {
        self.write_frame(&json!({
            "type": "plan_decision",
            "mode": if execute { "execute" } else { "discard" },
        }))
        .await
    }

    async fn write_frame(&mut self, frame: &serde_json::Value) -> AgentProcessResult<()> {
        let mut line = serde_json::to_string(frame)?;
        line.push('\n');
        self.stdin.write_all(line.as_bytes()).await?;
        self.stdin.flush().await?;
        debug!(frame_len = line.len(), "Wrote request frame");
        Ok(())
    }
}

impl std::fmt::Debug for RequestWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestWriter").finish_non_exhaustive()
    }
}
