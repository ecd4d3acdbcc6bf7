//! Assistant event streaming.

use crate::event::AgentEvent;
use exec_ops::ExecHandle;
use regex::Regex;
use std::collections::VecDeque;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader, Lines};
use tokio::process::{ChildStderr, ChildStdout};
use tokio::sync::broadcast;
use tracing::{debug, warn};

/// Consecutive JSON-looking lines that fail to parse before the stream
/// is considered desynchronized.
const MAX_PARSE_FAILURES: u32 = 8;

/// Lines of stderr retained for crash reporting.
const STDERR_TAIL_LINES: usize = 40;

/// Grace period between SIGTERM and SIGKILL on stop.
const STOP_GRACE: Duration = Duration::from_secs(5);

/// A stream of events from an assistant process.
///
/// Yields events in the exact order the process emitted them on
/// stdout. Stderr lines are interleaved as [`AgentEvent::Stderr`] and
/// retained in a bounded tail for error reporting.
pub struct AgentEventStream {
    stdout: Lines<BufReader<ChildStdout>>,
    stderr: Option<Lines<BufReader<ChildStderr>>>,
    handle: ExecHandle,
    stop_rx: broadcast::Receiver<()>,
    ansi_regex: Regex,
    stderr_tail: VecDeque<String>,
    consecutive_parse_failures: u32,
    finished: bool,
}

impl AgentEventStream {
    pub(crate) fn new(
        mut handle: ExecHandle,
        stop_rx: broadcast::Receiver<()>,
    ) -> Result<Self, crate::AgentProcessError> {
        let stdout = handle
            .take_stdout()
            .ok_or(crate::AgentProcessError::MissingPipe("stdout"))?;
        let stderr = handle.take_stderr();

        Ok(Self {
            stdout: BufReader::new(stdout).lines(),
            stderr: stderr.map(|s| BufReader::new(s).lines()),
            handle,
            stop_rx,
            ansi_regex: ansi_regex(),
            stderr_tail: VecDeque::with_capacity(STDERR_TAIL_LINES),
            consecutive_parse_failures: 0,
            finished: false,
        })
    }

    /// Get the next event from the stream.
    ///
    /// Returns `None` once a terminal event has been yielded.
    pub async fn next(&mut self) -> Option<AgentEvent> {
        if self.finished {
            return None;
        }

        loop {
            // Avoid polling a closed stderr pipe forever.
            let stderr = self.stderr.as_mut();
            let stderr_line = async move {
                match stderr {
                    Some(lines) => lines.next_line().await,
                    None => std::future::pending().await,
                }
            };

            tokio::select! {
                _ = self.stop_rx.recv() => {
                    debug!("Stop signal received - terminating assistant process");
                    self.handle.terminate(STOP_GRACE).await;
                    self.finished = true;
                    return Some(AgentEvent::Stopped);
                }

                line_result = self.stdout.next_line() => {
                    match line_result {
                        Ok(Some(line)) => {
                            match self.process_line(&line) {
                                LineOutcome::Event(event) => return Some(event),
                                LineOutcome::Desync(detail) => {
                                    self.finished = true;
                                    self.handle.terminate(STOP_GRACE).await;
                                    return Some(AgentEvent::Desynchronized { detail });
                                }
                                LineOutcome::Skipped => {}
                            }
                        }
                        Ok(None) => {
                            // EOF - process stdout closed
                            return self.finish_process().await;
                        }
                        Err(e) => {
                            warn!(error = %e, "Error reading assistant stdout");
                            return self.finish_process().await;
                        }
                    }
                }

                line_result = stderr_line => {
                    match line_result {
                        Ok(Some(line)) => {
                            self.push_stderr(&line);
                            return Some(AgentEvent::Stderr { line });
                        }
                        Ok(None) | Err(_) => {
                            self.stderr = None;
                        }
                    }
                }
            }
        }
    }

    /// Process a line from stdout.
    fn process_line(&mut self, line: &str) -> LineOutcome {
        let clean_line = self.ansi_regex.replace_all(line, "").to_string();

        if clean_line.trim().is_empty() {
            return LineOutcome::Skipped;
        }

        if !clean_line.trim_start().starts_with('{') {
            debug!(
                line = %truncate(&clean_line, 80),
                "Skipping non-JSON line"
            );
            return LineOutcome::Skipped;
        }

        match serde_json::from_str::<serde_json::Value>(&clean_line) {
            Ok(json) => {
                self.consecutive_parse_failures = 0;
                LineOutcome::Event(AgentEvent::from_json(json))
            }
            Err(e) => {
                self.consecutive_parse_failures += 1;
                warn!(
                    error = %e,
                    failures = self.consecutive_parse_failures,
                    "Failed to parse JSON from assistant stdout"
                );
                if self.consecutive_parse_failures >= MAX_PARSE_FAILURES {
                    LineOutcome::Desync(format!(
                        "{MAX_PARSE_FAILURES} consecutive unparseable frames; last error: {e}"
                    ))
                } else {
                    LineOutcome::Skipped
                }
            }
        }
    }

    fn push_stderr(&mut self, line: &str) {
        if self.stderr_tail.len() == STDERR_TAIL_LINES {
            self.stderr_tail.pop_front();
        }
        self.stderr_tail.push_back(line.to_string());
    }

    /// Finish the process and return the final event.
    async fn finish_process(&mut self) -> Option<AgentEvent> {
        self.finished = true;

        // Drain remaining stderr into the tail.
        if let Some(ref mut stderr) = self.stderr {
            while let Ok(Some(line)) = stderr.next_line().await {
                warn!(stderr = %line, "Assistant stderr");
                if self.stderr_tail.len() == STDERR_TAIL_LINES {
                    self.stderr_tail.pop_front();
                }
                self.stderr_tail.push_back(line);
            }
        }

        match self.handle.wait().await {
            Ok(status) => Some(AgentEvent::Finished {
                success: status.success(),
                exit_code: status.code(),
            }),
            Err(e) => {
                warn!(error = %e, "Error waiting for assistant process");
                Some(AgentEvent::Finished {
                    success: false,
                    exit_code: None,
                })
            }
        }
    }

    /// The last captured stderr lines, oldest first.
    pub fn stderr_tail(&self) -> Vec<String> {
        self.stderr_tail.iter().cloned().collect()
    }

    /// Check if the stream has finished.
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Get the process ID if available.
    pub fn pid(&self) -> Option<u32> {
        self.handle.pid()
    }
}

enum LineOutcome {
    Event(AgentEvent),
    Skipped,
    Desync(String),
}

impl std::fmt::Debug for AgentEventStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentEventStream")
            .field("pid", &self.handle.pid())
            .field("finished", &self.finished)
            .finish_non_exhaustive()
    }
}

fn truncate(s: &str, max: usize) -> &str {
    if s.len() > max {
        &s[..max]
    } else {
        s
    }
}

pub(crate) fn ansi_regex() -> Regex {
    Regex::new(r"\x1B(?:\[[0-9;?]*[A-Za-z~]|\][^\x07]*\x07)").unwrap()
}

/// Strip ANSI escape codes from a line and attempt to parse it as an
/// agent event.
///
/// Returns `None` for empty lines, non-JSON lines, and invalid JSON.
/// Extracted from `AgentEventStream::process_line` for testability.
pub fn parse_stdout_line(line: &str, ansi: &Regex) -> Option<AgentEvent> {
    let clean_line = ansi.replace_all(line, "").to_string();

    if clean_line.trim().is_empty() {
        return None;
    }

    if !clean_line.trim_start().starts_with('{') {
        return None;
    }

    serde_json::from_str::<serde_json::Value>(&clean_line)
        .ok()
        .map(AgentEvent::from_json)
}
