//! Assistant CLI process management.
//!
//! This crate owns one assistant subprocess at a time on behalf of a
//! thread supervisor:
//! - Command construction from thread provider/model and the active
//!   session's resume token
//! - Spawning through an [`exec_ops::ExecutionContext`] (local, SSH,
//!   or WSL)
//! - Incremental NDJSON parsing of the subprocess output into typed
//!   [`AgentEvent`]s, in the exact order the process emitted them
//! - Follow-up request frames written to the subprocess stdin
//! - Stop signalling and whole-tree termination
//!
//! ```text
//! Orchestrator ──► AgentProcess::spawn() ──► child (via exec context)
//!                        │                      │ stdout/stderr
//!                        │ RequestWriter        ▼
//!                        │ (stdin frames)  AgentEventStream
//!                        │                      │ AgentEvent
//!                        └──────────────► event pump task
//! ```

mod config;
mod error;
mod event;
mod process;
mod stream;

pub use config::{AgentConfig, DEFAULT_ALLOWED_TOOLS};
pub use error::{AgentProcessError, AgentProcessResult};
pub use event::AgentEvent;
pub use process::{AgentProcess, RequestWriter};
pub use stream::AgentEventStream;
