//! Error types for agent processes.

use thiserror::Error;

/// Agent process error type.
#[derive(Debug, Error)]
pub enum AgentProcessError {
    /// Failed to spawn the assistant process.
    #[error("failed to spawn assistant process: {0}")]
    Spawn(#[from] exec_ops::ExecError),

    /// The child was spawned without a required pipe.
    #[error("assistant process has no {0} pipe")]
    MissingPipe(&'static str),

    /// Failed to write a request frame to the process stdin.
    #[error("failed to write request frame: {0}")]
    Write(#[from] std::io::Error),

    /// JSON encoding error for a request frame.
    #[error("failed to encode request frame: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Result type for agent process operations.
pub type AgentProcessResult<T> = Result<T, AgentProcessError>;
