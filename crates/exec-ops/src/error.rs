//! Error types for execution contexts.

use thiserror::Error;

/// Execution context error type.
#[derive(Debug, Error)]
pub enum ExecError {
    /// The location is missing the config its connection type needs.
    #[error("location is missing {0} configuration")]
    MissingConfig(&'static str),

    /// The SSH/WSL target is unreachable.
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    /// Failed to spawn the child process.
    #[error("failed to spawn process: {0}")]
    Spawn(#[from] std::io::Error),

    /// The child was spawned without the requested pipe.
    #[error("child process has no {0} pipe")]
    MissingPipe(&'static str),
}

/// Result type for execution context operations.
pub type ExecResult<T> = Result<T, ExecError>;
