//! Error types for command supervision.

use thiserror::Error;
use tiller_domain::CommandId;

/// Command runner error type.
#[derive(Debug, Error)]
pub enum CommandError {
    /// The command already has a live supervisor.
    #[error("command {0} is already running")]
    AlreadyRunning(CommandId),

    /// Failed to spawn the command process.
    #[error("failed to spawn command: {0}")]
    Spawn(#[from] exec_ops::ExecError),
}

/// Result type for command runner operations.
pub type CommandResult<T> = Result<T, CommandError>;
