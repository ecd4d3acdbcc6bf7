//! Error types for git operations.

use thiserror::Error;

/// Git operations error type.
#[derive(Debug, Error)]
pub enum GitOpsError {
    /// The path is not a git repository or cannot be opened.
    #[error("failed to open repository at {path}: {detail}")]
    OpenFailed { path: String, detail: String },

    /// A libgit2 query failed.
    #[error("git operation failed: {0}")]
    Git(#[from] git2::Error),
}

/// Result type for git operations.
pub type GitOpsResult<T> = Result<T, GitOpsError>;
