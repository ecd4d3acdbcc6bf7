//! Engine-boundary error taxonomy.
//!
//! Every fault inside the engine is translated into one of these kinds
//! before crossing the orchestrator or IPC boundary. No raw transport
//! or process errors escape untranslated.

use crate::ids::ThreadId;
use thiserror::Error;

/// The error type visible at the engine boundary.
#[derive(Debug, Error)]
pub enum EngineError {
    /// SSH/WSL target unreachable. Surfaced to the user, never
    /// silently retried.
    #[error("connection failed: {0}")]
    Connection(String),

    /// A supervisor already exists for this thread.
    #[error("thread {0} is already running")]
    AlreadyRunning(ThreadId),

    /// The operation requires a running thread.
    #[error("thread {0} is not running")]
    NotRunning(ThreadId),

    /// Caller misuse of the lifecycle or approval state machine.
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// A clarification question is awaiting an answer; `send` must go
    /// through the answer path instead.
    #[error("thread {0} has an unanswered question")]
    QuestionPending(ThreadId),

    /// The submitted answer is missing required keys.
    #[error("answer missing required keys: {}", missing.join(", "))]
    IncompleteAnswer { missing: Vec<String> },

    /// Transcript import failed; no partial thread was created.
    #[error("transcript import failed: {0}")]
    Import(String),

    /// A referenced record does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// Fault in the storage collaborator.
    #[error("storage error: {0}")]
    Storage(String),

    /// Subprocess fault (spawn failure, crash) with captured detail.
    #[error("process error: {0}")]
    Process(String),
}

impl EngineError {
    /// Stable machine-readable code for the IPC boundary.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Connection(_) => "connection_error",
            Self::AlreadyRunning(_) => "already_running",
            Self::NotRunning(_) => "not_running",
            Self::InvalidState(_) => "invalid_state",
            Self::QuestionPending(_) => "question_pending",
            Self::IncompleteAnswer { .. } => "incomplete_answer",
            Self::Import(_) => "import_error",
            Self::NotFound(_) => "not_found",
            Self::Storage(_) => "storage_error",
            Self::Process(_) => "process_error",
        }
    }
}

/// Result alias for engine-boundary operations.
pub type EngineResult<T> = Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_stable() {
        assert_eq!(
            EngineError::Connection("host down".into()).code(),
            "connection_error"
        );
        assert_eq!(
            EngineError::AlreadyRunning(ThreadId::from_string("t1")).code(),
            "already_running"
        );
        assert_eq!(
            EngineError::IncompleteAnswer { missing: vec![] }.code(),
            "incomplete_answer"
        );
    }

    #[test]
    fn incomplete_answer_lists_missing_keys() {
        let err = EngineError::IncompleteAnswer {
            missing: vec!["database".to_string(), "version".to_string()],
        };
        assert_eq!(
            err.to_string(),
            "answer missing required keys: database, version"
        );
    }
}
