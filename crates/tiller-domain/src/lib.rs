//! Core data model for the Tiller daemon.
//!
//! This crate defines the records the engine operates on (projects,
//! repo locations, threads, sessions, messages, project commands), the
//! engine-boundary error taxonomy, and the narrow storage traits the
//! rest of the workspace consumes. Durable persistence lives behind
//! [`ThreadReader`]/[`ThreadWriter`]; the in-memory [`MemoryStore`]
//! implements both for the daemon and for tests.

mod error;
mod ids;
mod memory;
mod store;
mod types;

pub use error::{EngineError, EngineResult};
pub use ids::{CommandId, LocationId, MessageId, ProjectId, QuestionId, SessionId, ThreadId};
pub use memory::MemoryStore;
pub use store::{
    NewLocation, NewMessage, NewProject, NewProjectCommand, NewSession, NewThread, ThreadReader,
    ThreadWriter,
};
pub use types::{
    CommandLogLine, CommandStatus, ConnectionType, GitStatusSnapshot, LogStream, Message,
    PlanState, Project, ProjectCommand, Question, QuestionOption, RepoLocation, Role, Session,
    SshConfig, Thread, ThreadStatus, TokenUsage, WslConfig,
};
