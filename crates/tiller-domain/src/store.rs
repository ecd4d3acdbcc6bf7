//! Storage traits consumed by the engine.
//!
//! Durable persistence is an external collaborator; the engine only
//! depends on these narrow read/write traits. The daemon ships
//! [`crate::MemoryStore`] as the default implementation.

use crate::error::EngineResult;
use crate::ids::{CommandId, LocationId, ProjectId, SessionId, ThreadId};
use crate::types::{
    ConnectionType, Message, Project, ProjectCommand, RepoLocation, Role, Session, SshConfig,
    Thread, ThreadStatus, TokenUsage, WslConfig,
};

/// Parameters for creating a project.
#[derive(Debug, Clone)]
pub struct NewProject {
    pub name: String,
    pub remote_url: Option<String>,
}

/// Parameters for creating a repo location.
#[derive(Debug, Clone)]
pub struct NewLocation {
    pub project_id: ProjectId,
    pub label: String,
    pub connection: ConnectionType,
    pub path: String,
    pub ssh: Option<SshConfig>,
    pub wsl: Option<WslConfig>,
}

/// Parameters for creating a thread.
#[derive(Debug, Clone)]
pub struct NewThread {
    pub project_id: ProjectId,
    pub location_id: LocationId,
    pub name: String,
    pub provider: String,
    pub model: String,
    pub use_wsl: bool,
    pub wsl_distro: Option<String>,
}

/// Parameters for creating a session.
#[derive(Debug, Clone)]
pub struct NewSession {
    pub thread_id: ThreadId,
    pub name: String,
}

/// Parameters for appending a message.
///
/// The ID and timestamp are assigned by the store; callers never
/// provide them.
#[derive(Debug, Clone)]
pub struct NewMessage {
    pub session_id: SessionId,
    pub role: Role,
    pub content: String,
    pub token_usage: Option<TokenUsage>,
}

/// Parameters for creating a project command.
#[derive(Debug, Clone)]
pub struct NewProjectCommand {
    pub project_id: ProjectId,
    pub name: String,
    pub command: String,
    pub cwd: Option<String>,
}

/// Read side of the store.
pub trait ThreadReader: Send + Sync {
    fn get_project(&self, id: &ProjectId) -> EngineResult<Option<Project>>;
    fn list_projects(&self) -> EngineResult<Vec<Project>>;
    fn get_location(&self, id: &LocationId) -> EngineResult<Option<RepoLocation>>;
    fn list_locations(&self, project: &ProjectId) -> EngineResult<Vec<RepoLocation>>;
    fn get_thread(&self, id: &ThreadId) -> EngineResult<Option<Thread>>;
    fn list_threads(&self, project: &ProjectId) -> EngineResult<Vec<Thread>>;
    fn get_session(&self, id: &SessionId) -> EngineResult<Option<Session>>;
    /// Sessions in creation order.
    fn list_sessions(&self, thread: &ThreadId) -> EngineResult<Vec<Session>>;
    /// Messages in append order.
    fn list_messages(&self, session: &SessionId) -> EngineResult<Vec<Message>>;
    fn get_command(&self, id: &CommandId) -> EngineResult<Option<ProjectCommand>>;
    fn list_commands(&self, project: &ProjectId) -> EngineResult<Vec<ProjectCommand>>;
}

/// Write side of the store.
pub trait ThreadWriter: Send + Sync {
    fn create_project(&self, new: NewProject) -> EngineResult<Project>;
    fn rename_project(&self, id: &ProjectId, name: &str) -> EngineResult<()>;
    /// Cascades to the project's locations, threads, sessions,
    /// messages, and commands.
    fn delete_project(&self, id: &ProjectId) -> EngineResult<()>;

    fn create_location(&self, new: NewLocation) -> EngineResult<RepoLocation>;
    fn update_location(&self, location: RepoLocation) -> EngineResult<()>;
    fn delete_location(&self, id: &LocationId) -> EngineResult<()>;

    fn create_thread(&self, new: NewThread) -> EngineResult<Thread>;
    /// Cascades to the thread's sessions and messages.
    fn delete_thread(&self, id: &ThreadId) -> EngineResult<()>;
    fn update_thread_status(
        &self,
        id: &ThreadId,
        status: ThreadStatus,
        error_detail: Option<String>,
    ) -> EngineResult<()>;
    /// Rejected with `InvalidState` once the thread has messages.
    fn set_thread_wsl(
        &self,
        id: &ThreadId,
        use_wsl: bool,
        wsl_distro: Option<String>,
    ) -> EngineResult<()>;

    fn create_session(&self, new: NewSession) -> EngineResult<Session>;
    fn delete_session(&self, id: &SessionId) -> EngineResult<()>;
    /// Records the backing CLI's resume token on a session.
    fn set_agent_session_id(&self, id: &SessionId, agent_session_id: &str) -> EngineResult<()>;

    /// Appends a message and marks the owning thread `has_messages`.
    fn append_message(&self, new: NewMessage) -> EngineResult<Message>;

    fn create_command(&self, new: NewProjectCommand) -> EngineResult<ProjectCommand>;
    fn delete_command(&self, id: &CommandId) -> EngineResult<()>;
}
