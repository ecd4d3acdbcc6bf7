//! In-memory store implementation.
//!
//! Backs the daemon when no durable store is wired in, and every test
//! in the workspace. Collections are plain vectors guarded by one
//! mutex; all listings preserve insertion order, which is what gives
//! sessions their creation-order guarantee.

use crate::error::{EngineError, EngineResult};
use crate::ids::{CommandId, LocationId, MessageId, ProjectId, SessionId, ThreadId};
use crate::store::{
    NewLocation, NewMessage, NewProject, NewProjectCommand, NewSession, NewThread, ThreadReader,
    ThreadWriter,
};
use crate::types::{
    Message, Project, ProjectCommand, RepoLocation, Session, Thread, ThreadStatus,
};
use chrono::Utc;
use std::sync::Mutex;

#[derive(Default)]
struct Inner {
    projects: Vec<Project>,
    locations: Vec<RepoLocation>,
    threads: Vec<Thread>,
    sessions: Vec<Session>,
    messages: Vec<Message>,
    commands: Vec<ProjectCommand>,
}

/// Thread-safe in-memory implementation of the storage traits.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> EngineResult<std::sync::MutexGuard<'_, Inner>> {
        self.inner
            .lock()
            .map_err(|_| EngineError::Storage("store mutex poisoned".to_string()))
    }
}

impl ThreadReader for MemoryStore {
    fn get_project(&self, id: &ProjectId) -> EngineResult<Option<Project>> {
        Ok(self.lock()?.projects.iter().find(|p| &p.id == id).cloned())
    }

    fn list_projects(&self) -> EngineResult<Vec<Project>> {
        Ok(self.lock()?.projects.clone())
    }

    fn get_location(&self, id: &LocationId) -> EngineResult<Option<RepoLocation>> {
        Ok(self.lock()?.locations.iter().find(|l| &l.id == id).cloned())
    }

    fn list_locations(&self, project: &ProjectId) -> EngineResult<Vec<RepoLocation>> {
        Ok(self
            .lock()?
            .locations
            .iter()
            .filter(|l| &l.project_id == project)
            .cloned()
            .collect())
    }

    fn get_thread(&self, id: &ThreadId) -> EngineResult<Option<Thread>> {
        Ok(self.lock()?.threads.iter().find(|t| &t.id == id).cloned())
    }

    fn list_threads(&self, project: &ProjectId) -> EngineResult<Vec<Thread>> {
        Ok(self
            .lock()?
            .threads
            .iter()
            .filter(|t| &t.project_id == project)
            .cloned()
            .collect())
    }

    fn get_session(&self, id: &SessionId) -> EngineResult<Option<Session>> {
        Ok(self.lock()?.sessions.iter().find(|s| &s.id == id).cloned())
    }

    fn list_sessions(&self, thread: &ThreadId) -> EngineResult<Vec<Session>> {
        Ok(self
            .lock()?
            .sessions
            .iter()
            .filter(|s| &s.thread_id == thread)
            .cloned()
            .collect())
    }

    fn list_messages(&self, session: &SessionId) -> EngineResult<Vec<Message>> {
        Ok(self
            .lock()?
            .messages
            .iter()
            .filter(|m| &m.session_id == session)
            .cloned()
            .collect())
    }

    fn get_command(&self, id: &CommandId) -> EngineResult<Option<ProjectCommand>> {
        Ok(self.lock()?.commands.iter().find(|c| &c.id == id).cloned())
    }

    fn list_commands(&self, project: &ProjectId) -> EngineResult<Vec<ProjectCommand>> {
        Ok(self
            .lock()?
            .commands
            .iter()
            .filter(|c| &c.project_id == project)
            .cloned()
            .collect())
    }
}

impl ThreadWriter for MemoryStore {
    fn create_project(&self, new: NewProject) -> EngineResult<Project> {
        let project = Project {
            id: ProjectId::new(),
            name: new.name,
            remote_url: new.remote_url,
            created_at: Utc::now(),
        };
        self.lock()?.projects.push(project.clone());
        Ok(project)
    }

    fn rename_project(&self, id: &ProjectId, name: &str) -> EngineResult<()> {
        let mut inner = self.lock()?;
        let project = inner
            .projects
            .iter_mut()
            .find(|p| &p.id == id)
            .ok_or_else(|| EngineError::NotFound(format!("project {id}")))?;
        project.name = name.to_string();
        Ok(())
    }

    fn delete_project(&self, id: &ProjectId) -> EngineResult<()> {
        let mut inner = self.lock()?;
        let existed = inner.projects.iter().any(|p| &p.id == id);
        if !existed {
            return Err(EngineError::NotFound(format!("project {id}")));
        }

        let thread_ids: Vec<ThreadId> = inner
            .threads
            .iter()
            .filter(|t| &t.project_id == id)
            .map(|t| t.id.clone())
            .collect();
        let session_ids: Vec<SessionId> = inner
            .sessions
            .iter()
            .filter(|s| thread_ids.contains(&s.thread_id))
            .map(|s| s.id.clone())
            .collect();

        inner.projects.retain(|p| &p.id != id);
        inner.locations.retain(|l| &l.project_id != id);
        inner.commands.retain(|c| &c.project_id != id);
        inner.threads.retain(|t| &t.project_id != id);
        inner.sessions.retain(|s| !thread_ids.contains(&s.thread_id));
        inner
            .messages
            .retain(|m| !session_ids.contains(&m.session_id));
        Ok(())
    }

    fn create_location(&self, new: NewLocation) -> EngineResult<RepoLocation> {
        let location = RepoLocation {
            id: LocationId::new(),
            project_id: new.project_id,
            label: new.label,
            connection: new.connection,
            path: new.path,
            ssh: new.ssh,
            wsl: new.wsl,
        };
        self.lock()?.locations.push(location.clone());
        Ok(location)
    }

    fn update_location(&self, location: RepoLocation) -> EngineResult<()> {
        let mut inner = self.lock()?;
        let slot = inner
            .locations
            .iter_mut()
            .find(|l| l.id == location.id)
            .ok_or_else(|| EngineError::NotFound(format!("location {}", location.id)))?;
        *slot = location;
        Ok(())
    }

    fn delete_location(&self, id: &LocationId) -> EngineResult<()> {
        let mut inner = self.lock()?;
        let before = inner.locations.len();
        inner.locations.retain(|l| &l.id != id);
        if inner.locations.len() == before {
            return Err(EngineError::NotFound(format!("location {id}")));
        }
        Ok(())
    }

    fn create_thread(&self, new: NewThread) -> EngineResult<Thread> {
        let thread = Thread {
            id: ThreadId::new(),
            project_id: new.project_id,
            location_id: new.location_id,
            name: new.name,
            provider: new.provider,
            model: new.model,
            status: ThreadStatus::Idle,
            use_wsl: new.use_wsl,
            wsl_distro: new.wsl_distro,
            has_messages: false,
            error_detail: None,
            created_at: Utc::now(),
        };
        self.lock()?.threads.push(thread.clone());
        Ok(thread)
    }

    fn delete_thread(&self, id: &ThreadId) -> EngineResult<()> {
        let mut inner = self.lock()?;
        let existed = inner.threads.iter().any(|t| &t.id == id);
        if !existed {
            return Err(EngineError::NotFound(format!("thread {id}")));
        }

        let session_ids: Vec<SessionId> = inner
            .sessions
            .iter()
            .filter(|s| &s.thread_id == id)
            .map(|s| s.id.clone())
            .collect();

        inner.threads.retain(|t| &t.id != id);
        inner.sessions.retain(|s| &s.thread_id != id);
        inner
            .messages
            .retain(|m| !session_ids.contains(&m.session_id));
        Ok(())
    }

    fn update_thread_status(
        &self,
        id: &ThreadId,
        status: ThreadStatus,
        error_detail: Option<String>,
    ) -> EngineResult<()> {
        let mut inner = self.lock()?;
        let thread = inner
            .threads
            .iter_mut()
            .find(|t| &t.id == id)
            .ok_or_else(|| EngineError::NotFound(format!("thread {id}")))?;
        thread.status = status;
        thread.error_detail = error_detail;
        Ok(())
    }

    fn set_thread_wsl(
        &self,
        id: &ThreadId,
        use_wsl: bool,
        wsl_distro: Option<String>,
    ) -> EngineResult<()> {
        let mut inner = self.lock()?;
        let thread = inner
            .threads
            .iter_mut()
            .find(|t| &t.id == id)
            .ok_or_else(|| EngineError::NotFound(format!("thread {id}")))?;
        if thread.has_messages {
            return Err(EngineError::InvalidState(
                "WSL settings are locked once a thread has messages".to_string(),
            ));
        }
        thread.use_wsl = use_wsl;
        thread.wsl_distro = wsl_distro;
        Ok(())
    }

    fn create_session(&self, new: NewSession) -> EngineResult<Session> {
        let mut inner = self.lock()?;
        if !inner.threads.iter().any(|t| t.id == new.thread_id) {
            return Err(EngineError::NotFound(format!("thread {}", new.thread_id)));
        }
        let session = Session {
            id: SessionId::new(),
            thread_id: new.thread_id,
            name: new.name,
            agent_session_id: None,
            created_at: Utc::now(),
        };
        inner.sessions.push(session.clone());
        Ok(session)
    }

    fn delete_session(&self, id: &SessionId) -> EngineResult<()> {
        let mut inner = self.lock()?;
        let before = inner.sessions.len();
        inner.sessions.retain(|s| &s.id != id);
        if inner.sessions.len() == before {
            return Err(EngineError::NotFound(format!("session {id}")));
        }
        inner.messages.retain(|m| &m.session_id != id);
        Ok(())
    }

    fn set_agent_session_id(&self, id: &SessionId, agent_session_id: &str) -> EngineResult<()> {
        let mut inner = self.lock()?;
        let session = inner
            .sessions
            .iter_mut()
            .find(|s| &s.id == id)
            .ok_or_else(|| EngineError::NotFound(format!("session {id}")))?;
        session.agent_session_id = Some(agent_session_id.to_string());
        Ok(())
    }

    fn append_message(&self, new: NewMessage) -> EngineResult<Message> {
        let mut inner = self.lock()?;
        let thread_id = inner
            .sessions
            .iter()
            .find(|s| s.id == new.session_id)
            .map(|s| s.thread_id.clone())
            .ok_or_else(|| EngineError::NotFound(format!("session {}", new.session_id)))?;

        let message = Message {
            id: MessageId::new(),
            session_id: new.session_id,
            role: new.role,
            content: new.content,
            token_usage: new.token_usage,
            created_at: Utc::now(),
        };
        inner.messages.push(message.clone());

        if let Some(thread) = inner.threads.iter_mut().find(|t| t.id == thread_id) {
            thread.has_messages = true;
        }
        Ok(message)
    }

    fn create_command(&self, new: NewProjectCommand) -> EngineResult<ProjectCommand> {
        let command = ProjectCommand {
            id: CommandId::new(),
            project_id: new.project_id,
            name: new.name,
            command: new.command,
            cwd: new.cwd,
        };
        self.lock()?.commands.push(command.clone());
        Ok(command)
    }

    fn delete_command(&self, id: &CommandId) -> EngineResult<()> {
        let mut inner = self.lock()?;
        let before = inner.commands.len();
        inner.commands.retain(|c| &c.id != id);
        if inner.commands.len() == before {
            return Err(EngineError::NotFound(format!("command {id}")));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ConnectionType, Role};

    fn seed_thread(store: &MemoryStore) -> (Project, Thread, Session) {
        let project = store
            .create_project(NewProject {
                name: "demo".to_string(),
                remote_url: None,
            })
            .unwrap();
        let location = store
            .create_location(NewLocation {
                project_id: project.id.clone(),
                label: "main checkout".to_string(),
                connection: ConnectionType::Local,
                path: "/tmp/demo".to_string(),
                ssh: None,
                wsl: None,
            })
            .unwrap();
        let thread = store
            .create_thread(NewThread {
                project_id: project.id.clone(),
                location_id: location.id,
                name: "fix build".to_string(),
                provider: "claude".to_string(),
                model: "sonnet".to_string(),
                use_wsl: false,
                wsl_distro: None,
            })
            .unwrap();
        let session = store
            .create_session(NewSession {
                thread_id: thread.id.clone(),
                name: "main".to_string(),
            })
            .unwrap();
        (project, thread, session)
    }

    #[test]
    fn sessions_list_in_creation_order() {
        let store = MemoryStore::new();
        let (_, thread, first) = seed_thread(&store);
        let second = store
            .create_session(NewSession {
                thread_id: thread.id.clone(),
                name: "alt".to_string(),
            })
            .unwrap();

        let sessions = store.list_sessions(&thread.id).unwrap();
        assert_eq!(
            sessions.iter().map(|s| s.id.clone()).collect::<Vec<_>>(),
            vec![first.id, second.id]
        );
    }

    #[test]
    fn append_message_marks_thread_has_messages() {
        let store = MemoryStore::new();
        let (_, thread, session) = seed_thread(&store);
        assert!(!store.get_thread(&thread.id).unwrap().unwrap().has_messages);

        store
            .append_message(NewMessage {
                session_id: session.id,
                role: Role::User,
                content: "hello".to_string(),
                token_usage: None,
            })
            .unwrap();

        assert!(store.get_thread(&thread.id).unwrap().unwrap().has_messages);
    }

    #[test]
    fn wsl_settings_locked_after_first_message() {
        let store = MemoryStore::new();
        let (_, thread, session) = seed_thread(&store);

        store
            .set_thread_wsl(&thread.id, true, Some("Ubuntu".to_string()))
            .unwrap();

        store
            .append_message(NewMessage {
                session_id: session.id,
                role: Role::User,
                content: "hello".to_string(),
                token_usage: None,
            })
            .unwrap();

        let err = store
            .set_thread_wsl(&thread.id, false, None)
            .unwrap_err();
        assert!(matches!(err, EngineError::InvalidState(_)));

        // No mutation happened.
        let thread = store.get_thread(&thread.id).unwrap().unwrap();
        assert!(thread.use_wsl);
        assert_eq!(thread.wsl_distro.as_deref(), Some("Ubuntu"));
    }

    #[test]
    fn delete_thread_cascades_to_sessions_and_messages() {
        let store = MemoryStore::new();
        let (_, thread, session) = seed_thread(&store);
        store
            .append_message(NewMessage {
                session_id: session.id.clone(),
                role: Role::User,
                content: "hello".to_string(),
                token_usage: None,
            })
            .unwrap();

        store.delete_thread(&thread.id).unwrap();

        assert!(store.get_session(&session.id).unwrap().is_none());
        assert!(store.list_messages(&session.id).unwrap().is_empty());
    }

    #[test]
    fn delete_project_cascades_everything() {
        let store = MemoryStore::new();
        let (project, thread, session) = seed_thread(&store);
        store
            .create_command(NewProjectCommand {
                project_id: project.id.clone(),
                name: "build".to_string(),
                command: "cargo build".to_string(),
                cwd: None,
            })
            .unwrap();

        store.delete_project(&project.id).unwrap();

        assert!(store.get_thread(&thread.id).unwrap().is_none());
        assert!(store.get_session(&session.id).unwrap().is_none());
        assert!(store.list_commands(&project.id).unwrap().is_empty());
        assert!(store.list_locations(&project.id).unwrap().is_empty());
    }

    #[test]
    fn delete_missing_records_report_not_found() {
        let store = MemoryStore::new();
        assert!(matches!(
            store.delete_thread(&ThreadId::new()).unwrap_err(),
            EngineError::NotFound(_)
        ));
        assert!(matches!(
            store.delete_command(&CommandId::new()).unwrap_err(),
            EngineError::NotFound(_)
        ));
    }
}
