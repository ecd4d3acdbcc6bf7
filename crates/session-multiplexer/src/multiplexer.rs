//! Active-session tracking per thread.

use crate::import::{parse_transcript, ImportParams};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tiller_domain::{
    EngineError, EngineResult, NewMessage, NewSession, NewThread, Session, SessionId, Thread,
    ThreadId, ThreadReader, ThreadWriter,
};
use tracing::{debug, info};

/// Maintains the set of sessions per thread and which one is active.
pub struct SessionMultiplexer<S> {
    store: Arc<S>,
    active: Mutex<HashMap<ThreadId, SessionId>>,
}

impl<S: ThreadReader + ThreadWriter> SessionMultiplexer<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self {
            store,
            active: Mutex::new(HashMap::new()),
        }
    }

    /// The active session for a thread, creating a first session if
    /// the thread has none yet.
    pub fn ensure_active(&self, thread_id: &ThreadId) -> EngineResult<Session> {
        if let Some(session_id) = self.active_id(thread_id) {
            if let Some(session) = self.store.get_session(&session_id)? {
                return Ok(session);
            }
        }

        // Fall back to the first existing session, then to a new one.
        let session = match self.store.list_sessions(thread_id)?.into_iter().next() {
            Some(session) => session,
            None => {
                debug!(thread_id = %thread_id, "Creating initial session");
                self.store.create_session(NewSession {
                    thread_id: thread_id.clone(),
                    name: "main".to_string(),
                })?
            }
        };

        self.set_active(thread_id, &session.id);
        Ok(session)
    }

    /// The active session ID, if one has been established.
    pub fn active_id(&self, thread_id: &ThreadId) -> Option<SessionId> {
        self.active.lock().unwrap().get(thread_id).cloned()
    }

    /// Point the thread at another of its sessions.
    ///
    /// Fails if the session does not exist or belongs to a different
    /// thread. The not-running precondition is enforced by the caller,
    /// which owns thread lifecycle state.
    pub fn switch(&self, thread_id: &ThreadId, session_id: &SessionId) -> EngineResult<()> {
        let session = self
            .store
            .get_session(session_id)?
            .ok_or_else(|| EngineError::NotFound(format!("session {session_id}")))?;
        if &session.thread_id != thread_id {
            return Err(EngineError::InvalidState(format!(
                "session {session_id} does not belong to thread {thread_id}"
            )));
        }

        self.set_active(thread_id, session_id);
        info!(thread_id = %thread_id, session_id = %session_id, "Switched active session");
        Ok(())
    }

    /// Create a new session on the thread and make it active.
    pub fn create_and_activate(
        &self,
        thread_id: &ThreadId,
        name: impl Into<String>,
    ) -> EngineResult<Session> {
        let session = self.store.create_session(NewSession {
            thread_id: thread_id.clone(),
            name: name.into(),
        })?;
        self.set_active(thread_id, &session.id);
        Ok(session)
    }

    /// Import an external transcript file as a new thread.
    ///
    /// The transcript is parsed fully before anything is written, so a
    /// malformed file leaves no partial thread behind.
    pub fn import(&self, params: ImportParams) -> EngineResult<Thread> {
        let raw = std::fs::read_to_string(&params.transcript_path)
            .map_err(|e| EngineError::Import(format!("{}: {e}", params.transcript_path)))?;
        let entries = parse_transcript(&raw)?;

        let thread = self.store.create_thread(NewThread {
            project_id: params.project_id,
            location_id: params.location_id,
            name: params.name.clone(),
            provider: params.provider,
            model: params.model,
            use_wsl: false,
            wsl_distro: None,
        })?;
        let session = self.store.create_session(NewSession {
            thread_id: thread.id.clone(),
            name: params.name,
        })?;

        for entry in entries {
            self.store.append_message(NewMessage {
                session_id: session.id.clone(),
                role: entry.role,
                content: entry.content,
                token_usage: None,
            })?;
        }

        self.set_active(&thread.id, &session.id);
        info!(thread_id = %thread.id, "Imported transcript as new thread");

        // The store marked has_messages as entries were appended.
        self.store
            .get_thread(&thread.id)?
            .ok_or_else(|| EngineError::NotFound(format!("thread {}", thread.id)))
    }

    /// Forget the active pointer when a thread is deleted.
    pub fn remove_thread(&self, thread_id: &ThreadId) {
        self.active.lock().unwrap().remove(thread_id);
    }

    fn set_active(&self, thread_id: &ThreadId, session_id: &SessionId) {
        self.active
            .lock()
            .unwrap()
            .insert(thread_id.clone(), session_id.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tiller_domain::{ConnectionType, MemoryStore, NewLocation, NewProject, Role};

    fn fixture() -> (Arc<MemoryStore>, SessionMultiplexer<MemoryStore>, Thread) {
        let store = Arc::new(MemoryStore::new());
        let project = store
            .create_project(NewProject {
                name: "demo".to_string(),
                remote_url: None,
            })
            .unwrap();
        let location = store
            .create_location(NewLocation {
                project_id: project.id.clone(),
                label: "main".to_string(),
                connection: ConnectionType::Local,
                path: "/tmp/demo".to_string(),
                ssh: None,
                wsl: None,
            })
            .unwrap();
        let thread = store
            .create_thread(NewThread {
                project_id: project.id,
                location_id: location.id,
                name: "fix build".to_string(),
                provider: "claude".to_string(),
                model: "sonnet".to_string(),
                use_wsl: false,
                wsl_distro: None,
            })
            .unwrap();
        let mux = SessionMultiplexer::new(store.clone());
        (store, mux, thread)
    }

    #[test]
    fn ensure_active_creates_first_session() {
        let (store, mux, thread) = fixture();

        let session = mux.ensure_active(&thread.id).unwrap();
        assert_eq!(session.name, "main");
        assert_eq!(mux.active_id(&thread.id), Some(session.id.clone()));

        // A second call reuses the same session.
        let again = mux.ensure_active(&thread.id).unwrap();
        assert_eq!(again.id, session.id);
        assert_eq!(store.list_sessions(&thread.id).unwrap().len(), 1);
    }

    #[test]
    fn switch_updates_active_pointer() {
        let (_store, mux, thread) = fixture();
        let first = mux.ensure_active(&thread.id).unwrap();
        let second = mux.create_and_activate(&thread.id, "alt").unwrap();
        assert_eq!(mux.active_id(&thread.id), Some(second.id.clone()));

        mux.switch(&thread.id, &first.id).unwrap();
        assert_eq!(mux.active_id(&thread.id), Some(first.id));
    }

    #[test]
    fn switch_rejects_foreign_session() {
        let (store, mux, thread) = fixture();
        mux.ensure_active(&thread.id).unwrap();

        let other_thread = store
            .create_thread(NewThread {
                project_id: thread.project_id.clone(),
                location_id: thread.location_id.clone(),
                name: "other".to_string(),
                provider: "claude".to_string(),
                model: "sonnet".to_string(),
                use_wsl: false,
                wsl_distro: None,
            })
            .unwrap();
        let foreign = store
            .create_session(NewSession {
                thread_id: other_thread.id,
                name: "main".to_string(),
            })
            .unwrap();

        let err = mux.switch(&thread.id, &foreign.id).unwrap_err();
        assert!(matches!(err, EngineError::InvalidState(_)));
    }

    #[test]
    fn switch_rejects_unknown_session() {
        let (_store, mux, thread) = fixture();
        let err = mux.switch(&thread.id, &SessionId::new()).unwrap_err();
        assert!(matches!(err, EngineError::NotFound(_)));
    }

    #[test]
    fn import_seeds_thread_from_transcript() {
        let (store, mux, thread) = fixture();
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "# exported conversation").unwrap();
        writeln!(file, r#"{{"role":"user","content":"add tests"}}"#).unwrap();
        writeln!(file, r#"{{"role":"assistant","content":"done"}}"#).unwrap();

        let imported = mux
            .import(ImportParams {
                project_id: thread.project_id.clone(),
                location_id: thread.location_id.clone(),
                transcript_path: file.path().to_string_lossy().into_owned(),
                name: "imported".to_string(),
                provider: "claude".to_string(),
                model: "sonnet".to_string(),
            })
            .unwrap();

        assert!(imported.has_messages);
        let sessions = store.list_sessions(&imported.id).unwrap();
        assert_eq!(sessions.len(), 1);
        let messages = store.list_messages(&sessions[0].id).unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, Role::User);
        assert_eq!(messages[1].content, "done");
    }

    #[test]
    fn malformed_transcript_leaves_no_partial_thread() {
        let (store, mux, thread) = fixture();
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, r#"{{"role":"user","content":"ok"}}"#).unwrap();
        writeln!(file, "not json at all").unwrap();

        let threads_before = store.list_threads(&thread.project_id).unwrap().len();
        let err = mux
            .import(ImportParams {
                project_id: thread.project_id.clone(),
                location_id: thread.location_id.clone(),
                transcript_path: file.path().to_string_lossy().into_owned(),
                name: "imported".to_string(),
                provider: "claude".to_string(),
                model: "sonnet".to_string(),
            })
            .unwrap_err();

        assert!(matches!(err, EngineError::Import(_)));
        assert_eq!(
            store.list_threads(&thread.project_id).unwrap().len(),
            threads_before
        );
    }

    #[test]
    fn import_missing_file_fails_cleanly() {
        let (_store, mux, thread) = fixture();
        let err = mux
            .import(ImportParams {
                project_id: thread.project_id.clone(),
                location_id: thread.location_id.clone(),
                transcript_path: "/no/such/transcript.jsonl".to_string(),
                name: "imported".to_string(),
                provider: "claude".to_string(),
                model: "sonnet".to_string(),
            })
            .unwrap_err();
        assert!(matches!(err, EngineError::Import(_)));
    }
}
