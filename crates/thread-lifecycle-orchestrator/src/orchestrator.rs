//! The thread orchestration engine.

use crate::pump::{self, PumpDeps};
use crate::registry::{RunningThread, SupervisorRegistry};
use agent_process_manager::{AgentConfig, AgentProcess};
use approval_flow::ApprovalFlow;
use exec_ops::ExecutionContext;
use session_multiplexer::{ImportParams, SessionMultiplexer};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use thread_event_router::{EventRouter, ThreadEvent, ThreadFrame, UsageTracker};
use tiller_domain::{
    EngineError, EngineResult, NewMessage, Question, RepoLocation, Role, Session, SessionId,
    Thread, ThreadId, ThreadReader, ThreadStatus, ThreadWriter, TokenUsage,
};
use tokio::sync::{broadcast, watch};
use tracing::{info, warn};

/// Options for a send operation.
#[derive(Debug, Clone, Copy, Default)]
pub struct SendOptions {
    /// Ask the assistant to answer with a proposed plan instead of
    /// acting directly.
    pub plan_mode: bool,
}

/// The engine behind the thread command surface.
///
/// Owns the supervisor registry, the event router, the session
/// multiplexer, and per-thread approval/question state. All methods
/// translate internal faults into [`EngineError`] before returning.
pub struct ThreadOrchestrator<S> {
    store: Arc<S>,
    registry: SupervisorRegistry,
    router: EventRouter,
    usage: UsageTracker,
    sessions: Arc<SessionMultiplexer<S>>,
    flows: Arc<Mutex<HashMap<ThreadId, Arc<Mutex<ApprovalFlow>>>>>,
}

impl<S> Clone for ThreadOrchestrator<S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            registry: self.registry.clone(),
            router: self.router.clone(),
            usage: self.usage.clone(),
            sessions: self.sessions.clone(),
            flows: self.flows.clone(),
        }
    }
}

impl<S: ThreadReader + ThreadWriter + Send + Sync + 'static> ThreadOrchestrator<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self {
            sessions: Arc::new(SessionMultiplexer::new(store.clone())),
            store,
            registry: SupervisorRegistry::new(),
            router: EventRouter::new(),
            usage: UsageTracker::new(),
            flows: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// The store this engine operates on.
    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// The supervisor registry (read-only view for diagnostics).
    pub fn registry(&self) -> &SupervisorRegistry {
        &self.registry
    }

    /// Subscribe to a thread's ordered event frames.
    pub async fn subscribe(&self, thread_id: &ThreadId) -> broadcast::Receiver<ThreadFrame> {
        self.router.subscribe(thread_id).await
    }

    /// Drop a thread's event channel once unobserved.
    pub async fn unsubscribe_cleanup(&self, thread_id: &ThreadId) {
        self.router.cleanup(thread_id).await;
    }

    /// Current token aggregate for a thread.
    pub fn token_usage(&self, thread_id: &ThreadId) -> TokenUsage {
        self.usage.get(thread_id)
    }

    /// Start a thread's supervisor.
    ///
    /// Fails with `AlreadyRunning` when a supervisor (or a start in
    /// progress) exists for the thread, and with `Connection` when a
    /// remote target is unreachable — in that case no process is
    /// spawned and the slot is released.
    pub async fn start(&self, thread_id: &ThreadId) -> EngineResult<()> {
        self.start_internal(thread_id, None).await
    }

    async fn start_internal(
        &self,
        thread_id: &ThreadId,
        initial_prompt: Option<String>,
    ) -> EngineResult<()> {
        let thread = self
            .store
            .get_thread(thread_id)?
            .ok_or_else(|| EngineError::NotFound(format!("thread {thread_id}")))?;
        let location = self
            .store
            .get_location(&thread.location_id)?
            .ok_or_else(|| EngineError::NotFound(format!("location {}", thread.location_id)))?;

        let context = resolve_context(&thread, &location)?;

        // The mutual-exclusion token. Everything after this must
        // release the slot on failure.
        self.registry.reserve(thread_id)?;

        match self.spawn_supervisor(&thread, context, initial_prompt).await {
            Ok(()) => Ok(()),
            Err(e) => {
                self.registry.release(thread_id);
                Err(e)
            }
        }
    }

    async fn spawn_supervisor(
        &self,
        thread: &Thread,
        context: ExecutionContext,
        initial_prompt: Option<String>,
    ) -> EngineResult<()> {
        // Remote targets fail fast before any process exists. Never
        // retried implicitly; the client re-tests explicitly.
        if !matches!(context, ExecutionContext::Local { .. }) {
            let report = context.test().await;
            if !report.ok {
                return Err(EngineError::Connection(
                    report.error.unwrap_or_else(|| "target unreachable".to_string()),
                ));
            }
        }

        let session = self.sessions.ensure_active(&thread.id)?;

        let mut config = AgentConfig::new(&thread.provider, &thread.model);
        if let Some(prompt) = initial_prompt {
            config = config.with_prompt(prompt);
        }
        if let Some(resume) = &session.agent_session_id {
            config = config.with_resume_session(resume);
        }

        let mut process = AgentProcess::spawn(config, &context)
            .map_err(|e| EngineError::Process(e.to_string()))?;
        let stream = process
            .take_stream()
            .ok_or_else(|| EngineError::Process("event stream unavailable".to_string()))?;
        let writer = process
            .take_writer()
            .ok_or_else(|| EngineError::Process("request writer unavailable".to_string()))?;

        let stop_requested = Arc::new(AtomicBool::new(false));
        let (done_tx, done_rx) = watch::channel(false);

        self.registry.activate(
            &thread.id,
            RunningThread {
                stop_tx: process.stop_sender(),
                stop_requested: stop_requested.clone(),
                writer: Arc::new(tokio::sync::Mutex::new(writer)),
                session_id: session.id.clone(),
                done_rx,
                pid: process.pid(),
            },
        );

        // Fresh run: transient protocol state and the usage aggregate
        // both start over.
        self.flow(&thread.id).lock().unwrap().reset();
        self.usage.reset(&thread.id);

        // Status must be observably Running before any send is
        // accepted, and before the pump can race a terminal
        // transition.
        if let Err(e) = self
            .store
            .update_thread_status(&thread.id, ThreadStatus::Running, None)
        {
            // Reap the orphan before surfacing the storage fault.
            let stop_tx = process.stop_sender();
            tokio::spawn(async move {
                let mut stream = stream;
                let _ = stop_tx.send(());
                while let Some(event) = stream.next().await {
                    if event.is_terminal() {
                        break;
                    }
                }
            });
            return Err(e);
        }

        self.router
            .publish(
                &thread.id,
                ThreadEvent::StatusChanged {
                    status: ThreadStatus::Running,
                    error_detail: None,
                },
            )
            .await;

        let deps = PumpDeps {
            store: self.store.clone(),
            router: self.router.clone(),
            usage: self.usage.clone(),
            flow: self.flow(&thread.id),
            registry: self.registry.clone(),
        };
        let thread_id = thread.id.clone();
        let session_id = session.id;
        tokio::spawn(async move {
            pump::run(stream, thread_id, session_id, deps, stop_requested, done_tx).await;
        });

        info!(thread_id = %thread.id, "Thread supervisor started");
        Ok(())
    }

    /// Stop a thread's supervisor and wait for teardown.
    ///
    /// Idempotent: stopping a thread that is not running, or stopping
    /// twice, is a no-op. If the stop races a natural process exit,
    /// whichever terminal transition lands first is authoritative.
    pub async fn stop(&self, thread_id: &ThreadId) -> EngineResult<()> {
        let Some((stop_tx, stop_requested, mut done_rx)) = self.registry.stop_handles(thread_id)
        else {
            return Ok(());
        };

        stop_requested.store(true, Ordering::SeqCst);
        let _ = stop_tx.send(());

        while !*done_rx.borrow() {
            if done_rx.changed().await.is_err() {
                break;
            }
        }
        Ok(())
    }

    /// Queue a user message into the running assistant process.
    pub async fn send(
        &self,
        thread_id: &ThreadId,
        content: &str,
        options: SendOptions,
    ) -> EngineResult<()> {
        let (writer, session_id) = self
            .registry
            .writer(thread_id)
            .ok_or_else(|| EngineError::NotRunning(thread_id.clone()))?;

        {
            let flow = self.flow(thread_id);
            let mut flow = flow.lock().unwrap();
            if flow.question.pending().is_some() {
                return Err(EngineError::QuestionPending(thread_id.clone()));
            }
            // A new turn supersedes any held plan state.
            flow.plan.reset();
        }

        self.store.append_message(NewMessage {
            session_id,
            role: Role::User,
            content: content.to_string(),
            token_usage: None,
        })?;

        let mut writer = writer.lock().await;
        writer
            .send_user_message(content, options.plan_mode)
            .await
            .map_err(|e| EngineError::Process(e.to_string()))?;
        Ok(())
    }

    /// Approve the proposed plan; the assistant resumes in execute
    /// mode. Only valid in the `Proposed` plan state.
    pub async fn approve_plan(&self, thread_id: &ThreadId) -> EngineResult<()> {
        let (writer, _) = self
            .registry
            .writer(thread_id)
            .ok_or_else(|| EngineError::NotRunning(thread_id.clone()))?;

        {
            let flow = self.flow(thread_id);
            let mut flow = flow.lock().unwrap();
            flow.plan.approve()?;
        }

        let mut writer = writer.lock().await;
        writer
            .send_plan_decision(true)
            .await
            .map_err(|e| EngineError::Process(e.to_string()))?;
        info!(thread_id = %thread_id, "Plan approved");
        Ok(())
    }

    /// Reject the proposed plan; the assistant resumes in discard
    /// mode and the plan state returns to `None`.
    pub async fn reject_plan(&self, thread_id: &ThreadId) -> EngineResult<()> {
        let (writer, _) = self
            .registry
            .writer(thread_id)
            .ok_or_else(|| EngineError::NotRunning(thread_id.clone()))?;

        {
            let flow = self.flow(thread_id);
            let mut flow = flow.lock().unwrap();
            flow.plan.reject()?;
        }

        let mut writer = writer.lock().await;
        writer
            .send_plan_decision(false)
            .await
            .map_err(|e| EngineError::Process(e.to_string()))?;
        info!(thread_id = %thread_id, "Plan rejected");
        Ok(())
    }

    /// Execute the held plan in a fresh session.
    ///
    /// Valid from `Proposed` or `Approved`. Stops the originating
    /// supervisor, creates and activates a new session seeded with the
    /// plan content, and starts a supervisor on it.
    pub async fn execute_plan_in_new_context(&self, thread_id: &ThreadId) -> EngineResult<Session> {
        let plan = {
            let flow = self.flow(thread_id);
            let mut flow = flow.lock().unwrap();
            flow.plan.take_for_new_context()?
        };

        self.stop(thread_id).await?;

        let session = self.sessions.create_and_activate(thread_id, "plan")?;
        self.store.append_message(NewMessage {
            session_id: session.id.clone(),
            role: Role::User,
            content: plan.clone(),
            token_usage: None,
        })?;

        self.start_internal(thread_id, Some(plan)).await?;
        info!(thread_id = %thread_id, session_id = %session.id, "Plan executing in new context");
        Ok(session)
    }

    /// The pending question for a thread, if any.
    pub fn questions(&self, thread_id: &ThreadId) -> Vec<Question> {
        let flow = self.flow(thread_id);
        let flow = flow.lock().unwrap();
        flow.question.pending().cloned().into_iter().collect()
    }

    /// Answer the pending question and forward the answers.
    ///
    /// Fails with `IncompleteAnswer` when required keys are missing;
    /// the question stays pending and nothing is forwarded.
    pub async fn answer_questions(
        &self,
        thread_id: &ThreadId,
        answers: BTreeMap<String, String>,
    ) -> EngineResult<()> {
        let (writer, session_id) = self
            .registry
            .writer(thread_id)
            .ok_or_else(|| EngineError::NotRunning(thread_id.clone()))?;

        let question = {
            let flow = self.flow(thread_id);
            let mut flow = flow.lock().unwrap();
            flow.question.answer(&answers)?
        };

        self.store.append_message(NewMessage {
            session_id,
            role: Role::User,
            content: serde_json::json!({
                "type": "answers",
                "question": question.prompt,
                "answers": answers,
            })
            .to_string(),
            token_usage: None,
        })?;

        let mut writer = writer.lock().await;
        writer
            .send_answers(&answers)
            .await
            .map_err(|e| EngineError::Process(e.to_string()))?;
        info!(thread_id = %thread_id, "Question answered");
        Ok(())
    }

    /// Create a new session on a thread and make it active.
    ///
    /// Like switching, this requires a clean process boundary.
    pub fn create_session(
        &self,
        thread_id: &ThreadId,
        name: impl Into<String>,
    ) -> EngineResult<Session> {
        if self.registry.is_running(thread_id) {
            return Err(EngineError::InvalidState(
                "cannot create sessions while the thread is running".to_string(),
            ));
        }
        self.sessions.create_and_activate(thread_id, name)
    }

    /// Sessions for a thread in creation order.
    pub fn list_sessions(&self, thread_id: &ThreadId) -> EngineResult<Vec<Session>> {
        self.store.list_sessions(thread_id)
    }

    /// The active session for a thread, if one is established.
    pub fn active_session(&self, thread_id: &ThreadId) -> Option<SessionId> {
        self.sessions.active_id(thread_id)
    }

    /// Switch the active session. Requires a clean process boundary:
    /// invalid while the thread is running.
    pub fn switch_session(&self, thread_id: &ThreadId, session_id: &SessionId) -> EngineResult<()> {
        if self.registry.is_running(thread_id) {
            return Err(EngineError::InvalidState(
                "cannot switch sessions while the thread is running".to_string(),
            ));
        }
        self.sessions.switch(thread_id, session_id)
    }

    /// Import an external transcript as a new thread.
    pub fn import_session(&self, params: ImportParams) -> EngineResult<Thread> {
        self.sessions.import(params)
    }

    /// Change a thread's WSL settings.
    ///
    /// Rejected while running and, via the store, once the thread has
    /// messages.
    pub fn set_thread_wsl(
        &self,
        thread_id: &ThreadId,
        use_wsl: bool,
        wsl_distro: Option<String>,
    ) -> EngineResult<()> {
        if self.registry.is_running(thread_id) {
            return Err(EngineError::InvalidState(
                "cannot change WSL settings while the thread is running".to_string(),
            ));
        }
        self.store.set_thread_wsl(thread_id, use_wsl, wsl_distro)
    }

    /// Delete a thread: stop it if needed, then cascade the records.
    pub async fn delete_thread(&self, thread_id: &ThreadId) -> EngineResult<()> {
        self.stop(thread_id).await?;
        self.sessions.remove_thread(thread_id);
        self.flows.lock().unwrap().remove(thread_id);
        self.usage.reset(thread_id);
        self.store.delete_thread(thread_id)
    }

    /// Stop every running thread (daemon shutdown).
    pub async fn stop_all(&self) {
        for thread_id in self.registry.running_threads() {
            if let Err(e) = self.stop(&thread_id).await {
                warn!(thread_id = %thread_id, error = %e, "Failed to stop thread on shutdown");
            }
        }
    }

    fn flow(&self, thread_id: &ThreadId) -> Arc<Mutex<ApprovalFlow>> {
        let mut flows = self.flows.lock().unwrap();
        flows
            .entry(thread_id.clone())
            .or_insert_with(|| Arc::new(Mutex::new(ApprovalFlow::new())))
            .clone()
    }
}

/// Resolve the execution context for a thread at a location.
///
/// The thread's `use_wsl` flag overrides a local location: the CLI
/// runs inside the chosen distribution against the same path.
fn resolve_context(thread: &Thread, location: &RepoLocation) -> EngineResult<ExecutionContext> {
    if thread.use_wsl {
        let distro = thread.wsl_distro.clone().ok_or_else(|| {
            EngineError::InvalidState("thread has use_wsl set but no distro".to_string())
        })?;
        return Ok(ExecutionContext::Wsl {
            distro,
            path: location.path.clone(),
        });
    }

    ExecutionContext::resolve(location).map_err(|e| match e {
        exec_ops::ExecError::MissingConfig(kind) => {
            EngineError::InvalidState(format!("location is missing {kind} configuration"))
        }
        other => EngineError::Connection(other.to_string()),
    })
}
