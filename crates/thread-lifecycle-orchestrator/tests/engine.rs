//! End-to-end engine scenarios against scripted fake assistants.
//!
//! The fake assistant is a shell one-liner stored as the thread's
//! provider; a trailing `#` comments out the CLI flags the config
//! appends. Scripts read request frames from stdin and answer with
//! NDJSON frames, which exercises the full spawn → stream → pump →
//! router path.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use thread_event_router::{ThreadEvent, ThreadFrame};
use thread_lifecycle_orchestrator::{SendOptions, ThreadOrchestrator};
use tiller_domain::{
    ConnectionType, EngineError, MemoryStore, NewLocation, NewProject, NewThread, SshConfig,
    Thread, ThreadReader, ThreadStatus, ThreadWriter,
};
use tokio::sync::broadcast;
use tokio::time::timeout;

const WAIT: Duration = Duration::from_secs(10);

/// Assistant that answers every request with a tool invocation, a
/// message, and a turn result.
const ECHO_AGENT: &str = r#"printf '{"type":"system","session_id":"agent-sess-1"}\n'; while IFS= read -r line; do printf '{"type":"tool_use","name":"list_files","input":{}}\n'; printf '{"type":"delta","role":"assistant","text":"done"}\n'; printf '{"type":"result","is_error":false}\n'; done #"#;

/// Assistant that proposes a plan for any request and completes the
/// turn once a plan decision arrives.
const PLAN_AGENT: &str = r#"printf '{"type":"system","session_id":"agent-sess-2"}\n'; while IFS= read -r line; do case "$line" in *plan_decision*) printf '{"type":"result","is_error":false}\n';; *) printf '{"type":"plan","content":"1. refactor the module, 2. add tests"}\n';; esac; done #"#;

/// Assistant that raises a clarification question for the first
/// request and completes once answered.
const QUESTION_AGENT: &str = r#"printf '{"type":"system","session_id":"agent-sess-3"}\n'; while IFS= read -r line; do case "$line" in *answer*) printf '{"type":"result","is_error":false}\n';; *) printf '{"type":"question","prompt":"Which db?","options":[{"key":"pg","label":"Postgres"}],"required":["db"]}\n';; esac; done #"#;

/// Assistant that just stays alive.
const IDLE_AGENT: &str =
    r#"printf '{"type":"system","session_id":"agent-sess-4"}\n'; sleep 30 #"#;

fn fixture(provider: &str) -> (Arc<MemoryStore>, ThreadOrchestrator<MemoryStore>, Thread) {
    fixture_with_connection(provider, ConnectionType::Local)
}

fn fixture_with_connection(
    provider: &str,
    connection: ConnectionType,
) -> (Arc<MemoryStore>, ThreadOrchestrator<MemoryStore>, Thread) {
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
            label: "checkout".to_string(),
            connection,
            path: std::env::temp_dir().to_string_lossy().into_owned(),
            ssh: Some(SshConfig {
                // A closed port so remote starts fail fast.
                host: "127.0.0.1".to_string(),
                user: "nobody".to_string(),
                port: Some(1),
                identity_file: None,
            }),
            wsl: None,
        })
        .unwrap();
    let thread = store
        .create_thread(NewThread {
            project_id: project.id,
            location_id: location.id,
            name: "task".to_string(),
            provider: provider.to_string(),
            model: "sonnet".to_string(),
            use_wsl: false,
            wsl_distro: None,
        })
        .unwrap();
    let engine = ThreadOrchestrator::new(store.clone());
    (store, engine, thread)
}

async fn wait_for_status(store: &MemoryStore, thread: &Thread, status: ThreadStatus) -> Thread {
    for _ in 0..500 {
        let current = store.get_thread(&thread.id).unwrap().unwrap();
        if current.status == status {
            return current;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("thread never reached {status:?}");
}

async fn next_matching<F>(rx: &mut broadcast::Receiver<ThreadFrame>, mut pred: F) -> ThreadFrame
where
    F: FnMut(&ThreadEvent) -> bool,
{
    timeout(WAIT, async {
        loop {
            let frame = rx.recv().await.expect("event channel closed");
            if pred(&frame.event) {
                return frame;
            }
        }
    })
    .await
    .expect("expected frame never arrived")
}

#[tokio::test]
async fn end_to_end_local_thread_lifecycle() {
    let (store, engine, thread) = fixture(ECHO_AGENT);
    let mut rx = engine.subscribe(&thread.id).await;

    engine.start(&thread.id).await.unwrap();
    assert_eq!(
        store.get_thread(&thread.id).unwrap().unwrap().status,
        ThreadStatus::Running
    );

    engine
        .send(&thread.id, "list files", SendOptions::default())
        .await
        .unwrap();

    // Tool invocation frame arrives before the message frame.
    let tool = next_matching(&mut rx, |e| matches!(e, ThreadEvent::ToolUse { .. })).await;
    let message =
        next_matching(&mut rx, |e| matches!(e, ThreadEvent::MessageDelta { .. })).await;
    assert!(tool.sequence < message.sequence);

    engine.stop(&thread.id).await.unwrap();
    let stopped = store.get_thread(&thread.id).unwrap().unwrap();
    assert_eq!(stopped.status, ThreadStatus::Stopped);

    // No residual lock: the thread starts again.
    engine.start(&thread.id).await.unwrap();
    engine.stop(&thread.id).await.unwrap();
}

#[tokio::test]
async fn concurrent_starts_admit_exactly_one() {
    let (_store, engine, thread) = fixture(IDLE_AGENT);

    let (a, b) = tokio::join!(engine.start(&thread.id), engine.start(&thread.id));
    let failures: Vec<bool> = [&a, &b]
        .iter()
        .map(|r| matches!(r, Err(EngineError::AlreadyRunning(_))))
        .collect();

    assert_eq!(
        failures.iter().filter(|f| **f).count(),
        1,
        "exactly one start must lose: {a:?} {b:?}"
    );
    assert!(a.is_ok() || b.is_ok());

    engine.stop(&thread.id).await.unwrap();
}

#[tokio::test]
async fn stop_is_idempotent_even_after_natural_exit() {
    let (store, engine, thread) = fixture(r#"printf '{"type":"result","is_error":false}\n' #"#);

    engine.start(&thread.id).await.unwrap();
    let finished = wait_for_status(&store, &thread, ThreadStatus::Stopped).await;
    assert_eq!(finished.status, ThreadStatus::Stopped);

    // Stop after natural exit, twice.
    engine.stop(&thread.id).await.unwrap();
    engine.stop(&thread.id).await.unwrap();
    assert_eq!(
        store.get_thread(&thread.id).unwrap().unwrap().status,
        ThreadStatus::Stopped
    );
}

#[tokio::test]
async fn crash_surfaces_stderr_tail_as_error_detail() {
    let (store, engine, thread) = fixture("echo kaboom >&2; exit 9 #");

    engine.start(&thread.id).await.unwrap();
    let errored = wait_for_status(&store, &thread, ThreadStatus::Error).await;

    let detail = errored.error_detail.expect("missing error detail");
    assert!(detail.contains("kaboom"), "detail was: {detail}");

    // An errored thread is restartable.
    assert!(!engine.registry().is_running(&thread.id));
}

#[tokio::test]
async fn unreachable_ssh_target_fails_fast_without_spawning() {
    let (store, engine, thread) = fixture_with_connection(ECHO_AGENT, ConnectionType::Ssh);

    let err = engine.start(&thread.id).await.unwrap_err();
    assert!(matches!(err, EngineError::Connection(_)), "got {err:?}");

    assert!(!engine.registry().is_running(&thread.id));
    assert_eq!(
        store.get_thread(&thread.id).unwrap().unwrap().status,
        ThreadStatus::Idle
    );

    // The slot was released: a later start is not blocked by the
    // failed one (it fails on connectivity again, not AlreadyRunning).
    let err = engine.start(&thread.id).await.unwrap_err();
    assert!(matches!(err, EngineError::Connection(_)));
}

#[tokio::test]
async fn plan_reject_returns_to_none_and_send_is_accepted() {
    let (_store, engine, thread) = fixture(PLAN_AGENT);
    let mut rx = engine.subscribe(&thread.id).await;

    engine.start(&thread.id).await.unwrap();

    // Approving before any proposal is a state machine violation.
    let err = engine.approve_plan(&thread.id).await.unwrap_err();
    assert!(matches!(err, EngineError::InvalidState(_)));

    engine
        .send(&thread.id, "plan the refactor", SendOptions { plan_mode: true })
        .await
        .unwrap();
    next_matching(&mut rx, |e| matches!(e, ThreadEvent::PlanProposed { .. })).await;

    engine.reject_plan(&thread.id).await.unwrap();

    // Rejecting twice is invalid: the state is back to None.
    let err = engine.reject_plan(&thread.id).await.unwrap_err();
    assert!(matches!(err, EngineError::InvalidState(_)));

    // A subsequent send is accepted normally.
    engine
        .send(&thread.id, "never mind, just do it", SendOptions::default())
        .await
        .unwrap();

    engine.stop(&thread.id).await.unwrap();
}

#[tokio::test]
async fn execute_plan_in_new_context_seeds_a_fresh_session() {
    let (store, engine, thread) = fixture(PLAN_AGENT);
    let mut rx = engine.subscribe(&thread.id).await;

    engine.start(&thread.id).await.unwrap();
    engine
        .send(&thread.id, "plan it", SendOptions { plan_mode: true })
        .await
        .unwrap();
    next_matching(&mut rx, |e| matches!(e, ThreadEvent::PlanProposed { .. })).await;

    let original_session = engine.active_session(&thread.id).unwrap();
    let session = engine.execute_plan_in_new_context(&thread.id).await.unwrap();

    assert_ne!(session.id, original_session);
    assert_eq!(engine.active_session(&thread.id), Some(session.id.clone()));
    assert_eq!(
        store.get_thread(&thread.id).unwrap().unwrap().status,
        ThreadStatus::Running
    );

    // The new session was seeded with the plan content.
    let messages = store.list_messages(&session.id).unwrap();
    assert!(messages.iter().any(|m| m.content.contains("refactor")));

    engine.stop(&thread.id).await.unwrap();
}

#[tokio::test]
async fn question_blocks_send_until_fully_answered() {
    let (_store, engine, thread) = fixture(QUESTION_AGENT);
    let mut rx = engine.subscribe(&thread.id).await;

    engine.start(&thread.id).await.unwrap();
    engine
        .send(&thread.id, "set up the database", SendOptions::default())
        .await
        .unwrap();
    next_matching(&mut rx, |e| matches!(e, ThreadEvent::QuestionRaised { .. })).await;

    assert_eq!(engine.questions(&thread.id).len(), 1);

    // send must go through the answer path while a question is open.
    let err = engine
        .send(&thread.id, "postgres please", SendOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::QuestionPending(_)));

    // Incomplete answers are rejected without clearing the question.
    let err = engine
        .answer_questions(&thread.id, BTreeMap::new())
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::IncompleteAnswer { .. }));
    assert_eq!(engine.questions(&thread.id).len(), 1);

    let mut answers = BTreeMap::new();
    answers.insert("db".to_string(), "pg".to_string());
    engine.answer_questions(&thread.id, answers).await.unwrap();

    assert!(engine.questions(&thread.id).is_empty());
    engine
        .send(&thread.id, "carry on", SendOptions::default())
        .await
        .unwrap();

    engine.stop(&thread.id).await.unwrap();
}

#[tokio::test]
async fn session_switch_requires_stopped_thread() {
    let (_store, engine, thread) = fixture(IDLE_AGENT);

    engine.start(&thread.id).await.unwrap();
    let active = engine.active_session(&thread.id).unwrap();

    let err = engine.switch_session(&thread.id, &active).unwrap_err();
    assert!(matches!(err, EngineError::InvalidState(_)));
    let err = engine.create_session(&thread.id, "alt").unwrap_err();
    assert!(matches!(err, EngineError::InvalidState(_)));

    engine.stop(&thread.id).await.unwrap();

    let second = engine.create_session(&thread.id, "alt").unwrap();
    assert_eq!(engine.active_session(&thread.id), Some(second.id.clone()));

    engine.switch_session(&thread.id, &active).unwrap();
    assert_eq!(engine.active_session(&thread.id), Some(active));

    let sessions = engine.list_sessions(&thread.id).unwrap();
    assert_eq!(sessions.len(), 2);
}

#[tokio::test]
async fn send_requires_running_thread() {
    let (_store, engine, thread) = fixture(ECHO_AGENT);

    let err = engine
        .send(&thread.id, "hello", SendOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::NotRunning(_)));
}

#[tokio::test]
async fn frames_are_delivered_in_emission_order() {
    let script = r#"i=0; while [ $i -lt 200 ]; do printf '{"type":"delta","role":"assistant","text":"%s"}\n' "$i"; i=$((i+1)); done; printf '{"type":"result","is_error":false}\n' #"#;
    let (store, engine, thread) = fixture(script);
    let mut rx = engine.subscribe(&thread.id).await;

    engine.start(&thread.id).await.unwrap();
    wait_for_status(&store, &thread, ThreadStatus::Stopped).await;

    let mut expected = 0u64;
    let mut last_sequence = None;
    loop {
        let frame = match timeout(WAIT, rx.recv()).await {
            Ok(Ok(frame)) => frame,
            other => panic!("stream ended early: {other:?}"),
        };
        if let Some(last) = last_sequence {
            assert!(frame.sequence > last, "sequence went backwards");
        }
        last_sequence = Some(frame.sequence);

        if let ThreadEvent::MessageDelta { text, .. } = &frame.event {
            assert_eq!(text, &expected.to_string(), "deltas out of order");
            expected += 1;
            if expected == 200 {
                break;
            }
        }
    }
}

#[tokio::test]
async fn agent_session_id_is_recorded_for_resume() {
    let (store, engine, thread) = fixture(ECHO_AGENT);

    engine.start(&thread.id).await.unwrap();
    let session_id = engine.active_session(&thread.id).unwrap();

    // The system frame arrives right after spawn.
    for _ in 0..500 {
        let session = store.get_session(&session_id).unwrap().unwrap();
        if session.agent_session_id.is_some() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(
        store
            .get_session(&session_id)
            .unwrap()
            .unwrap()
            .agent_session_id
            .as_deref(),
        Some("agent-sess-1")
    );

    engine.stop(&thread.id).await.unwrap();
}
