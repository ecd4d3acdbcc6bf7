//! The per-thread event pump.
//!
//! Single consumer of a supervisor's event stream. Bridges typed
//! agent events to the store, the event router, and the approval
//! machines, and performs the one authoritative terminal status
//! transition when the stream ends.

use agent_process_manager::{AgentEvent, AgentEventStream};
use approval_flow::ApprovalFlow;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use thread_event_router::{EventRouter, ThreadEvent, UsageTracker};
use tiller_domain::{
    NewMessage, Question, QuestionId, Role, SessionId, ThreadId, ThreadReader, ThreadStatus,
    ThreadWriter,
};
use tracing::{debug, info, warn};

use crate::registry::SupervisorRegistry;

pub(crate) struct PumpDeps<S> {
    pub store: Arc<S>,
    pub router: EventRouter,
    pub usage: UsageTracker,
    pub flow: Arc<Mutex<ApprovalFlow>>,
    pub registry: SupervisorRegistry,
}

/// Consume the stream until a terminal event, then finalize.
pub(crate) async fn run<S: ThreadReader + ThreadWriter + Send + Sync + 'static>(
    mut stream: AgentEventStream,
    thread_id: ThreadId,
    session_id: SessionId,
    deps: PumpDeps<S>,
    stop_requested: Arc<AtomicBool>,
    done_tx: tokio::sync::watch::Sender<bool>,
) {
    info!(thread_id = %thread_id, session_id = %session_id, "Event pump started");

    let mut event_count = 0u64;
    let mut outcome = (ThreadStatus::Stopped, None::<String>);

    while let Some(event) = stream.next().await {
        event_count += 1;

        match &event {
            AgentEvent::SessionStarted { agent_session_id } => {
                if let Err(e) = deps
                    .store
                    .set_agent_session_id(&session_id, agent_session_id)
                {
                    warn!(error = %e, "Failed to record agent session id");
                }
                info!(agent_session = %agent_session_id, "Agent session established");
            }

            AgentEvent::MessageDelta { role, text } => {
                append(&deps, &session_id, parse_role(role), text.clone());
                deps.router
                    .publish(
                        &thread_id,
                        ThreadEvent::MessageDelta {
                            role: role.clone(),
                            text: text.clone(),
                        },
                    )
                    .await;
            }

            AgentEvent::ToolUse { name, input } => {
                append(
                    &deps,
                    &session_id,
                    Role::Tool,
                    serde_json::json!({"type": "tool_use", "name": name, "input": input})
                        .to_string(),
                );
                deps.router
                    .publish(
                        &thread_id,
                        ThreadEvent::ToolUse {
                            name: name.clone(),
                            input: input.clone(),
                        },
                    )
                    .await;
            }

            AgentEvent::ToolResult {
                name,
                output,
                is_error,
            } => {
                append(
                    &deps,
                    &session_id,
                    Role::Tool,
                    serde_json::json!({
                        "type": "tool_result",
                        "name": name,
                        "output": output,
                        "is_error": is_error,
                    })
                    .to_string(),
                );
                deps.router
                    .publish(
                        &thread_id,
                        ThreadEvent::ToolResult {
                            name: name.clone(),
                            output: output.clone(),
                            is_error: *is_error,
                        },
                    )
                    .await;
            }

            AgentEvent::TokenUsage {
                input_tokens,
                output_tokens,
                context_window,
            } => {
                let aggregate =
                    deps.usage
                        .apply(&thread_id, *input_tokens, *output_tokens, *context_window);
                deps.router
                    .publish(&thread_id, ThreadEvent::TokenUsage { usage: aggregate })
                    .await;
            }

            AgentEvent::PlanProposed { plan } => {
                {
                    let mut flow = deps.flow.lock().unwrap();
                    flow.plan.observe_proposed(plan.clone());
                }
                deps.router
                    .publish(&thread_id, ThreadEvent::PlanProposed { plan: plan.clone() })
                    .await;
            }

            AgentEvent::QuestionRaised {
                prompt,
                options,
                required_keys,
            } => {
                let question = Question {
                    id: QuestionId::new(),
                    thread_id: thread_id.clone(),
                    prompt: prompt.clone(),
                    options: options.clone(),
                    required_keys: required_keys.clone(),
                };
                {
                    let mut flow = deps.flow.lock().unwrap();
                    flow.question.observe_question(question.clone());
                }
                deps.router
                    .publish(&thread_id, ThreadEvent::QuestionRaised { question })
                    .await;
            }

            AgentEvent::Completed { is_error } => {
                // Turn boundary; the process stays alive for the next
                // send.
                if *is_error {
                    warn!(event_num = event_count, "Turn completed with error");
                } else {
                    debug!(event_num = event_count, "Turn completed");
                }
            }

            AgentEvent::Stderr { line } => {
                debug!(stderr = %line, "Assistant stderr");
            }

            AgentEvent::Unknown { event_type, .. } => {
                debug!(event_type = %event_type, "Skipping unknown frame");
            }

            AgentEvent::Desynchronized { detail } => {
                warn!(detail = %detail, "Stream desynchronized");
                outcome = (ThreadStatus::Error, Some(detail.clone()));
            }

            AgentEvent::Finished { success, exit_code } => {
                outcome = if stop_requested.load(Ordering::SeqCst) || *success {
                    (ThreadStatus::Stopped, None)
                } else {
                    let tail = stream.stderr_tail().join("\n");
                    let detail = if tail.is_empty() {
                        format!("assistant exited with code {exit_code:?}")
                    } else {
                        tail
                    };
                    warn!(exit_code = ?exit_code, "Assistant exited with failure");
                    (ThreadStatus::Error, Some(detail))
                };
            }

            AgentEvent::Stopped => {
                outcome = (ThreadStatus::Stopped, None);
            }
        }

        if event.is_terminal() {
            break;
        }
    }

    let (status, detail) = outcome;
    finalize(&deps, &thread_id, status, detail).await;

    info!(thread_id = %thread_id, event_count, "Event pump finished");
    let _ = done_tx.send(true);
}

/// The single authoritative terminal transition.
///
/// Compare-and-set against `Running`: whichever terminal path reaches
/// here first wins, and a thread that was never observably running is
/// left alone.
async fn finalize<S: ThreadReader + ThreadWriter>(
    deps: &PumpDeps<S>,
    thread_id: &ThreadId,
    status: ThreadStatus,
    detail: Option<String>,
) {
    let transitioned = match deps.store.get_thread(thread_id) {
        Ok(Some(thread)) if thread.status == ThreadStatus::Running => {
            match deps
                .store
                .update_thread_status(thread_id, status, detail.clone())
            {
                Ok(()) => true,
                Err(e) => {
                    warn!(error = %e, "Failed to record terminal status");
                    false
                }
            }
        }
        Ok(_) => false,
        Err(e) => {
            warn!(error = %e, "Failed to read thread during finalize");
            false
        }
    };

    if transitioned {
        deps.router
            .publish(
                thread_id,
                ThreadEvent::StatusChanged {
                    status,
                    error_detail: detail,
                },
            )
            .await;
    }

    // A stopped thread can hold no pending question.
    {
        let mut flow = deps.flow.lock().unwrap();
        flow.question.clear();
    }

    deps.registry.release(thread_id);
}

fn append<S: ThreadWriter + ThreadReader>(
    deps: &PumpDeps<S>,
    session_id: &SessionId,
    role: Role,
    content: String,
) {
    if let Err(e) = deps.store.append_message(NewMessage {
        session_id: session_id.clone(),
        role,
        content,
        token_usage: None,
    }) {
        warn!(error = %e, "Failed to append message");
    }
}

fn parse_role(raw: &str) -> Role {
    match raw {
        "user" => Role::User,
        "system" => Role::System,
        "tool" => Role::Tool,
        _ => Role::Assistant,
    }
}
