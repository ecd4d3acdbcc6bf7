//! Thread lifecycle and protocol handlers.

use super::{invalid_params, params, respond, str_param, to_value};
use crate::app::DaemonState;
use std::collections::BTreeMap;
use thread_lifecycle_orchestrator::SendOptions;
use tiller_domain::{NewThread, LocationId, ProjectId, ThreadId, ThreadReader, ThreadWriter};
use tiller_ipc::{Event, IpcServer, Method, Response};
use tokio::sync::{broadcast, mpsc};
use tracing::warn;

pub async fn register(server: &IpcServer, state: DaemonState) {
    let engine = state.engine.clone();
    server
        .register_handler(Method::ThreadList, move |req| {
            let engine = engine.clone();
            async move {
                let params = params(&req);
                let Some(project_id) = str_param(&params, "project_id") else {
                    return invalid_params(&req.id, "project_id is required");
                };
                respond(
                    &req.id,
                    engine
                        .store()
                        .list_threads(&ProjectId::from_string(project_id))
                        .and_then(to_value),
                )
            }
        })
        .await;

    let engine = state.engine.clone();
    server
        .register_handler(Method::ThreadCreate, move |req| {
            let engine = engine.clone();
            async move {
                let params = params(&req);
                let (Some(project_id), Some(location_id), Some(name)) = (
                    str_param(&params, "project_id"),
                    str_param(&params, "location_id"),
                    str_param(&params, "name"),
                ) else {
                    return invalid_params(
                        &req.id,
                        "project_id, location_id and name are required",
                    );
                };
                let new = NewThread {
                    project_id: ProjectId::from_string(project_id),
                    location_id: LocationId::from_string(location_id),
                    name,
                    provider: str_param(&params, "provider")
                        .unwrap_or_else(|| "claude".to_string()),
                    model: str_param(&params, "model").unwrap_or_else(|| "sonnet".to_string()),
                    use_wsl: params
                        .get("use_wsl")
                        .and_then(|v| v.as_bool())
                        .unwrap_or(false),
                    wsl_distro: str_param(&params, "wsl_distro"),
                };
                respond(&req.id, engine.store().create_thread(new).and_then(to_value))
            }
        })
        .await;

    let engine = state.engine.clone();
    server
        .register_handler(Method::ThreadDelete, move |req| {
            let engine = engine.clone();
            async move {
                let params = params(&req);
                let Some(thread_id) = str_param(&params, "thread_id") else {
                    return invalid_params(&req.id, "thread_id is required");
                };
                respond(
                    &req.id,
                    engine
                        .delete_thread(&ThreadId::from_string(thread_id))
                        .await
                        .map(|_| serde_json::json!({ "deleted": true })),
                )
            }
        })
        .await;

    let engine = state.engine.clone();
    server
        .register_handler(Method::ThreadStart, move |req| {
            let engine = engine.clone();
            async move {
                let params = params(&req);
                let Some(thread_id) = str_param(&params, "thread_id") else {
                    return invalid_params(&req.id, "thread_id is required");
                };
                respond(
                    &req.id,
                    engine
                        .start(&ThreadId::from_string(thread_id))
                        .await
                        .map(|_| serde_json::json!({ "started": true })),
                )
            }
        })
        .await;

    let engine = state.engine.clone();
    server
        .register_handler(Method::ThreadStop, move |req| {
            let engine = engine.clone();
            async move {
                let params = params(&req);
                let Some(thread_id) = str_param(&params, "thread_id") else {
                    return invalid_params(&req.id, "thread_id is required");
                };
                respond(
                    &req.id,
                    engine
                        .stop(&ThreadId::from_string(thread_id))
                        .await
                        .map(|_| serde_json::json!({ "stopped": true })),
                )
            }
        })
        .await;

    let engine = state.engine.clone();
    server
        .register_handler(Method::ThreadSend, move |req| {
            let engine = engine.clone();
            async move {
                let params = params(&req);
                let (Some(thread_id), Some(content)) = (
                    str_param(&params, "thread_id"),
                    str_param(&params, "content"),
                ) else {
                    return invalid_params(&req.id, "thread_id and content are required");
                };
                let options = SendOptions {
                    plan_mode: params
                        .get("plan_mode")
                        .and_then(|v| v.as_bool())
                        .unwrap_or(false),
                };
                respond(
                    &req.id,
                    engine
                        .send(&ThreadId::from_string(thread_id), &content, options)
                        .await
                        .map(|_| serde_json::json!({ "queued": true })),
                )
            }
        })
        .await;

    let engine = state.engine.clone();
    server
        .register_handler(Method::ThreadStatus, move |req| {
            let engine = engine.clone();
            async move {
                let params = params(&req);
                let Some(thread_id) = str_param(&params, "thread_id") else {
                    return invalid_params(&req.id, "thread_id is required");
                };
                let thread_id = ThreadId::from_string(thread_id);
                respond(
                    &req.id,
                    engine.store().get_thread(&thread_id).and_then(|thread| {
                        let thread = thread.ok_or_else(|| {
                            tiller_domain::EngineError::NotFound(format!("thread {thread_id}"))
                        })?;
                        Ok(serde_json::json!({
                            "status": thread.status.as_str(),
                            "error_detail": thread.error_detail,
                            "is_running": engine.registry().is_running(&thread_id),
                            "token_usage": engine.token_usage(&thread_id),
                        }))
                    }),
                )
            }
        })
        .await;

    let engine = state.engine.clone();
    server
        .register_handler(Method::ThreadSetWsl, move |req| {
            let engine = engine.clone();
            async move {
                let params = params(&req);
                let Some(thread_id) = str_param(&params, "thread_id") else {
                    return invalid_params(&req.id, "thread_id is required");
                };
                let Some(use_wsl) = params.get("use_wsl").and_then(|v| v.as_bool()) else {
                    return invalid_params(&req.id, "use_wsl is required");
                };
                respond(
                    &req.id,
                    engine
                        .set_thread_wsl(
                            &ThreadId::from_string(thread_id),
                            use_wsl,
                            str_param(&params, "wsl_distro"),
                        )
                        .map(|_| serde_json::json!({ "updated": true })),
                )
            }
        })
        .await;

    let engine = state.engine.clone();
    server
        .register_handler(Method::ThreadApprovePlan, move |req| {
            let engine = engine.clone();
            async move {
                let params = params(&req);
                let Some(thread_id) = str_param(&params, "thread_id") else {
                    return invalid_params(&req.id, "thread_id is required");
                };
                respond(
                    &req.id,
                    engine
                        .approve_plan(&ThreadId::from_string(thread_id))
                        .await
                        .map(|_| serde_json::json!({ "approved": true })),
                )
            }
        })
        .await;

    let engine = state.engine.clone();
    server
        .register_handler(Method::ThreadRejectPlan, move |req| {
            let engine = engine.clone();
            async move {
                let params = params(&req);
                let Some(thread_id) = str_param(&params, "thread_id") else {
                    return invalid_params(&req.id, "thread_id is required");
                };
                respond(
                    &req.id,
                    engine
                        .reject_plan(&ThreadId::from_string(thread_id))
                        .await
                        .map(|_| serde_json::json!({ "rejected": true })),
                )
            }
        })
        .await;

    let engine = state.engine.clone();
    server
        .register_handler(Method::ThreadExecutePlanInNewContext, move |req| {
            let engine = engine.clone();
            async move {
                let params = params(&req);
                let Some(thread_id) = str_param(&params, "thread_id") else {
                    return invalid_params(&req.id, "thread_id is required");
                };
                respond(
                    &req.id,
                    match engine
                        .execute_plan_in_new_context(&ThreadId::from_string(thread_id))
                        .await
                    {
                        Ok(session) => to_value(session),
                        Err(e) => Err(e),
                    },
                )
            }
        })
        .await;

    let engine = state.engine.clone();
    server
        .register_handler(Method::ThreadQuestions, move |req| {
            let engine = engine.clone();
            async move {
                let params = params(&req);
                let Some(thread_id) = str_param(&params, "thread_id") else {
                    return invalid_params(&req.id, "thread_id is required");
                };
                respond(
                    &req.id,
                    to_value(engine.questions(&ThreadId::from_string(thread_id))),
                )
            }
        })
        .await;

    let engine = state.engine;
    server
        .register_handler(Method::ThreadAnswerQuestions, move |req| {
            let engine = engine.clone();
            async move {
                let params = params(&req);
                let Some(thread_id) = str_param(&params, "thread_id") else {
                    return invalid_params(&req.id, "thread_id is required");
                };
                let answers: BTreeMap<String, String> = match params.get("answers") {
                    Some(value) => match serde_json::from_value(value.clone()) {
                        Ok(map) => map,
                        Err(e) => return invalid_params(&req.id, &e.to_string()),
                    },
                    None => return invalid_params(&req.id, "answers is required"),
                };
                respond(
                    &req.id,
                    engine
                        .answer_questions(&ThreadId::from_string(thread_id), answers)
                        .await
                        .map(|_| serde_json::json!({ "answered": true })),
                )
            }
        })
        .await;
}

/// Register the streaming subscription bridge.
///
/// Each subscription gets a forwarding task from the engine's
/// broadcast channel into the connection's bounded feed. A slow
/// client lags on its own feed; the engine-side producer is never
/// blocked.
pub async fn register_subscriptions(server: &IpcServer, state: DaemonState) {
    let engine = state.engine;
    server
        .register_subscription_handler(move |thread_id| {
            let engine = engine.clone();
            async move {
                let tid = ThreadId::from_string(&thread_id);
                if engine.store().get_thread(&tid).ok().flatten().is_none() {
                    return None;
                }

                let mut frames = engine.subscribe(&tid).await;
                let (tx, feed) = mpsc::channel(256);

                tokio::spawn(async move {
                    loop {
                        match frames.recv().await {
                            Ok(frame) => {
                                let sequence = frame.sequence;
                                let thread = frame.thread_id.to_string();
                                let data = match serde_json::to_value(&frame) {
                                    Ok(data) => data,
                                    Err(e) => {
                                        warn!(error = %e, "Failed to serialize frame");
                                        continue;
                                    }
                                };
                                if tx.send(Event::new(&thread, sequence, data)).await.is_err() {
                                    break;
                                }
                            }
                            Err(broadcast::error::RecvError::Lagged(n)) => {
                                warn!(skipped = n, "Subscriber lagged, frames dropped");
                            }
                            Err(broadcast::error::RecvError::Closed) => break,
                        }
                    }
                    engine.unsubscribe_cleanup(&tid).await;
                });

                Some(feed)
            }
        })
        .await;
}
