//! Session and message handlers.

use super::{invalid_params, params, respond, str_param, to_value};
use crate::app::DaemonState;
use session_multiplexer::ImportParams;
use tiller_domain::{LocationId, ProjectId, SessionId, ThreadId, ThreadReader};
use tiller_ipc::{IpcServer, Method};

pub async fn register(server: &IpcServer, state: DaemonState) {
    let engine = state.engine.clone();
    server
        .register_handler(Method::SessionList, move |req| {
            let engine = engine.clone();
            async move {
                let params = params(&req);
                let Some(thread_id) = str_param(&params, "thread_id") else {
                    return invalid_params(&req.id, "thread_id is required");
                };
                let thread_id = ThreadId::from_string(thread_id);
                respond(
                    &req.id,
                    engine.list_sessions(&thread_id).and_then(|sessions| {
                        Ok(serde_json::json!({
                            "sessions": to_value(sessions)?,
                            "active_session_id": engine.active_session(&thread_id),
                        }))
                    }),
                )
            }
        })
        .await;

    let engine = state.engine.clone();
    server
        .register_handler(Method::SessionCreate, move |req| {
            let engine = engine.clone();
            async move {
                let params = params(&req);
                let (Some(thread_id), Some(name)) = (
                    str_param(&params, "thread_id"),
                    str_param(&params, "name"),
                ) else {
                    return invalid_params(&req.id, "thread_id and name are required");
                };
                respond(
                    &req.id,
                    engine
                        .create_session(&ThreadId::from_string(thread_id), name)
                        .and_then(to_value),
                )
            }
        })
        .await;

    let engine = state.engine.clone();
    server
        .register_handler(Method::SessionSwitch, move |req| {
            let engine = engine.clone();
            async move {
                let params = params(&req);
                let (Some(thread_id), Some(session_id)) = (
                    str_param(&params, "thread_id"),
                    str_param(&params, "session_id"),
                ) else {
                    return invalid_params(&req.id, "thread_id and session_id are required");
                };
                respond(
                    &req.id,
                    engine
                        .switch_session(
                            &ThreadId::from_string(thread_id),
                            &SessionId::from_string(session_id),
                        )
                        .map(|_| serde_json::json!({ "switched": true })),
                )
            }
        })
        .await;

    let engine = state.engine.clone();
    server
        .register_handler(Method::SessionImport, move |req| {
            let engine = engine.clone();
            async move {
                let params = params(&req);
                let (Some(project_id), Some(location_id), Some(transcript_path), Some(name)) = (
                    str_param(&params, "project_id"),
                    str_param(&params, "location_id"),
                    str_param(&params, "transcript_path"),
                    str_param(&params, "name"),
                ) else {
                    return invalid_params(
                        &req.id,
                        "project_id, location_id, transcript_path and name are required",
                    );
                };
                let import = ImportParams {
                    project_id: ProjectId::from_string(project_id),
                    location_id: LocationId::from_string(location_id),
                    transcript_path,
                    name,
                    provider: str_param(&params, "provider")
                        .unwrap_or_else(|| "claude".to_string()),
                    model: str_param(&params, "model").unwrap_or_else(|| "sonnet".to_string()),
                };
                respond(
                    &req.id,
                    engine.import_session(import).and_then(to_value),
                )
            }
        })
        .await;

    let engine = state.engine;
    server
        .register_handler(Method::MessageList, move |req| {
            let engine = engine.clone();
            async move {
                let params = params(&req);
                let Some(session_id) = str_param(&params, "session_id") else {
                    return invalid_params(&req.id, "session_id is required");
                };
                respond(
                    &req.id,
                    engine
                        .store()
                        .list_messages(&SessionId::from_string(session_id))
                        .and_then(to_value),
                )
            }
        })
        .await;
}
