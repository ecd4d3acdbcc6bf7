//! Project and location handlers.

use super::{invalid_params, params, respond, str_param, to_value};
use crate::app::DaemonState;
use serde::Deserialize;
use tiller_domain::{
    ConnectionType, LocationId, NewLocation, NewProject, ProjectId, RepoLocation, SshConfig,
    ThreadReader, ThreadWriter, WslConfig,
};
use tiller_ipc::{IpcServer, Method, Response};

#[derive(Deserialize)]
struct LocationParams {
    project_id: ProjectId,
    label: String,
    connection: ConnectionType,
    path: String,
    #[serde(default)]
    ssh: Option<SshConfig>,
    #[serde(default)]
    wsl: Option<WslConfig>,
}

pub async fn register(server: &IpcServer, state: DaemonState) {
    let engine = state.engine.clone();
    server
        .register_handler(Method::ProjectList, move |req| {
            let engine = engine.clone();
            async move {
                respond(
                    &req.id,
                    engine.store().list_projects().and_then(to_value),
                )
            }
        })
        .await;

    let engine = state.engine.clone();
    server
        .register_handler(Method::ProjectCreate, move |req| {
            let engine = engine.clone();
            async move {
                let params = params(&req);
                let Some(name) = str_param(&params, "name") else {
                    return invalid_params(&req.id, "name is required");
                };
                let new = NewProject {
                    name,
                    remote_url: str_param(&params, "remote_url"),
                };
                respond(&req.id, engine.store().create_project(new).and_then(to_value))
            }
        })
        .await;

    let engine = state.engine.clone();
    server
        .register_handler(Method::ProjectRename, move |req| {
            let engine = engine.clone();
            async move {
                let params = params(&req);
                let (Some(project_id), Some(name)) = (
                    str_param(&params, "project_id"),
                    str_param(&params, "name"),
                ) else {
                    return invalid_params(&req.id, "project_id and name are required");
                };
                respond(
                    &req.id,
                    engine
                        .store()
                        .rename_project(&ProjectId::from_string(project_id), &name)
                        .map(|_| serde_json::json!({ "renamed": true })),
                )
            }
        })
        .await;

    let engine = state.engine.clone();
    server
        .register_handler(Method::ProjectDelete, move |req| {
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
                        .delete_project(&ProjectId::from_string(project_id))
                        .map(|_| serde_json::json!({ "deleted": true })),
                )
            }
        })
        .await;

    let engine = state.engine.clone();
    server
        .register_handler(Method::LocationList, move |req| {
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
                        .list_locations(&ProjectId::from_string(project_id))
                        .and_then(to_value),
                )
            }
        })
        .await;

    let engine = state.engine.clone();
    server
        .register_handler(Method::LocationCreate, move |req| {
            let engine = engine.clone();
            async move {
                let parsed: LocationParams = match serde_json::from_value(params(&req)) {
                    Ok(p) => p,
                    Err(e) => return invalid_params(&req.id, &e.to_string()),
                };
                let new = NewLocation {
                    project_id: parsed.project_id,
                    label: parsed.label,
                    connection: parsed.connection,
                    path: parsed.path,
                    ssh: parsed.ssh,
                    wsl: parsed.wsl,
                };
                respond(&req.id, engine.store().create_location(new).and_then(to_value))
            }
        })
        .await;

    let engine = state.engine.clone();
    server
        .register_handler(Method::LocationUpdate, move |req| {
            let engine = engine.clone();
            async move {
                let location: RepoLocation = match serde_json::from_value(params(&req)) {
                    Ok(l) => l,
                    Err(e) => return invalid_params(&req.id, &e.to_string()),
                };
                // Connection parameters are editable between runs; the
                // identity stays fixed while a thread references it.
                if engine.registry().running_threads().iter().any(|tid| {
                    engine
                        .store()
                        .get_thread(tid)
                        .ok()
                        .flatten()
                        .is_some_and(|t| t.location_id == location.id)
                }) {
                    return Response::engine_error(
                        &req.id,
                        &tiller_domain::EngineError::InvalidState(
                            "location is in use by a running thread".to_string(),
                        ),
                    );
                }
                respond(
                    &req.id,
                    engine
                        .store()
                        .update_location(location)
                        .map(|_| serde_json::json!({ "updated": true })),
                )
            }
        })
        .await;

    let engine = state.engine;
    server
        .register_handler(Method::LocationDelete, move |req| {
            let engine = engine.clone();
            async move {
                let params = params(&req);
                let Some(location_id) = str_param(&params, "location_id") else {
                    return invalid_params(&req.id, "location_id is required");
                };
                respond(
                    &req.id,
                    engine
                        .store()
                        .delete_location(&LocationId::from_string(location_id))
                        .map(|_| serde_json::json!({ "deleted": true })),
                )
            }
        })
        .await;
}
