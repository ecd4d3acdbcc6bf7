//! Project command handlers.

use super::{invalid_params, params, respond, str_param, to_value};
use crate::app::DaemonState;
use exec_ops::ExecutionContext;
use tiller_domain::{
    CommandId, EngineError, EngineResult, NewProjectCommand, ProjectCommand, ProjectId,
    ThreadReader, ThreadWriter,
};
use tiller_ipc::{IpcServer, Method, Response};

/// Resolve where a command runs: its own cwd when set, otherwise the
/// project's first location.
fn command_context(state: &DaemonState, command: &ProjectCommand) -> EngineResult<ExecutionContext> {
    if let Some(cwd) = &command.cwd {
        return Ok(ExecutionContext::Local { path: cwd.clone() });
    }

    let locations = state.engine.store().list_locations(&command.project_id)?;
    let location = locations.first().ok_or_else(|| {
        EngineError::InvalidState("project has no locations to run the command in".to_string())
    })?;
    ExecutionContext::resolve(location).map_err(|e| EngineError::Connection(e.to_string()))
}

fn lookup(state: &DaemonState, command_id: &CommandId) -> EngineResult<ProjectCommand> {
    state
        .engine
        .store()
        .get_command(command_id)?
        .ok_or_else(|| EngineError::NotFound(format!("command {command_id}")))
}

pub async fn register(server: &IpcServer, state: DaemonState) {
    let st = state.clone();
    server
        .register_handler(Method::CommandList, move |req| {
            let st = st.clone();
            async move {
                let params = params(&req);
                let Some(project_id) = str_param(&params, "project_id") else {
                    return invalid_params(&req.id, "project_id is required");
                };
                respond(
                    &req.id,
                    st.engine
                        .store()
                        .list_commands(&ProjectId::from_string(project_id))
                        .and_then(to_value),
                )
            }
        })
        .await;

    let st = state.clone();
    server
        .register_handler(Method::CommandCreate, move |req| {
            let st = st.clone();
            async move {
                let params = params(&req);
                let (Some(project_id), Some(name), Some(command)) = (
                    str_param(&params, "project_id"),
                    str_param(&params, "name"),
                    str_param(&params, "command"),
                ) else {
                    return invalid_params(&req.id, "project_id, name and command are required");
                };
                let new = NewProjectCommand {
                    project_id: ProjectId::from_string(project_id),
                    name,
                    command,
                    cwd: str_param(&params, "cwd"),
                };
                respond(
                    &req.id,
                    st.engine.store().create_command(new).and_then(to_value),
                )
            }
        })
        .await;

    let st = state.clone();
    server
        .register_handler(Method::CommandDelete, move |req| {
            let st = st.clone();
            async move {
                let params = params(&req);
                let Some(command_id) = str_param(&params, "command_id") else {
                    return invalid_params(&req.id, "command_id is required");
                };
                let command_id = CommandId::from_string(command_id);
                st.commands.forget(&command_id);
                respond(
                    &req.id,
                    st.engine
                        .store()
                        .delete_command(&command_id)
                        .map(|_| serde_json::json!({ "deleted": true })),
                )
            }
        })
        .await;

    let st = state.clone();
    server
        .register_handler(Method::CommandStart, move |req| {
            let st = st.clone();
            async move {
                let params = params(&req);
                let Some(command_id) = str_param(&params, "command_id") else {
                    return invalid_params(&req.id, "command_id is required");
                };
                let command_id = CommandId::from_string(command_id);

                let outcome = lookup(&st, &command_id).and_then(|command| {
                    let context = command_context(&st, &command)?;
                    st.commands
                        .start(&command, &context)
                        .map_err(command_error)?;
                    Ok(serde_json::json!({ "started": true }))
                });
                respond(&req.id, outcome)
            }
        })
        .await;

    let st = state.clone();
    server
        .register_handler(Method::CommandStop, move |req| {
            let st = st.clone();
            async move {
                let params = params(&req);
                let Some(command_id) = str_param(&params, "command_id") else {
                    return invalid_params(&req.id, "command_id is required");
                };
                st.commands
                    .stop(&CommandId::from_string(command_id))
                    .await;
                Response::success(&req.id, serde_json::json!({ "stopped": true }))
            }
        })
        .await;

    let st = state.clone();
    server
        .register_handler(Method::CommandRestart, move |req| {
            let st = st.clone();
            async move {
                let params = params(&req);
                let Some(command_id) = str_param(&params, "command_id") else {
                    return invalid_params(&req.id, "command_id is required");
                };
                let command_id = CommandId::from_string(command_id);

                let command = match lookup(&st, &command_id) {
                    Ok(command) => command,
                    Err(e) => return Response::engine_error(&req.id, &e),
                };
                let context = match command_context(&st, &command) {
                    Ok(context) => context,
                    Err(e) => return Response::engine_error(&req.id, &e),
                };
                respond(
                    &req.id,
                    st.commands
                        .restart(&command, &context)
                        .await
                        .map(|_| serde_json::json!({ "restarted": true }))
                        .map_err(command_error),
                )
            }
        })
        .await;

    let st = state.clone();
    server
        .register_handler(Method::CommandStatus, move |req| {
            let st = st.clone();
            async move {
                let params = params(&req);
                let Some(command_id) = str_param(&params, "command_id") else {
                    return invalid_params(&req.id, "command_id is required");
                };
                respond(
                    &req.id,
                    to_value(st.commands.status(&CommandId::from_string(command_id))),
                )
            }
        })
        .await;

    let st = state;
    server
        .register_handler(Method::CommandLogs, move |req| {
            let st = st.clone();
            async move {
                let params = params(&req);
                let Some(command_id) = str_param(&params, "command_id") else {
                    return invalid_params(&req.id, "command_id is required");
                };
                let after_seq = params.get("after_seq").and_then(|v| v.as_u64());
                let limit = params
                    .get("limit")
                    .and_then(|v| v.as_u64())
                    .unwrap_or(500) as usize;
                respond(
                    &req.id,
                    to_value(st.commands.logs(
                        &CommandId::from_string(command_id),
                        after_seq,
                        limit,
                    )),
                )
            }
        })
        .await;
}

fn command_error(err: command_runner::CommandError) -> EngineError {
    match err {
        command_runner::CommandError::AlreadyRunning(id) => {
            EngineError::InvalidState(format!("command {id} is already running"))
        }
        command_runner::CommandError::Spawn(e) => EngineError::Process(e.to_string()),
    }
}
