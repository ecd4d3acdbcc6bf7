//! IPC method handlers.

mod command;
mod connectivity;
mod git;
mod health;
mod project;
mod session;
mod thread;

use crate::app::DaemonState;
use tiller_domain::{EngineError, EngineResult};
use tiller_ipc::{error_codes, IpcServer, Request, Response};

/// Register every handler on the server.
pub async fn register(server: &IpcServer, state: DaemonState) {
    health::register(server, state.clone()).await;
    project::register(server, state.clone()).await;
    thread::register(server, state.clone()).await;
    session::register(server, state.clone()).await;
    command::register(server, state.clone()).await;
    connectivity::register(server).await;
    git::register(server, state.clone()).await;
    thread::register_subscriptions(server, state).await;
}

/// The request params, defaulting to an empty object.
pub(crate) fn params(req: &Request) -> serde_json::Value {
    req.params.clone().unwrap_or_else(|| serde_json::json!({}))
}

/// A required string param.
pub(crate) fn str_param(params: &serde_json::Value, key: &str) -> Option<String> {
    params.get(key).and_then(|v| v.as_str()).map(String::from)
}

/// Error response for a missing/invalid param.
pub(crate) fn invalid_params(req_id: &str, message: &str) -> Response {
    Response::error(req_id, error_codes::INVALID_PARAMS, message)
}

/// Convert an engine result payload into a response.
pub(crate) fn respond(req_id: &str, result: EngineResult<serde_json::Value>) -> Response {
    match result {
        Ok(value) => Response::success(req_id, value),
        Err(err) => Response::engine_error(req_id, &err),
    }
}

/// Serialize a value, mapping encoding faults to storage errors.
pub(crate) fn to_value<T: serde::Serialize>(value: T) -> EngineResult<serde_json::Value> {
    serde_json::to_value(value).map_err(|e| EngineError::Storage(e.to_string()))
}
