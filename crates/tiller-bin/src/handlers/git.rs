//! Git status handlers.

use super::{invalid_params, params, str_param};
use crate::app::DaemonState;
use git_ops::get_status_snapshot;
use std::path::PathBuf;
use tiller_ipc::{error_codes, IpcServer, Method, Response};

pub async fn register(server: &IpcServer, state: DaemonState) {
    server
        .register_handler(Method::GitStatus, move |req| async move {
            let params = params(&req);
            let Some(path) = str_param(&params, "path") else {
                return invalid_params(&req.id, "path is required");
            };

            // libgit2 is blocking; keep it off the IPC runtime.
            let result =
                tokio::task::spawn_blocking(move || get_status_snapshot(&PathBuf::from(path)))
                    .await;
            match result {
                Ok(Ok(snapshot)) => match serde_json::to_value(&snapshot) {
                    Ok(value) => Response::success(&req.id, value),
                    Err(e) => {
                        Response::error(&req.id, error_codes::INTERNAL_ERROR, &e.to_string())
                    }
                },
                Ok(Err(e)) => Response::error(&req.id, error_codes::NOT_FOUND, &e.to_string()),
                Err(e) => Response::error(&req.id, error_codes::INTERNAL_ERROR, &e.to_string()),
            }
        })
        .await;

    let st = state.clone();
    server
        .register_handler(Method::GitWatch, move |req| {
            let st = st.clone();
            async move {
                let params = params(&req);
                let Some(path) = str_param(&params, "path") else {
                    return invalid_params(&req.id, "path is required");
                };

                let rx = st.git_poller.watch(PathBuf::from(path));
                let snapshot = rx.borrow().clone();
                match serde_json::to_value(&snapshot) {
                    Ok(value) => Response::success(
                        &req.id,
                        serde_json::json!({ "watching": true, "snapshot": value }),
                    ),
                    Err(e) => {
                        Response::error(&req.id, error_codes::INTERNAL_ERROR, &e.to_string())
                    }
                }
            }
        })
        .await;

    let st = state;
    server
        .register_handler(Method::GitUnwatch, move |req| {
            let st = st.clone();
            async move {
                let params = params(&req);
                let Some(path) = str_param(&params, "path") else {
                    return invalid_params(&req.id, "path is required");
                };
                st.git_poller.unwatch(&PathBuf::from(path));
                Response::success(&req.id, serde_json::json!({ "watching": false }))
            }
        })
        .await;
}
