//! SSH/WSL connectivity handlers.

use super::{invalid_params, params, str_param};
use exec_ops::{list_wsl_distros, ExecutionContext};
use tiller_domain::SshConfig;
use tiller_ipc::{IpcServer, Method, Response};

pub async fn register(server: &IpcServer) {
    server
        .register_handler(Method::SshTest, move |req| async move {
            let config: SshConfig = match serde_json::from_value(params(&req)) {
                Ok(config) => config,
                Err(e) => return invalid_params(&req.id, &e.to_string()),
            };
            let context = ExecutionContext::Ssh {
                config,
                path: String::new(),
            };
            let report = context.test().await;
            match serde_json::to_value(&report) {
                Ok(value) => Response::success(&req.id, value),
                Err(e) => invalid_params(&req.id, &e.to_string()),
            }
        })
        .await;

    server
        .register_handler(Method::WslTest, move |req| async move {
            let params = params(&req);
            let Some(distro) = str_param(&params, "distro") else {
                return invalid_params(&req.id, "distro is required");
            };
            let context = ExecutionContext::Wsl {
                distro,
                path: String::new(),
            };
            let report = context.test().await;
            match serde_json::to_value(&report) {
                Ok(value) => Response::success(&req.id, value),
                Err(e) => invalid_params(&req.id, &e.to_string()),
            }
        })
        .await;

    server
        .register_handler(Method::WslListDistros, move |req| async move {
            let distros = list_wsl_distros().await;
            Response::success(&req.id, serde_json::json!({ "distros": distros }))
        })
        .await;
}
