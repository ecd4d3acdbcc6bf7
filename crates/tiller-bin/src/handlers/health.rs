//! Health and shutdown handlers.

use crate::app::DaemonState;
use tiller_ipc::{IpcServer, Method, Response};
use tracing::info;

pub async fn register(server: &IpcServer, state: DaemonState) {
    let engine = state.engine.clone();
    server
        .register_handler(Method::Health, move |req| {
            let engine = engine.clone();
            async move {
                Response::success(
                    &req.id,
                    serde_json::json!({
                        "status": "ok",
                        "version": env!("CARGO_PKG_VERSION"),
                        "running_threads": engine.registry().count(),
                    }),
                )
            }
        })
        .await;

    let shutdown = server.shutdown_sender();
    server
        .register_handler(Method::Shutdown, move |req| {
            let shutdown = shutdown.clone();
            async move {
                info!("Shutdown requested");
                let _ = shutdown.send(());
                Response::success(&req.id, serde_json::json!({ "shutting_down": true }))
            }
        })
        .await;
}
