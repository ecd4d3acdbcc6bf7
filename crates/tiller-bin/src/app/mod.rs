//! Daemon lifecycle: run, stop, status.

mod state;

pub use state::DaemonState;

use crate::handlers;
use crate::paths::Paths;
use std::sync::Arc;
use tiller_ipc::{IpcClient, IpcServer, Method};
use tracing::{info, warn};

/// Run the daemon in the foreground until shutdown.
pub async fn run(paths: &Paths, socket_override: Option<String>) -> anyhow::Result<()> {
    paths.ensure()?;

    let socket_path = socket_override
        .unwrap_or_else(|| paths.socket_file().to_string_lossy().into_owned());

    // Record our PID so `tillerd stop` can force-kill a hung daemon.
    let pid_path = paths.pid_file();
    std::fs::write(&pid_path, std::process::id().to_string())?;

    let state = DaemonState::new();
    let server = Arc::new(IpcServer::new(&socket_path));
    handlers::register(&server, state.clone()).await;

    info!(socket = %socket_path, pid = std::process::id(), "tillerd starting");

    let run_server = server.clone();
    let server_task = tokio::spawn(async move { run_server.run().await });

    let mut shutdown_rx = server.shutdown_receiver();
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Interrupt received, shutting down");
            server.shutdown();
        }
        _ = shutdown_rx.recv() => {
            info!("Shutdown requested over IPC");
        }
    }

    // Stop every running supervisor and command before exiting.
    state.engine.stop_all().await;
    let _ = server_task.await;
    let _ = std::fs::remove_file(&pid_path);

    info!("tillerd stopped");
    Ok(())
}

/// Stop a running daemon.
pub async fn stop(paths: &Paths) -> anyhow::Result<()> {
    let socket_path = paths.socket_file();
    let pid_path = paths.pid_file();

    if !socket_path.exists() {
        println!("Daemon is not running (socket not found)");
        if pid_path.exists() {
            let _ = std::fs::remove_file(&pid_path);
        }
        return Ok(());
    }

    // Try graceful shutdown first.
    let client = IpcClient::new(&socket_path.to_string_lossy());
    match client.call_method(Method::Shutdown).await {
        Ok(response) if response.is_success() => println!("Daemon shutdown initiated"),
        Ok(response) => println!("Shutdown failed: {:?}", response.error),
        Err(e) => println!("Failed to connect to daemon: {e}"),
    }

    // Wait for the daemon to stop (up to 3 seconds).
    for _ in 0..30 {
        tokio::time::sleep(tokio::time::Duration::from_millis(100)).await;
        if !socket_path.exists() {
            println!("Daemon stopped");
            return Ok(());
        }
    }

    // Still running: force kill using the PID file.
    #[cfg(unix)]
    if pid_path.exists() {
        if let Ok(pid_str) = std::fs::read_to_string(&pid_path) {
            if let Ok(pid) = pid_str.trim().parse::<i32>() {
                warn!(pid, "Daemon did not stop gracefully, sending SIGKILL");
                unsafe {
                    libc::kill(pid, libc::SIGKILL);
                }
                let _ = std::fs::remove_file(&socket_path);
                let _ = std::fs::remove_file(&pid_path);
                println!("Daemon killed");
                return Ok(());
            }
        }
    }

    // Last resort: clean up the socket file.
    if socket_path.exists() {
        let _ = std::fs::remove_file(&socket_path);
        println!("Cleaned up stale socket file");
    }

    Ok(())
}

/// Check daemon status.
pub async fn status(paths: &Paths) -> anyhow::Result<()> {
    let socket_path = paths.socket_file();
    let pid_path = paths.pid_file();

    if !socket_path.exists() {
        println!("Daemon is not running (socket not found)");
        return Ok(());
    }

    let client = IpcClient::new(&socket_path.to_string_lossy());
    match client.call_method(Method::Health).await {
        Ok(response) if response.is_success() => {
            let result = response.result.unwrap_or_default();
            println!("Daemon is running");
            if let Some(version) = result.get("version").and_then(|v| v.as_str()) {
                println!("  Version: {version}");
            }
            if let Some(threads) = result.get("running_threads").and_then(|v| v.as_u64()) {
                println!("  Running threads: {threads}");
            }
            if let Ok(pid) = std::fs::read_to_string(&pid_path) {
                println!("  PID:     {}", pid.trim());
            }
            println!("  Socket:  {}", socket_path.display());
        }
        Ok(response) => println!("Daemon responded with error: {:?}", response.error),
        Err(e) => println!("Daemon is not responding: {e}"),
    }

    Ok(())
}
