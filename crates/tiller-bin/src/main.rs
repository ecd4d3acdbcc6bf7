//! `tillerd` - the Tiller daemon.
//!
//! Hosts the thread execution engine and exposes it to the desktop
//! client over a Unix-socket IPC boundary.

mod app;
mod handlers;
mod logging;
mod paths;

use clap::{Parser, Subcommand};
use paths::Paths;

#[derive(Parser)]
#[command(
    name = "tillerd",
    version,
    about = "Tiller daemon: thread execution and session orchestration"
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the daemon in the foreground.
    Run {
        /// Override the Unix socket path.
        #[arg(long)]
        socket: Option<String>,

        /// Default log level when RUST_LOG is unset.
        #[arg(long, default_value = "info", env = "TILLER_LOG")]
        log_level: String,

        /// Emit logs as JSON lines.
        #[arg(long)]
        json_logs: bool,
    },
    /// Stop a running daemon.
    Stop,
    /// Check daemon status.
    Status,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let paths = Paths::new()?;

    match cli.command.unwrap_or(Commands::Run {
        socket: None,
        log_level: "info".to_string(),
        json_logs: false,
    }) {
        Commands::Run {
            socket,
            log_level,
            json_logs,
        } => {
            logging::init(&log_level, json_logs);
            app::run(&paths, socket).await
        }
        Commands::Stop => app::stop(&paths).await,
        Commands::Status => app::status(&paths).await,
    }
}
