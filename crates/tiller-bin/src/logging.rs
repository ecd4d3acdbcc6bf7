//! Logging initialization for the daemon.

use tracing_subscriber::{fmt, EnvFilter};

/// Initialize tracing output.
///
/// The filter comes from `RUST_LOG` when set, falling back to the
/// provided default level. With `json` set, lines come out as
/// structured JSON for machine consumption.
pub fn init(default_level: &str, json: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_level));

    if json {
        fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .json()
            .init();
    } else {
        fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    }
}
