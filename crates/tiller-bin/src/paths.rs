//! Filesystem paths used by the daemon.

use anyhow::Context;
use std::path::PathBuf;

/// Well-known paths under `~/.tiller`.
pub struct Paths {
    base: PathBuf,
}

impl Paths {
    pub fn new() -> anyhow::Result<Self> {
        let home = dirs::home_dir().context("could not determine home directory")?;
        Ok(Self {
            base: home.join(".tiller"),
        })
    }

    /// The daemon's Unix socket.
    pub fn socket_file(&self) -> PathBuf {
        self.base.join("tillerd.sock")
    }

    /// The daemon's PID file.
    pub fn pid_file(&self) -> PathBuf {
        self.base.join("tillerd.pid")
    }

    /// Ensure the base directory exists.
    pub fn ensure(&self) -> anyhow::Result<()> {
        std::fs::create_dir_all(&self.base)
            .with_context(|| format!("failed to create {}", self.base.display()))
    }
}
