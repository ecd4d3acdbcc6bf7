//! Context resolution and command construction.

use crate::error::{ExecError, ExecResult};
use crate::handle::ExecHandle;
use crate::probe::{self, ConnectivityReport};
use std::process::Stdio;
use tiller_domain::{ConnectionType, RepoLocation, SshConfig};
use tokio::process::Command;
use tracing::{debug, info};

/// A resolved execution target.
///
/// Stateless beyond connection parameters; cheap to clone and
/// recreate.
#[derive(Debug, Clone)]
pub enum ExecutionContext {
    Local {
        path: String,
    },
    Ssh {
        config: SshConfig,
        path: String,
    },
    Wsl {
        distro: String,
        path: String,
    },
}

impl ExecutionContext {
    /// Resolves a repo location into an execution context.
    ///
    /// Fails if the location's connection type requires config the
    /// record does not carry. Reachability is checked by
    /// [`ExecutionContext::test`], never here.
    pub fn resolve(location: &RepoLocation) -> ExecResult<Self> {
        match location.connection {
            ConnectionType::Local => Ok(Self::Local {
                path: location.path.clone(),
            }),
            ConnectionType::Ssh => {
                let config = location
                    .ssh
                    .clone()
                    .ok_or(ExecError::MissingConfig("ssh"))?;
                Ok(Self::Ssh {
                    config,
                    path: location.path.clone(),
                })
            }
            ConnectionType::Wsl => {
                let wsl = location
                    .wsl
                    .clone()
                    .ok_or(ExecError::MissingConfig("wsl"))?;
                Ok(Self::Wsl {
                    distro: wsl.distro,
                    path: location.path.clone(),
                })
            }
        }
    }

    /// The working directory on the target.
    pub fn working_path(&self) -> &str {
        match self {
            Self::Local { path } | Self::Ssh { path, .. } | Self::Wsl { path, .. } => path,
        }
    }

    /// Builds the real command invocation for a shell command line.
    ///
    /// The caller provides a single shell command line; the context
    /// wraps it for its transport. A login shell is used on every
    /// target so the assistant CLI is found on PATH.
    pub(crate) fn build_command(&self, command_line: &str) -> Command {
        match self {
            Self::Local { path } => {
                let mut cmd = Command::new(login_shell());
                cmd.args(["-l", "-c", command_line]);
                cmd.current_dir(path);
                cmd
            }
            Self::Ssh { config, path } => {
                let mut cmd = Command::new("ssh");
                // BatchMode makes an unreachable or unauthenticated
                // host fail instead of prompting.
                cmd.args(["-o", "BatchMode=yes"]);
                if let Some(port) = config.port {
                    cmd.args(["-p", &port.to_string()]);
                }
                if let Some(identity) = &config.identity_file {
                    cmd.args(["-i", identity]);
                }
                cmd.arg(config.destination());
                cmd.arg(format!("cd {} && {}", shell_quote(path), command_line));
                cmd
            }
            Self::Wsl { distro, path } => {
                let mut cmd = Command::new("wsl.exe");
                cmd.args(["-d", distro, "--", "sh", "-l", "-c"]);
                cmd.arg(format!("cd {} && {}", shell_quote(path), command_line));
                cmd
            }
        }
    }

    /// Spawns a shell command line on the target.
    ///
    /// The child gets piped stdio and its own process group; the
    /// returned handle can terminate the whole tree.
    pub fn spawn(&self, command_line: &str) -> ExecResult<ExecHandle> {
        let mut cmd = self.build_command(command_line);
        cmd.stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        #[cfg(unix)]
        cmd.process_group(0);

        debug!(command = %command_line, context = ?self.kind(), "Spawning process");
        let child = cmd.spawn()?;
        info!(pid = ?child.id(), context = ?self.kind(), "Process spawned");

        Ok(ExecHandle::new(child))
    }

    /// Probes reachability of the target. Never retried implicitly.
    pub async fn test(&self) -> ConnectivityReport {
        match self {
            Self::Local { path } => probe::test_local(path).await,
            Self::Ssh { config, .. } => probe::test_ssh(config).await,
            Self::Wsl { distro, .. } => probe::test_wsl(distro).await,
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            Self::Local { .. } => "local",
            Self::Ssh { .. } => "ssh",
            Self::Wsl { .. } => "wsl",
        }
    }
}

/// The login shell used to run local command lines.
fn login_shell() -> String {
    std::env::var("SHELL").unwrap_or_else(|_| "/bin/sh".to_string())
}

/// Escape a string for shell usage.
fn shell_quote(s: &str) -> String {
    let escaped = s.replace('\'', "'\"'\"'");
    format!("'{}'", escaped)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tiller_domain::{LocationId, ProjectId, WslConfig};

    fn location(connection: ConnectionType) -> RepoLocation {
        RepoLocation {
            id: LocationId::new(),
            project_id: ProjectId::new(),
            label: "test".to_string(),
            connection,
            path: "/srv/repo".to_string(),
            ssh: Some(SshConfig {
                host: "build.example.com".to_string(),
                user: "dev".to_string(),
                port: Some(2222),
                identity_file: Some("/home/dev/.ssh/id_ed25519".to_string()),
            }),
            wsl: Some(WslConfig {
                distro: "Ubuntu".to_string(),
            }),
        }
    }

    #[test]
    fn resolve_local() {
        let ctx = ExecutionContext::resolve(&location(ConnectionType::Local)).unwrap();
        assert!(matches!(ctx, ExecutionContext::Local { .. }));
        assert_eq!(ctx.working_path(), "/srv/repo");
    }

    #[test]
    fn resolve_ssh_requires_config() {
        let mut loc = location(ConnectionType::Ssh);
        loc.ssh = None;
        let err = ExecutionContext::resolve(&loc).unwrap_err();
        assert!(matches!(err, ExecError::MissingConfig("ssh")));
    }

    #[test]
    fn resolve_wsl_requires_config() {
        let mut loc = location(ConnectionType::Wsl);
        loc.wsl = None;
        let err = ExecutionContext::resolve(&loc).unwrap_err();
        assert!(matches!(err, ExecError::MissingConfig("wsl")));
    }

    #[test]
    fn ssh_command_includes_port_identity_and_cd() {
        let ctx = ExecutionContext::resolve(&location(ConnectionType::Ssh)).unwrap();
        let cmd = ctx.build_command("echo hi");
        let args: Vec<String> = cmd
            .as_std()
            .get_args()
            .map(|a| a.to_string_lossy().into_owned())
            .collect();

        assert!(args.contains(&"BatchMode=yes".to_string()));
        assert!(args.contains(&"2222".to_string()));
        assert!(args.contains(&"/home/dev/.ssh/id_ed25519".to_string()));
        assert!(args.contains(&"dev@build.example.com".to_string()));
        assert_eq!(args.last().unwrap(), "cd '/srv/repo' && echo hi");
    }

    #[test]
    fn wsl_command_targets_distro() {
        let ctx = ExecutionContext::resolve(&location(ConnectionType::Wsl)).unwrap();
        let cmd = ctx.build_command("echo hi");
        assert_eq!(cmd.as_std().get_program().to_string_lossy(), "wsl.exe");
        let args: Vec<String> = cmd
            .as_std()
            .get_args()
            .map(|a| a.to_string_lossy().into_owned())
            .collect();
        assert_eq!(args[0], "-d");
        assert_eq!(args[1], "Ubuntu");
    }

    #[test]
    fn shell_quote_escapes_single_quotes() {
        assert_eq!(shell_quote("plain"), "'plain'");
        assert_eq!(shell_quote("it's"), "'it'\"'\"'s'");
    }
}
