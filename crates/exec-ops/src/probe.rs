//! Connectivity probes and WSL distro discovery.

use serde::Serialize;
use std::process::Stdio;
use std::time::Duration;
use tiller_domain::SshConfig;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{debug, warn};

const PROBE_TIMEOUT: Duration = Duration::from_secs(10);

/// Outcome of a connectivity test, serialized to clients as-is.
#[derive(Debug, Clone, Serialize)]
pub struct ConnectivityReport {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ConnectivityReport {
    fn ok() -> Self {
        Self {
            ok: true,
            error: None,
        }
    }

    fn failed(error: impl Into<String>) -> Self {
        Self {
            ok: false,
            error: Some(error.into()),
        }
    }
}

/// Tests that a local path exists and is a directory.
pub(crate) async fn test_local(path: &str) -> ConnectivityReport {
    match tokio::fs::metadata(path).await {
        Ok(meta) if meta.is_dir() => ConnectivityReport::ok(),
        Ok(_) => ConnectivityReport::failed(format!("{path} is not a directory")),
        Err(e) => ConnectivityReport::failed(format!("{path}: {e}")),
    }
}

/// Tests SSH reachability with a single non-interactive probe.
pub(crate) async fn test_ssh(config: &SshConfig) -> ConnectivityReport {
    let mut cmd = Command::new("ssh");
    cmd.args(["-o", "BatchMode=yes", "-o", "ConnectTimeout=5"]);
    if let Some(port) = config.port {
        cmd.args(["-p", &port.to_string()]);
    }
    if let Some(identity) = &config.identity_file {
        cmd.args(["-i", identity]);
    }
    cmd.arg(config.destination());
    cmd.arg("exit");
    cmd.stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped());

    debug!(destination = %config.destination(), "Probing SSH target");

    match timeout(PROBE_TIMEOUT, cmd.output()).await {
        Err(_) => ConnectivityReport::failed("ssh probe timed out"),
        Ok(Err(e)) => ConnectivityReport::failed(format!("failed to run ssh: {e}")),
        Ok(Ok(output)) if output.status.success() => ConnectivityReport::ok(),
        Ok(Ok(output)) => {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            let detail = if stderr.is_empty() {
                format!("ssh exited with {:?}", output.status.code())
            } else {
                stderr
            };
            ConnectivityReport::failed(detail)
        }
    }
}

/// Tests that a WSL distribution is installed.
pub(crate) async fn test_wsl(distro: &str) -> ConnectivityReport {
    let distros = list_wsl_distros().await;
    if distros.iter().any(|d| d == distro) {
        ConnectivityReport::ok()
    } else {
        ConnectivityReport::failed(format!("WSL distribution '{distro}' is not installed"))
    }
}

/// Lists installed WSL distribution names.
///
/// Returns an empty list on any failure; the client disables the WSL
/// toggle when no distros are reported.
pub async fn list_wsl_distros() -> Vec<String> {
    let mut cmd = Command::new("wsl.exe");
    cmd.args(["-l", "-q"]);
    cmd.stdin(Stdio::null());

    let output = match timeout(PROBE_TIMEOUT, cmd.output()).await {
        Ok(Ok(output)) if output.status.success() => output,
        Ok(Ok(output)) => {
            warn!(code = ?output.status.code(), "wsl.exe -l -q failed");
            return Vec::new();
        }
        Ok(Err(e)) => {
            debug!(error = %e, "wsl.exe not available");
            return Vec::new();
        }
        Err(_) => {
            warn!("wsl.exe -l -q timed out");
            return Vec::new();
        }
    };

    parse_distro_list(&output.stdout)
}

/// Parses `wsl.exe -l -q` output.
///
/// wsl.exe emits UTF-16LE; tolerate plain UTF-8 as well so the parser
/// also works against captured fixtures.
fn parse_distro_list(raw: &[u8]) -> Vec<String> {
    let text = if looks_utf16le(raw) {
        let units: Vec<u16> = raw
            .chunks_exact(2)
            .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
            .collect();
        String::from_utf16_lossy(&units)
    } else {
        String::from_utf8_lossy(raw).into_owned()
    };

    text.lines()
        .map(|line| line.trim_matches(|c: char| c.is_whitespace() || c == '\0'))
        .filter(|line| !line.is_empty())
        .map(String::from)
        .collect()
}

fn looks_utf16le(raw: &[u8]) -> bool {
    // Either a BOM, or ASCII text with interleaved NUL bytes.
    raw.starts_with(&[0xFF, 0xFE]) || (raw.len() >= 2 && raw[1] == 0 && raw[0] != 0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn utf16le(s: &str) -> Vec<u8> {
        s.encode_utf16().flat_map(u16::to_le_bytes).collect()
    }

    #[test]
    fn parse_utf16_distro_list() {
        let raw = utf16le("Ubuntu\r\nDebian\r\n");
        assert_eq!(parse_distro_list(&raw), vec!["Ubuntu", "Debian"]);
    }

    #[test]
    fn parse_utf8_distro_list() {
        assert_eq!(
            parse_distro_list(b"Ubuntu\nDebian\n"),
            vec!["Ubuntu", "Debian"]
        );
    }

    #[test]
    fn parse_empty_output() {
        assert!(parse_distro_list(b"").is_empty());
        assert!(parse_distro_list(&utf16le("\r\n")).is_empty());
    }

    #[tokio::test]
    async fn local_probe_accepts_existing_directory() {
        let dir = std::env::temp_dir();
        let report = test_local(&dir.to_string_lossy()).await;
        assert!(report.ok);
    }

    #[tokio::test]
    async fn local_probe_rejects_missing_directory() {
        let report = test_local("/definitely/not/a/real/path").await;
        assert!(!report.ok);
        assert!(report.error.is_some());
    }
}
