//! Record types for the Tiller data model.

use crate::ids::{CommandId, LocationId, MessageId, ProjectId, QuestionId, SessionId, ThreadId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A project groups repo locations and threads.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
    pub id: ProjectId,
    pub name: String,
    /// Optional remote git URL shown in the client.
    pub remote_url: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// How a repo location is reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionType {
    Local,
    Ssh,
    Wsl,
}

/// SSH connection parameters for a remote location.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SshConfig {
    pub host: String,
    pub user: String,
    #[serde(default)]
    pub port: Option<u16>,
    /// Path to an identity file passed as `-i`.
    #[serde(default)]
    pub identity_file: Option<String>,
}

impl SshConfig {
    /// The `user@host` destination string.
    pub fn destination(&self) -> String {
        format!("{}@{}", self.user, self.host)
    }
}

/// WSL connection parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WslConfig {
    pub distro: String,
}

/// An execution target: a repository path reachable locally, over SSH,
/// or inside a WSL distribution.
///
/// Identity is immutable once a running thread references the location;
/// connection parameters may be edited between runs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepoLocation {
    pub id: LocationId,
    pub project_id: ProjectId,
    pub label: String,
    pub connection: ConnectionType,
    pub path: String,
    #[serde(default)]
    pub ssh: Option<SshConfig>,
    #[serde(default)]
    pub wsl: Option<WslConfig>,
}

/// Lifecycle status of a thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThreadStatus {
    Idle,
    Running,
    Stopped,
    Error,
}

impl ThreadStatus {
    /// Returns the status as a stable string (used in IPC payloads).
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Running => "running",
            Self::Stopped => "stopped",
            Self::Error => "error",
        }
    }
}

/// A persistent conversation with an assistant CLI, bound to one repo
/// location.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Thread {
    pub id: ThreadId,
    pub project_id: ProjectId,
    pub location_id: LocationId,
    pub name: String,
    /// Assistant provider (e.g. "claude").
    pub provider: String,
    pub model: String,
    pub status: ThreadStatus,
    /// Locked once `has_messages` is true.
    pub use_wsl: bool,
    #[serde(default)]
    pub wsl_distro: Option<String>,
    pub has_messages: bool,
    /// Last captured error detail when `status` is `Error`.
    #[serde(default)]
    pub error_detail: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// One branch of conversation history within a thread.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: SessionId,
    pub thread_id: ThreadId,
    pub name: String,
    /// The backing CLI's own session token, learned from its stream and
    /// used to resume the conversation on the next start.
    #[serde(default)]
    pub agent_session_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Who produced a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
    Tool,
    System,
}

/// Token accounting for a thread.
///
/// Input and output counts accumulate across events; `context_window`
/// is replaced by the latest reported value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub context_window: u64,
}

impl TokenUsage {
    /// Folds a usage update into the aggregate.
    pub fn apply(&mut self, input: u64, output: u64, context_window: Option<u64>) {
        self.input_tokens += input;
        self.output_tokens += output;
        if let Some(window) = context_window {
            self.context_window = window;
        }
    }
}

/// A stored conversation message. Append-only; never mutated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub session_id: SessionId,
    pub role: Role,
    pub content: String,
    #[serde(default)]
    pub token_usage: Option<TokenUsage>,
    pub created_at: DateTime<Utc>,
}

/// A selectable answer for a clarification question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestionOption {
    pub key: String,
    pub label: String,
}

/// An assistant-raised request for clarification.
///
/// Exists only while the thread is awaiting an answer; removed once
/// answered.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Question {
    pub id: QuestionId,
    pub thread_id: ThreadId,
    pub prompt: String,
    pub options: Vec<QuestionOption>,
    /// Keys that must all be present in the submitted answer map.
    pub required_keys: Vec<String>,
}

impl Question {
    /// Returns the required keys missing from an answer map.
    pub fn missing_keys(&self, answers: &BTreeMap<String, String>) -> Vec<String> {
        self.required_keys
            .iter()
            .filter(|key| !answers.contains_key(*key))
            .cloned()
            .collect()
    }
}

/// Per-thread plan approval state. Transient; reset on restart.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanState {
    #[default]
    None,
    Proposed,
    Approved,
    Rejected,
}

/// A named project-level shell command (build/test/dev-server).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectCommand {
    pub id: CommandId,
    pub project_id: ProjectId,
    pub name: String,
    pub command: String,
    #[serde(default)]
    pub cwd: Option<String>,
}

/// Runtime status of a project command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "state")]
pub enum CommandStatus {
    Idle,
    Running,
    Stopped,
    Error { exit_code: i32 },
}

/// Which pipe a command log line came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogStream {
    Stdout,
    Stderr,
}

/// One captured line of command output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandLogLine {
    /// Monotonic per-command sequence number.
    pub seq: u64,
    pub stream: LogStream,
    pub content: String,
    pub at: DateTime<Utc>,
}

/// Derived git state for a location path.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GitStatusSnapshot {
    pub branch: Option<String>,
    pub ahead: usize,
    pub behind: usize,
    /// New (untracked or newly staged) files.
    pub added: usize,
    /// Deleted files.
    pub deleted: usize,
    pub is_clean: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_usage_accumulates_and_replaces_window() {
        let mut usage = TokenUsage::default();
        usage.apply(100, 20, Some(4_000));
        usage.apply(50, 10, None);
        usage.apply(25, 5, Some(6_000));

        assert_eq!(usage.input_tokens, 175);
        assert_eq!(usage.output_tokens, 35);
        assert_eq!(usage.context_window, 6_000);
    }

    #[test]
    fn question_reports_missing_keys() {
        let question = Question {
            id: QuestionId::new(),
            thread_id: ThreadId::new(),
            prompt: "Which database?".to_string(),
            options: vec![],
            required_keys: vec!["database".to_string(), "version".to_string()],
        };

        let mut answers = BTreeMap::new();
        answers.insert("database".to_string(), "postgres".to_string());

        assert_eq!(question.missing_keys(&answers), vec!["version".to_string()]);

        answers.insert("version".to_string(), "16".to_string());
        assert!(question.missing_keys(&answers).is_empty());
    }

    #[test]
    fn thread_status_serializes_snake_case() {
        assert_eq!(
            serde_json::to_string(&ThreadStatus::Running).unwrap(),
            "\"running\""
        );
        assert_eq!(ThreadStatus::Error.as_str(), "error");
    }

    #[test]
    fn command_status_carries_exit_code() {
        let status = CommandStatus::Error { exit_code: 127 };
        let json = serde_json::to_value(&status).unwrap();
        assert_eq!(json["state"], "error");
        assert_eq!(json["exit_code"], 127);
    }

    #[test]
    fn ssh_destination_formats_user_and_host() {
        let config = SshConfig {
            host: "build.example.com".to_string(),
            user: "dev".to_string(),
            port: Some(2222),
            identity_file: None,
        };
        assert_eq!(config.destination(), "dev@build.example.com");
    }
}
