//! Configuration for assistant CLI processes.

/// Default allowed tools for the assistant CLI.
pub const DEFAULT_ALLOWED_TOOLS: &str =
    "Bash,Edit,Glob,Grep,NotebookEdit,Read,Task,WebFetch,WebSearch,Write";

/// Configuration for spawning an assistant process.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// The assistant CLI executable (thread provider, e.g. "claude").
    pub provider: String,

    /// Model identifier passed to the CLI.
    pub model: String,

    /// The initial prompt. Empty when attaching to resume a session
    /// without sending anything yet.
    pub prompt: String,

    /// The backing CLI's session token to resume, if any.
    pub resume_session_id: Option<String>,

    /// Run in plan mode: the CLI proposes a plan instead of acting.
    pub plan_mode: bool,

    /// Optional custom allowed tools (uses DEFAULT_ALLOWED_TOOLS if None).
    pub allowed_tools: Option<String>,
}

impl AgentConfig {
    /// Create a new configuration.
    pub fn new(provider: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            model: model.into(),
            prompt: String::new(),
            resume_session_id: None,
            plan_mode: false,
            allowed_tools: None,
        }
    }

    /// Set the initial prompt.
    pub fn with_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.prompt = prompt.into();
        self
    }

    /// Set the session token to resume.
    pub fn with_resume_session(mut self, session_id: impl Into<String>) -> Self {
        self.resume_session_id = Some(session_id.into());
        self
    }

    /// Enable plan mode.
    pub fn with_plan_mode(mut self, plan_mode: bool) -> Self {
        self.plan_mode = plan_mode;
        self
    }

    /// Set custom allowed tools.
    pub fn with_allowed_tools(mut self, tools: impl Into<String>) -> Self {
        self.allowed_tools = Some(tools.into());
        self
    }

    /// Get the allowed tools string.
    pub fn allowed_tools(&self) -> &str {
        self.allowed_tools
            .as_deref()
            .unwrap_or(DEFAULT_ALLOWED_TOOLS)
    }

    /// Build the assistant CLI command line.
    ///
    /// Input and output both use NDJSON streaming so follow-up
    /// requests can be written to stdin while events arrive on stdout.
    pub(crate) fn build_command_line(&self) -> String {
        let mut cmd = format!(
            "{} --model {} --verbose --output-format stream-json --input-format stream-json --allowedTools {}",
            self.provider,
            self.model,
            self.allowed_tools()
        );

        if !self.prompt.is_empty() {
            cmd.push_str(&format!(" -p {}", shell_escape(&self.prompt)));
        }

        if let Some(ref session_id) = self.resume_session_id {
            cmd.push_str(&format!(" -r {}", session_id));
        }

        if self.plan_mode {
            cmd.push_str(" --permission-mode plan");
        }

        cmd
    }
}

/// Escape a string for shell usage.
fn shell_escape(s: &str) -> String {
    // Use single quotes and escape any single quotes within
    let escaped = s.replace('\'', "'\"'\"'");
    format!("'{}'", escaped)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_new_defaults() {
        let config = AgentConfig::new("claude", "sonnet");
        assert_eq!(config.provider, "claude");
        assert_eq!(config.model, "sonnet");
        assert!(config.prompt.is_empty());
        assert!(config.resume_session_id.is_none());
        assert!(!config.plan_mode);
    }

    #[test]
    fn build_command_line_basic() {
        let config = AgentConfig::new("claude", "sonnet").with_prompt("Hello world");
        let cmd = config.build_command_line();
        assert!(cmd.starts_with("claude --model sonnet"));
        assert!(cmd.contains("--output-format stream-json"));
        assert!(cmd.contains("--input-format stream-json"));
        assert!(cmd.contains("-p 'Hello world'"));
    }

    #[test]
    fn build_command_line_with_resume() {
        let config = AgentConfig::new("claude", "sonnet").with_resume_session("sess-abc");
        let cmd = config.build_command_line();
        assert!(cmd.contains("-r sess-abc"));
    }

    #[test]
    fn build_command_line_with_plan_mode() {
        let config = AgentConfig::new("claude", "opus").with_plan_mode(true);
        let cmd = config.build_command_line();
        assert!(cmd.contains("--permission-mode plan"));
    }

    #[test]
    fn shell_escape_single_quotes() {
        assert_eq!(shell_escape("hello"), "'hello'");
        assert_eq!(shell_escape("it's"), "'it'\"'\"'s'");
    }
}
