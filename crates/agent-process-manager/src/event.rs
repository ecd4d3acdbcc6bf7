//! Typed events parsed from the assistant CLI stream.

use tiller_domain::QuestionOption;

/// An event emitted by the assistant process.
#[derive(Debug, Clone)]
pub enum AgentEvent {
    /// The CLI announced its own session token; used to resume later.
    SessionStarted { agent_session_id: String },

    /// A chunk of assistant (or tool/system) message text.
    MessageDelta { role: String, text: String },

    /// The assistant invoked a tool.
    ToolUse {
        name: String,
        input: serde_json::Value,
    },

    /// A tool finished.
    ToolResult {
        name: String,
        output: String,
        is_error: bool,
    },

    /// Token accounting update. `context_window` replaces the previous
    /// value when present; counts accumulate.
    TokenUsage {
        input_tokens: u64,
        output_tokens: u64,
        context_window: Option<u64>,
    },

    /// The assistant proposed a plan requiring approval.
    PlanProposed { plan: String },

    /// The assistant raised a clarification question.
    QuestionRaised {
        prompt: String,
        options: Vec<QuestionOption>,
        required_keys: Vec<String>,
    },

    /// A turn completed.
    Completed { is_error: bool },

    /// A frame with an unrecognized type; logged and skipped upstream.
    Unknown {
        event_type: String,
        json: serde_json::Value,
    },

    /// Stderr output from the process.
    Stderr { line: String },

    /// The parser lost framing; the stream can no longer be trusted.
    Desynchronized { detail: String },

    /// The process has finished.
    Finished {
        success: bool,
        exit_code: Option<i32>,
    },

    /// The process was stopped via signal.
    Stopped,
}

impl AgentEvent {
    /// Parse a JSON frame into a typed event.
    pub(crate) fn from_json(json: serde_json::Value) -> Self {
        let event_type = json
            .get("type")
            .and_then(|v| v.as_str())
            .unwrap_or("unknown")
            .to_string();

        match event_type.as_str() {
            "system" => {
                if let Some(session_id) = json.get("session_id").and_then(|v| v.as_str()) {
                    return Self::SessionStarted {
                        agent_session_id: session_id.to_string(),
                    };
                }
                Self::Unknown { event_type, json }
            }
            "delta" => Self::MessageDelta {
                role: json
                    .get("role")
                    .and_then(|v| v.as_str())
                    .unwrap_or("assistant")
                    .to_string(),
                text: json
                    .get("text")
                    .and_then(|v| v.as_str())
                    .unwrap_or_default()
                    .to_string(),
            },
            "tool_use" => Self::ToolUse {
                name: json
                    .get("name")
                    .and_then(|v| v.as_str())
                    .unwrap_or("unknown")
                    .to_string(),
                input: json.get("input").cloned().unwrap_or(serde_json::Value::Null),
            },
            "tool_result" => Self::ToolResult {
                name: json
                    .get("name")
                    .and_then(|v| v.as_str())
                    .unwrap_or("unknown")
                    .to_string(),
                output: json
                    .get("output")
                    .and_then(|v| v.as_str())
                    .unwrap_or_default()
                    .to_string(),
                is_error: json
                    .get("is_error")
                    .and_then(|v| v.as_bool())
                    .unwrap_or(false),
            },
            "usage" => Self::TokenUsage {
                input_tokens: json
                    .get("input_tokens")
                    .and_then(|v| v.as_u64())
                    .unwrap_or(0),
                output_tokens: json
                    .get("output_tokens")
                    .and_then(|v| v.as_u64())
                    .unwrap_or(0),
                context_window: json.get("context_window").and_then(|v| v.as_u64()),
            },
            "plan" => Self::PlanProposed {
                plan: json
                    .get("content")
                    .and_then(|v| v.as_str())
                    .unwrap_or_default()
                    .to_string(),
            },
            "question" => {
                let options = json
                    .get("options")
                    .and_then(|v| v.as_array())
                    .map(|items| {
                        items
                            .iter()
                            .filter_map(|item| {
                                let key = item.get("key")?.as_str()?.to_string();
                                let label = item
                                    .get("label")
                                    .and_then(|v| v.as_str())
                                    .unwrap_or(&key)
                                    .to_string();
                                Some(QuestionOption { key, label })
                            })
                            .collect()
                    })
                    .unwrap_or_default();
                let required_keys = json
                    .get("required")
                    .and_then(|v| v.as_array())
                    .map(|items| {
                        items
                            .iter()
                            .filter_map(|item| item.as_str().map(String::from))
                            .collect()
                    })
                    .unwrap_or_default();

                Self::QuestionRaised {
                    prompt: json
                        .get("prompt")
                        .and_then(|v| v.as_str())
                        .unwrap_or_default()
                        .to_string(),
                    options,
                    required_keys,
                }
            }
            "result" => Self::Completed {
                is_error: json
                    .get("is_error")
                    .and_then(|v| v.as_bool())
                    .unwrap_or(false),
            },
            _ => Self::Unknown { event_type, json },
        }
    }

    /// Get the event type string.
    pub fn event_type(&self) -> &str {
        match self {
            Self::SessionStarted { .. } => "system",
            Self::MessageDelta { .. } => "delta",
            Self::ToolUse { .. } => "tool_use",
            Self::ToolResult { .. } => "tool_result",
            Self::TokenUsage { .. } => "usage",
            Self::PlanProposed { .. } => "plan",
            Self::QuestionRaised { .. } => "question",
            Self::Completed { .. } => "result",
            Self::Unknown { event_type, .. } => event_type,
            Self::Stderr { .. } => "stderr",
            Self::Desynchronized { .. } => "desynchronized",
            Self::Finished { .. } => "finished",
            Self::Stopped => "stopped",
        }
    }

    /// Check if this is a terminal event (process finished or stopped,
    /// or the stream desynchronized).
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Finished { .. } | Self::Stopped | Self::Desynchronized { .. }
        )
    }
}
