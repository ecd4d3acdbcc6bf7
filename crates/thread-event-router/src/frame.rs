//! Push frames delivered to thread subscribers.

use serde::{Deserialize, Serialize};
use tiller_domain::{Question, ThreadId, ThreadStatus, TokenUsage};

/// A typed event on a thread's push channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type")]
pub enum ThreadEvent {
    /// A chunk of message text.
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
    /// Updated token aggregate for the thread.
    TokenUsage { usage: TokenUsage },
    /// The assistant proposed a plan requiring approval.
    PlanProposed { plan: String },
    /// The assistant raised a clarification question.
    QuestionRaised { question: Question },
    /// The thread's lifecycle status changed.
    StatusChanged {
        status: ThreadStatus,
        #[serde(skip_serializing_if = "Option::is_none")]
        error_detail: Option<String>,
    },
}

/// One frame on a thread's channel: the event plus its position in
/// the thread's stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThreadFrame {
    pub thread_id: ThreadId,
    /// Monotonic per-thread sequence number.
    pub sequence: u64,
    #[serde(flatten)]
    pub event: ThreadEvent,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_serializes_with_flattened_event() {
        let frame = ThreadFrame {
            thread_id: ThreadId::from_string("t1"),
            sequence: 7,
            event: ThreadEvent::MessageDelta {
                role: "assistant".to_string(),
                text: "hi".to_string(),
            },
        };

        let json = serde_json::to_value(&frame).unwrap();
        assert_eq!(json["thread_id"], "t1");
        assert_eq!(json["sequence"], 7);
        assert_eq!(json["type"], "message_delta");
        assert_eq!(json["text"], "hi");
    }

    #[test]
    fn status_change_omits_empty_error_detail() {
        let frame = ThreadFrame {
            thread_id: ThreadId::from_string("t1"),
            sequence: 0,
            event: ThreadEvent::StatusChanged {
                status: ThreadStatus::Running,
                error_detail: None,
            },
        };
        let json = serde_json::to_value(&frame).unwrap();
        assert!(json.get("error_detail").is_none());
        assert_eq!(json["status"], "running");
    }
}
