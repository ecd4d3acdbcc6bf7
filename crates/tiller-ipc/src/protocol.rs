//! IPC protocol definitions.
//!
//! Uses a JSON-RPC-like protocol over Unix domain sockets.

use serde::{Deserialize, Serialize};
use tiller_domain::EngineError;

/// IPC method types.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Method {
    // Health
    Health,
    Shutdown,

    // Projects
    #[serde(rename = "project.list")]
    ProjectList,
    #[serde(rename = "project.create")]
    ProjectCreate,
    #[serde(rename = "project.rename")]
    ProjectRename,
    #[serde(rename = "project.delete")]
    ProjectDelete,

    // Locations
    #[serde(rename = "location.list")]
    LocationList,
    #[serde(rename = "location.create")]
    LocationCreate,
    #[serde(rename = "location.update")]
    LocationUpdate,
    #[serde(rename = "location.delete")]
    LocationDelete,

    // Threads
    #[serde(rename = "thread.list")]
    ThreadList,
    #[serde(rename = "thread.create")]
    ThreadCreate,
    #[serde(rename = "thread.delete")]
    ThreadDelete,
    #[serde(rename = "thread.start")]
    ThreadStart,
    #[serde(rename = "thread.stop")]
    ThreadStop,
    #[serde(rename = "thread.send")]
    ThreadSend,
    #[serde(rename = "thread.status")]
    ThreadStatus,
    #[serde(rename = "thread.set_wsl")]
    ThreadSetWsl,
    #[serde(rename = "thread.approve_plan")]
    ThreadApprovePlan,
    #[serde(rename = "thread.reject_plan")]
    ThreadRejectPlan,
    #[serde(rename = "thread.execute_plan_in_new_context")]
    ThreadExecutePlanInNewContext,
    #[serde(rename = "thread.questions")]
    ThreadQuestions,
    #[serde(rename = "thread.answer_questions")]
    ThreadAnswerQuestions,

    // Subscriptions (streaming)
    #[serde(rename = "thread.subscribe")]
    ThreadSubscribe,
    #[serde(rename = "thread.unsubscribe")]
    ThreadUnsubscribe,

    // Sessions
    #[serde(rename = "session.list")]
    SessionList,
    #[serde(rename = "session.create")]
    SessionCreate,
    #[serde(rename = "session.switch")]
    SessionSwitch,
    #[serde(rename = "session.import")]
    SessionImport,
    #[serde(rename = "message.list")]
    MessageList,

    // Project commands
    #[serde(rename = "command.list")]
    CommandList,
    #[serde(rename = "command.create")]
    CommandCreate,
    #[serde(rename = "command.delete")]
    CommandDelete,
    #[serde(rename = "command.start")]
    CommandStart,
    #[serde(rename = "command.stop")]
    CommandStop,
    #[serde(rename = "command.restart")]
    CommandRestart,
    #[serde(rename = "command.status")]
    CommandStatus,
    #[serde(rename = "command.logs")]
    CommandLogs,

    // Connectivity
    #[serde(rename = "ssh.test")]
    SshTest,
    #[serde(rename = "wsl.test")]
    WslTest,
    #[serde(rename = "wsl.list_distros")]
    WslListDistros,

    // Git
    #[serde(rename = "git.status")]
    GitStatus,
    #[serde(rename = "git.watch")]
    GitWatch,
    #[serde(rename = "git.unwatch")]
    GitUnwatch,
}

/// Server-push event for thread subscriptions.
///
/// `data` carries the serialized
/// [`ThreadFrame`](../thread_event_router/struct.ThreadFrame.html)
/// payload; `sequence` duplicates its per-thread ordinal so clients
/// can check ordering without parsing the payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub thread_id: String,
    pub sequence: u64,
    pub data: serde_json::Value,
}

impl Event {
    pub fn new(thread_id: &str, sequence: u64, data: serde_json::Value) -> Self {
        Self {
            thread_id: thread_id.to_string(),
            sequence,
            data,
        }
    }

    /// Serialize to JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize from JSON string.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

/// IPC request message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    /// Request ID for correlation.
    pub id: String,
    /// Method to invoke.
    pub method: Method,
    /// Method parameters (optional).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<serde_json::Value>,
}

impl Request {
    /// Create a new request with auto-generated ID.
    pub fn new(method: Method) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            method,
            params: None,
        }
    }

    /// Create a new request with parameters.
    pub fn with_params(method: Method, params: serde_json::Value) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            method,
            params: Some(params),
        }
    }

    /// Serialize to JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize from JSON string.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

/// IPC response message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
    /// Request ID for correlation.
    pub id: String,
    /// Result data (if successful).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    /// Error information (if failed).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorInfo>,
}

/// Error information in a response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorInfo {
    /// Numeric error code.
    pub code: i32,
    /// Human-readable message.
    pub message: String,
    /// Stable engine error kind, when the fault came from the engine.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
}

impl Response {
    /// Create a successful response.
    pub fn success(id: &str, result: serde_json::Value) -> Self {
        Self {
            id: id.to_string(),
            result: Some(result),
            error: None,
        }
    }

    /// Create an error response.
    pub fn error(id: &str, code: i32, message: &str) -> Self {
        Self {
            id: id.to_string(),
            result: None,
            error: Some(ErrorInfo {
                code,
                message: message.to_string(),
                kind: None,
            }),
        }
    }

    /// Create an error response from an engine error, preserving its
    /// stable kind for client-side handling.
    pub fn engine_error(id: &str, err: &EngineError) -> Self {
        Self {
            id: id.to_string(),
            result: None,
            error: Some(ErrorInfo {
                code: error_codes::for_engine_error(err),
                message: err.to_string(),
                kind: Some(err.code().to_string()),
            }),
        }
    }

    /// Serialize to JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize from JSON string.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Check if the response is successful.
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

// Standard error codes
pub mod error_codes {
    use tiller_domain::EngineError;

    pub const PARSE_ERROR: i32 = -32700;
    pub const INVALID_REQUEST: i32 = -32600;
    pub const METHOD_NOT_FOUND: i32 = -32601;
    pub const INVALID_PARAMS: i32 = -32602;
    pub const INTERNAL_ERROR: i32 = -32603;
    pub const NOT_FOUND: i32 = -32002;

    pub const CONNECTION_ERROR: i32 = -32010;
    pub const ALREADY_RUNNING: i32 = -32011;
    pub const NOT_RUNNING: i32 = -32012;
    pub const INVALID_STATE: i32 = -32013;
    pub const QUESTION_PENDING: i32 = -32014;
    pub const INCOMPLETE_ANSWER: i32 = -32015;
    pub const IMPORT_ERROR: i32 = -32016;

    /// Numeric code for an engine error kind.
    pub fn for_engine_error(err: &EngineError) -> i32 {
        match err {
            EngineError::Connection(_) => CONNECTION_ERROR,
            EngineError::AlreadyRunning(_) => ALREADY_RUNNING,
            EngineError::NotRunning(_) => NOT_RUNNING,
            EngineError::InvalidState(_) => INVALID_STATE,
            EngineError::QuestionPending(_) => QUESTION_PENDING,
            EngineError::IncompleteAnswer { .. } => INCOMPLETE_ANSWER,
            EngineError::Import(_) => IMPORT_ERROR,
            EngineError::NotFound(_) => NOT_FOUND,
            EngineError::Storage(_) | EngineError::Process(_) => INTERNAL_ERROR,
        }
    }
}
