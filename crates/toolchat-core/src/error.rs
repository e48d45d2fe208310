//! Error Types
//!
//! Closed error taxonomy shared by the provider adapters, the tool client and
//! the orchestration loop, together with the normalizer that maps raw
//! transport, protocol and HTTP-status signals into it.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias for toolchat operations
pub type Result<T> = std::result::Result<T, ChatError>;

/// Longest slice of a raw error body carried into a message
const MAX_DETAIL_CHARS: usize = 300;

/// JSON-RPC "method not found"
const RPC_METHOD_NOT_FOUND: i64 = -32601;

/// Taxonomy kind, independent of the provider or tool server that failed
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Configuration,
    Transport,
    Auth,
    NotFound,
    Server,
    Protocol,
    ToolDenied,
    TurnBudgetExceeded,
}

impl ErrorKind {
    /// Stable machine-readable code
    pub const fn code(self) -> &'static str {
        match self {
            Self::Configuration => "CONFIGURATION_ERROR",
            Self::Transport => "TRANSPORT_ERROR",
            Self::Auth => "AUTH_ERROR",
            Self::NotFound => "NOT_FOUND",
            Self::Server => "SERVER_ERROR",
            Self::Protocol => "PROTOCOL_ERROR",
            Self::ToolDenied => "TOOL_DENIED",
            Self::TurnBudgetExceeded => "TURN_BUDGET_EXCEEDED",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.code())
    }
}

/// Toolchat error types
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChatError {
    /// Missing credential, model or endpoint before any call is attempted
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Network failure
    #[error("Transport error: {0}")]
    Transport(String),

    /// 401/403
    #[error("Authentication rejected: {0}")]
    Auth(String),

    /// 404, or an unresolved tool name
    #[error("Not found: {0}")]
    NotFound(String),

    /// 5xx
    #[error("Server error: {0}")]
    Server(String),

    /// Malformed JSON-RPC or unexpected response shape
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// The user rejected a tool call
    #[error("Tool call denied: {0}")]
    ToolDenied(String),

    /// Provider round trips exhausted
    #[error("Turn budget exceeded: {0}")]
    TurnBudgetExceeded(String),
}

impl ChatError {
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Configuration(_) => ErrorKind::Configuration,
            Self::Transport(_) => ErrorKind::Transport,
            Self::Auth(_) => ErrorKind::Auth,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::Server(_) => ErrorKind::Server,
            Self::Protocol(_) => ErrorKind::Protocol,
            Self::ToolDenied(_) => ErrorKind::ToolDenied,
            Self::TurnBudgetExceeded(_) => ErrorKind::TurnBudgetExceeded,
        }
    }

    /// Convert to a user-facing message, without the kind prefix
    pub fn user_message(&self) -> String {
        match self {
            Self::Configuration(msg)
            | Self::Transport(msg)
            | Self::Auth(msg)
            | Self::NotFound(msg)
            | Self::Server(msg)
            | Self::Protocol(msg)
            | Self::ToolDenied(msg)
            | Self::TurnBudgetExceeded(msg) => msg.clone(),
        }
    }

    /// Shorthand for a malformed-response error
    pub fn malformed(detail: impl Into<String>) -> Self {
        FailureSignal::Malformed(detail.into()).into()
    }
}

impl From<serde_json::Error> for ChatError {
    fn from(err: serde_json::Error) -> Self {
        Self::malformed(err.to_string())
    }
}

/// Raw failure as observed at a transport or protocol boundary
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FailureSignal {
    /// A required setting is absent (credential, model, base URL)
    MissingConfig(String),
    /// The request never produced an HTTP response
    Network { message: String, timeout: bool },
    /// Non-success HTTP status with its raw body
    HttpStatus { status: u16, body: String },
    /// Body could not be decoded or had an unexpected shape
    Malformed(String),
    /// JSON-RPC `error` member
    RpcError { code: i64, message: String },
    /// Tool name not offered by any enabled tool server
    UnknownTool(String),
    /// Approval gate said no
    Denied(String),
    /// Turn budget hit
    TurnLimit(usize),
}

/// Normalized failure: taxonomy kind plus an actionable message
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Classified {
    pub kind: ErrorKind,
    pub message: String,
}

impl Classified {
    fn new(kind: ErrorKind, message: String) -> Self {
        Self { kind, message }
    }
}

/// Map a raw failure signal into the closed taxonomy.
///
/// Pure; the same signal always yields the same classification regardless of
/// which provider or tool server produced it.
pub fn classify(signal: &FailureSignal) -> Classified {
    match signal {
        FailureSignal::MissingConfig(what) => Classified::new(
            ErrorKind::Configuration,
            format!("Missing {what}. Check the provider settings before sending."),
        ),
        FailureSignal::Network { timeout: true, .. } => Classified::new(
            ErrorKind::Transport,
            "The server did not respond in time. Check that it is running and reachable.".into(),
        ),
        FailureSignal::Network { message, .. } => Classified::new(
            ErrorKind::Transport,
            format!("Could not reach the server ({message}). Check the URL and your network connection."),
        ),
        FailureSignal::HttpStatus { status, body } => classify_status(*status, body),
        FailureSignal::Malformed(detail) => Classified::new(
            ErrorKind::Protocol,
            format!("Received a malformed response: {detail}"),
        ),
        FailureSignal::RpcError { code, message } if *code == RPC_METHOD_NOT_FOUND => {
            Classified::new(
                ErrorKind::NotFound,
                format!("The tool server does not support this method: {message}"),
            )
        }
        FailureSignal::RpcError { code, message } => Classified::new(
            ErrorKind::Protocol,
            format!("The tool server returned an error ({code}): {message}"),
        ),
        FailureSignal::UnknownTool(name) => Classified::new(
            ErrorKind::NotFound,
            format!("Tool \"{name}\" is not available on any connected tool server."),
        ),
        FailureSignal::Denied(name) => Classified::new(
            ErrorKind::ToolDenied,
            format!("Execution of tool \"{name}\" was denied by the user."),
        ),
        FailureSignal::TurnLimit(limit) => Classified::new(
            ErrorKind::TurnBudgetExceeded,
            format!("Stopped after reaching the limit of {limit} model calls for a single message."),
        ),
    }
}

fn classify_status(status: u16, body: &str) -> Classified {
    let detail = error_detail(body);
    match status {
        401 | 403 => Classified::new(
            ErrorKind::Auth,
            format!("Authentication was rejected (HTTP {status}): {detail}. Check your API key or token."),
        ),
        404 => Classified::new(
            ErrorKind::NotFound,
            format!("The endpoint or model was not found (HTTP 404): {detail}. Check the model id and URL."),
        ),
        429 => Classified::new(
            ErrorKind::Server,
            format!("The server is rate limiting requests (HTTP 429): {detail}. Wait before sending again."),
        ),
        500..=599 => Classified::new(
            ErrorKind::Server,
            format!("The server failed to handle the request (HTTP {status}): {detail}"),
        ),
        _ => Classified::new(
            ErrorKind::Protocol,
            format!("The request was rejected (HTTP {status}): {detail}"),
        ),
    }
}

/// Reduce a raw error body to its most useful line.
///
/// Understands `{"error": {"message": ..}}`, `{"error": ".."}` and
/// `{"message": ..}`; anything else is returned truncated.
pub fn error_detail(body: &str) -> String {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return "no response body".into();
    }

    if let Ok(value) = serde_json::from_str::<serde_json::Value>(trimmed) {
        let message = value
            .pointer("/error/message")
            .or_else(|| value.get("error").filter(|e| e.is_string()))
            .or_else(|| value.get("message"))
            .and_then(serde_json::Value::as_str);
        if let Some(message) = message {
            return message.to_string();
        }
    }

    if trimmed.chars().count() > MAX_DETAIL_CHARS {
        let cut: String = trimmed.chars().take(MAX_DETAIL_CHARS).collect();
        format!("{cut}…")
    } else {
        trimmed.to_string()
    }
}

impl From<FailureSignal> for ChatError {
    fn from(signal: FailureSignal) -> Self {
        let Classified { kind, message } = classify(&signal);
        match kind {
            ErrorKind::Configuration => Self::Configuration(message),
            ErrorKind::Transport => Self::Transport(message),
            ErrorKind::Auth => Self::Auth(message),
            ErrorKind::NotFound => Self::NotFound(message),
            ErrorKind::Server => Self::Server(message),
            ErrorKind::Protocol => Self::Protocol(message),
            ErrorKind::ToolDenied => Self::ToolDenied(message),
            ErrorKind::TurnBudgetExceeded => Self::TurnBudgetExceeded(message),
        }
    }
}
