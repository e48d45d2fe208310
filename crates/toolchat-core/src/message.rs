//! Conversation Messages
//!
//! Canonical message format shared by every provider adapter. A conversation
//! is an append-only `Vec<Message>`; its order is the timeline of the turn.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{ChatError, Result};
use crate::provider::{DebugEnvelope, TokenUsage};

/// Role of a message sender
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// System prompt/instructions
    System,
    /// User input
    User,
    /// Assistant (LLM) response
    Assistant,
    /// Tool result
    Tool,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::System => write!(f, "system"),
            Self::User => write!(f, "user"),
            Self::Assistant => write!(f, "assistant"),
            Self::Tool => write!(f, "tool"),
        }
    }
}

/// One element of a multimodal message body
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text { text: String },
    Image { url: String },
}

/// Message body: plain text or an ordered sequence of parts
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Content {
    Text(String),
    Parts(Vec<ContentPart>),
}

impl Content {
    /// All text in the body, parts joined by newlines
    pub fn text(&self) -> String {
        match self {
            Self::Text(text) => text.clone(),
            Self::Parts(parts) => parts
                .iter()
                .filter_map(|part| match part {
                    ContentPart::Text { text } => Some(text.as_str()),
                    ContentPart::Image { .. } => None,
                })
                .collect::<Vec<_>>()
                .join("\n"),
        }
    }

    /// Image references in body order
    pub fn image_urls(&self) -> Vec<&str> {
        match self {
            Self::Text(_) => Vec::new(),
            Self::Parts(parts) => parts
                .iter()
                .filter_map(|part| match part {
                    ContentPart::Image { url } => Some(url.as_str()),
                    ContentPart::Text { .. } => None,
                })
                .collect(),
        }
    }
}

impl Default for Content {
    fn default() -> Self {
        Self::Text(String::new())
    }
}

impl From<String> for Content {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}

impl From<&str> for Content {
    fn from(text: &str) -> Self {
        Self::Text(text.to_string())
    }
}

/// A file attached to a user message.
///
/// `data` is either a `data:<mime>;base64,<payload>` URL or plain text.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    pub name: String,
    pub mime_type: String,
    pub data: String,
}

impl Attachment {
    pub fn new(
        name: impl Into<String>,
        mime_type: impl Into<String>,
        data: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            mime_type: mime_type.into(),
            data: data.into(),
        }
    }

    pub fn is_image(&self) -> bool {
        self.mime_type.starts_with("image/")
    }

    pub fn data_url(&self) -> Option<DataUrl<'_>> {
        DataUrl::parse(&self.data)
    }

    /// Text body of a non-image attachment; base64 data URLs are decoded
    pub fn text_content(&self) -> String {
        match self.data_url().map(|url| url.decode()) {
            Some(Ok(bytes)) => String::from_utf8_lossy(&bytes).into_owned(),
            Some(Err(_)) | None => self.data.clone(),
        }
    }
}

/// Borrowed view of a `data:<mime>;base64,<payload>` URL
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DataUrl<'a> {
    pub mime_type: &'a str,
    pub payload: &'a str,
}

impl<'a> DataUrl<'a> {
    /// Returns `None` unless the value is a base64 data URL
    pub fn parse(value: &'a str) -> Option<Self> {
        let rest = value.strip_prefix("data:")?;
        let (header, payload) = rest.split_once(',')?;
        let header = header.strip_suffix(";base64")?;
        let mime_type = header.split(';').next().unwrap_or_default();
        Some(Self { mime_type, payload })
    }

    pub fn decode(&self) -> std::result::Result<Vec<u8>, base64::DecodeError> {
        BASE64.decode(self.payload.trim())
    }
}

/// Tool call request from the LLM
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Unique within the emitting turn
    pub id: String,

    /// Tool identifier
    pub name: String,

    /// Raw argument JSON exactly as the model produced it
    pub arguments: String,
}

impl ToolCall {
    pub fn new(id: impl Into<String>, name: impl Into<String>, arguments: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            arguments: arguments.into(),
        }
    }

    /// Locally generated id, for providers that do not supply one
    pub fn generate_id() -> String {
        format!("call_{}", Uuid::new_v4().simple())
    }

    /// Parse the raw arguments; blank input means no arguments
    pub fn parse_arguments(&self) -> Result<serde_json::Value> {
        if self.arguments.trim().is_empty() {
            return Ok(serde_json::Value::Object(serde_json::Map::new()));
        }

        serde_json::from_str(&self.arguments).map_err(|e| {
            ChatError::malformed(format!(
                "arguments for tool '{}' are not valid JSON ({e})",
                self.name
            ))
        })
    }
}

/// A single message in a conversation
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Message {
    pub id: String,

    pub role: Role,

    pub content: Content,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<Attachment>,

    /// Calls requested by an assistant message
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,

    /// Call this tool message answers
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<TokenUsage>,

    /// Resolved request/raw response behind this message
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub debug: Option<DebugEnvelope>,

    /// Status line produced by the loop itself; never sent to a provider
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub notice: bool,

    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
}

impl Message {
    /// Create a new message
    pub fn new(role: Role, content: impl Into<Content>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            role,
            content: content.into(),
            attachments: Vec::new(),
            tool_calls: Vec::new(),
            tool_call_id: None,
            tool_name: None,
            usage: None,
            debug: None,
            notice: false,
            timestamp: Utc::now(),
        }
    }

    pub fn system(content: impl Into<Content>) -> Self {
        Self::new(Role::System, content)
    }

    /// System-role status line (failure, cancellation) shown to the user only
    pub fn notice(content: impl Into<Content>) -> Self {
        let mut msg = Self::new(Role::System, content);
        msg.notice = true;
        msg
    }

    /// System instruction authored by the user, as opposed to a loop notice
    pub fn is_instruction(&self) -> bool {
        self.role == Role::System && !self.notice
    }

    pub fn user(content: impl Into<Content>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<Content>) -> Self {
        Self::new(Role::Assistant, content)
    }

    /// Create a tool result message answering `call`
    pub fn tool_result(call: &ToolCall, content: impl Into<Content>) -> Self {
        let mut msg = Self::new(Role::Tool, content);
        msg.tool_call_id = Some(call.id.clone());
        msg.tool_name = Some(call.name.clone());
        msg
    }

    pub fn with_attachments(mut self, attachments: Vec<Attachment>) -> Self {
        self.attachments = attachments;
        self
    }

    pub fn with_tool_calls(mut self, tool_calls: Vec<ToolCall>) -> Self {
        self.tool_calls = tool_calls;
        self
    }

    pub fn with_usage(mut self, usage: Option<TokenUsage>) -> Self {
        self.usage = usage;
        self
    }

    pub fn with_debug(mut self, debug: DebugEnvelope) -> Self {
        self.debug = Some(debug);
        self
    }

    pub fn text(&self) -> String {
        self.content.text()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_creation() {
        let msg = Message::user("Hello");
        assert_eq!(msg.role, Role::User);
        assert_eq!(msg.text(), "Hello");
        assert!(!msg.id.is_empty());
    }

    #[test]
    fn test_tool_result_links_call() {
        let call = ToolCall::new("a", "search", r#"{"q":"x"}"#);
        let msg = Message::tool_result(&call, "result-text");

        assert_eq!(msg.role, Role::Tool);
        assert_eq!(msg.tool_call_id.as_deref(), Some("a"));
        assert_eq!(msg.tool_name.as_deref(), Some("search"));
    }

    #[test]
    fn test_notice_is_not_an_instruction() {
        let notice = Message::notice("Generation was cancelled.");
        assert_eq!(notice.role, Role::System);
        assert!(!notice.is_instruction());
        assert!(Message::system("Be terse.").is_instruction());

        let json = serde_json::to_value(&notice).unwrap();
        assert_eq!(json["notice"], true);
        let plain = serde_json::to_value(Message::system("Be terse.")).unwrap();
        assert!(plain.get("notice").is_none());
    }

    #[test]
    fn test_data_url_parse() {
        let url = DataUrl::parse("data:image/png;base64,iVBORw0KGgo=").unwrap();
        assert_eq!(url.mime_type, "image/png");
        assert_eq!(url.payload, "iVBORw0KGgo=");

        assert!(DataUrl::parse("https://example.com/a.png").is_none());
        assert!(DataUrl::parse("data:text/plain,hello").is_none());
    }

    #[test]
    fn test_attachment_text_content_decodes_base64() {
        let attachment = Attachment::new("notes.txt", "text/plain", "data:text/plain;base64,aGVsbG8=");
        assert_eq!(attachment.text_content(), "hello");

        let plain = Attachment::new("raw.txt", "text/plain", "as is");
        assert_eq!(plain.text_content(), "as is");
    }

    #[test]
    fn test_parse_arguments() {
        assert!(ToolCall::new("1", "t", "").parse_arguments().unwrap().is_object());
        assert!(ToolCall::new("1", "t", "{not json").parse_arguments().is_err());
    }

    #[test]
    fn test_content_serde_shapes() {
        let text: Content = serde_json::from_str(r#""hi""#).unwrap();
        assert_eq!(text, Content::Text("hi".into()));

        let parts: Content =
            serde_json::from_str(r#"[{"type":"text","text":"a"},{"type":"image","url":"u"}]"#)
                .unwrap();
        assert_eq!(parts.text(), "a");
        assert_eq!(parts.image_urls(), vec!["u"]);
    }
}
