//! OpenAI-compatible chat completions wire format.
//!
//! Shared by OpenAI, OpenRouter, Groq, Mistral, DeepSeek and custom servers.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{ImageRef, embedded_error, split_user_content};
use crate::error::{ChatError, Result};
use crate::message::{Message, Role, ToolCall};
use crate::provider::{CompletionRequest, ParsedResponse, TokenUsage};
use crate::tool::ToolDefinition;

// ── Request types ───────────────────────────────────────

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<ChatTool<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_choice: Option<&'static str>,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: &'static str,
    /// `null` for assistant messages that only carry tool calls
    content: Option<ChatContent>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tool_calls: Vec<ChatToolCall>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum ChatContent {
    Text(String),
    Parts(Vec<ChatPart>),
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ChatPart {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Debug, Serialize, Deserialize)]
struct ImageUrl {
    url: String,
}

#[derive(Debug, Serialize)]
struct ChatToolCall {
    id: String,
    #[serde(rename = "type")]
    call_type: &'static str,
    function: ChatFunctionCall,
}

#[derive(Debug, Serialize)]
struct ChatFunctionCall {
    name: String,
    arguments: String,
}

#[derive(Debug, Serialize)]
struct ChatTool<'a> {
    #[serde(rename = "type")]
    tool_type: &'static str,
    function: ChatFunctionDef<'a>,
}

#[derive(Debug, Serialize)]
struct ChatFunctionDef<'a> {
    name: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<&'a str>,
    parameters: &'a Value,
}

// ── Response types ──────────────────────────────────────

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<Usage>,
    #[serde(default)]
    error: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Value,
    #[serde(default)]
    tool_calls: Option<Vec<ResponseToolCall>>,
    /// OpenRouter image-generation extension
    #[serde(default)]
    images: Option<Vec<ResponseImage>>,
}

#[derive(Debug, Deserialize)]
struct ResponseToolCall {
    #[serde(default)]
    id: Option<String>,
    function: ResponseFunction,
}

#[derive(Debug, Deserialize)]
struct ResponseFunction {
    name: String,
    #[serde(default)]
    arguments: Value,
}

#[derive(Debug, Deserialize)]
struct ResponseImage {
    image_url: ImageUrl,
}

#[derive(Debug, Deserialize)]
struct Usage {
    #[serde(default)]
    prompt_tokens: u32,
    #[serde(default)]
    completion_tokens: u32,
    #[serde(default)]
    total_tokens: u32,
}

// ── Translation ─────────────────────────────────────────

pub(super) fn build_request(model: &str, request: &CompletionRequest<'_>) -> Result<Value> {
    let mut messages = Vec::with_capacity(request.messages.len() + 1);

    if let Some(prompt) = request.system_prompt.filter(|p| !p.trim().is_empty()) {
        messages.push(text_message("system", prompt.to_string()));
    }

    messages.extend(
        request
            .messages
            .iter()
            .filter(|m| !m.notice)
            .map(translate_message),
    );

    let tools: Vec<ChatTool<'_>> = request.tools.iter().map(translate_tool).collect();
    let tool_choice = (!tools.is_empty()).then_some("auto");

    let body = ChatRequest {
        model,
        messages,
        tools,
        tool_choice,
    };

    Ok(serde_json::to_value(&body)?)
}

fn text_message(role: &'static str, text: String) -> ChatMessage {
    ChatMessage {
        role,
        content: Some(ChatContent::Text(text)),
        tool_calls: Vec::new(),
        tool_call_id: None,
    }
}

fn translate_message(msg: &Message) -> ChatMessage {
    match msg.role {
        Role::System => text_message("system", msg.text()),
        Role::User => {
            let content = split_user_content(msg);
            if content.images.is_empty() {
                return text_message("user", content.text);
            }

            let mut parts = vec![ChatPart::Text { text: content.text }];
            parts.extend(content.images.into_iter().map(|image| {
                let url = match image {
                    ImageRef::Inline { mime_type, data } => format!("data:{mime_type};base64,{data}"),
                    ImageRef::Remote(url) => url,
                };
                ChatPart::ImageUrl {
                    image_url: ImageUrl { url },
                }
            }));

            ChatMessage {
                role: "user",
                content: Some(ChatContent::Parts(parts)),
                tool_calls: Vec::new(),
                tool_call_id: None,
            }
        }
        Role::Assistant => {
            let text = msg.text();
            let tool_calls: Vec<ChatToolCall> = msg
                .tool_calls
                .iter()
                .map(|call| ChatToolCall {
                    id: call.id.clone(),
                    call_type: "function",
                    function: ChatFunctionCall {
                        name: call.name.clone(),
                        arguments: call.arguments.clone(),
                    },
                })
                .collect();

            let content = if text.is_empty() && !tool_calls.is_empty() {
                None
            } else {
                Some(ChatContent::Text(text))
            };

            ChatMessage {
                role: "assistant",
                content,
                tool_calls,
                tool_call_id: None,
            }
        }
        Role::Tool => ChatMessage {
            role: "tool",
            content: Some(ChatContent::Text(msg.text())),
            tool_calls: Vec::new(),
            tool_call_id: msg.tool_call_id.clone(),
        },
    }
}

fn translate_tool(tool: &ToolDefinition) -> ChatTool<'_> {
    ChatTool {
        tool_type: "function",
        function: ChatFunctionDef {
            name: &tool.name,
            description: tool.description.as_deref(),
            parameters: &tool.parameter_schema,
        },
    }
}

pub(super) fn parse_response(raw: &Value) -> Result<ParsedResponse> {
    let resp: ChatResponse = serde_json::from_value(raw.clone())?;

    if let Some(error) = resp.error {
        return Err(embedded_error(&error));
    }

    let choice = resp
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| ChatError::malformed("response has no choices"))?;

    let tool_calls = choice
        .message
        .tool_calls
        .unwrap_or_default()
        .into_iter()
        .map(|tc| {
            let id = tc
                .id
                .filter(|id| !id.is_empty())
                .unwrap_or_else(ToolCall::generate_id);
            let arguments = match tc.function.arguments {
                Value::String(raw) => raw,
                Value::Null => String::new(),
                other => other.to_string(),
            };
            ToolCall::new(id, tc.function.name, arguments)
        })
        .collect();

    let images = choice
        .message
        .images
        .unwrap_or_default()
        .into_iter()
        .map(|image| image.image_url.url)
        .collect();

    Ok(ParsedResponse {
        text: content_text(&choice.message.content),
        tool_calls,
        usage: resp.usage.map(|u| TokenUsage {
            prompt_tokens: u.prompt_tokens,
            completion_tokens: u.completion_tokens,
            total_tokens: u.total_tokens,
        }),
        images,
    })
}

/// `content` may be a string, `null`, or an array of typed parts
fn content_text(content: &Value) -> String {
    match content {
        Value::String(text) => text.clone(),
        Value::Array(parts) => parts
            .iter()
            .filter_map(|part| part.get("text").and_then(Value::as_str))
            .collect::<Vec<_>>()
            .join(""),
        _ => String::new(),
    }
}
