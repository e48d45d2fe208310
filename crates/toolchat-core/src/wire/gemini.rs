//! Gemini `generateContent` wire format.
//!
//! Key differences from the OpenAI-compatible family:
//! - The system prompt is a single top-level `systemInstruction`.
//! - Assistant turns use `role: "model"`.
//! - Function calls carry no id; ids are generated locally on parse.
//! - Tool results are `functionResponse` parts grouped into one user turn.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{ImageRef, embedded_error, split_user_content};
use crate::error::{ChatError, Result};
use crate::message::{Message, Role, ToolCall};
use crate::provider::{CompletionRequest, ParsedResponse, TokenUsage};
use crate::tool::ToolDefinition;

/// Schema keywords the function-declaration dialect rejects
const UNSUPPORTED_SCHEMA_KEYS: [&str; 2] = ["$schema", "additionalProperties"];

// ── Request types ───────────────────────────────────────

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest {
    contents: Vec<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<SystemInstruction>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<GeminiTool>,
}

#[derive(Debug, Serialize)]
struct Content {
    role: &'static str,
    parts: Vec<Part>,
}

#[derive(Debug, Serialize)]
struct SystemInstruction {
    parts: Vec<Part>,
}

/// One part; exactly one field is set
#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Part {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    inline_data: Option<InlineData>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    function_call: Option<FunctionCall>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    function_response: Option<FunctionResponse>,
}

impl Part {
    fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            ..Default::default()
        }
    }

    fn is_function_response(&self) -> bool {
        self.function_response.is_some()
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InlineData {
    mime_type: String,
    data: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct FunctionCall {
    name: String,
    #[serde(default)]
    args: Value,
}

#[derive(Debug, Serialize, Deserialize)]
struct FunctionResponse {
    name: String,
    response: Value,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiTool {
    function_declarations: Vec<FunctionDeclaration>,
}

#[derive(Debug, Serialize)]
struct FunctionDeclaration {
    name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    parameters: Option<Value>,
}

// ── Response types ──────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    usage_metadata: Option<UsageMetadata>,
    #[serde(default)]
    prompt_feedback: Option<PromptFeedback>,
    #[serde(default)]
    error: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UsageMetadata {
    #[serde(default)]
    prompt_token_count: u32,
    #[serde(default)]
    candidates_token_count: u32,
    #[serde(default)]
    total_token_count: u32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    #[serde(default)]
    block_reason: Option<String>,
}

// ── Translation ─────────────────────────────────────────

pub(super) fn build_request(request: &CompletionRequest<'_>) -> Result<Value> {
    // One instruction only: the configured prompt leads, then the first
    // system message of the history. Later ones are dropped.
    let system_text = request
        .system_prompt
        .map(str::to_string)
        .into_iter()
        .chain(request.messages.iter().filter(|m| m.is_instruction()).map(Message::text))
        .find(|text| !text.trim().is_empty());

    let mut contents: Vec<Content> = Vec::with_capacity(request.messages.len());
    for msg in request.messages {
        match msg.role {
            Role::System => {}
            Role::User => contents.push(Content {
                role: "user",
                parts: user_parts(msg),
            }),
            Role::Assistant => contents.push(Content {
                role: "model",
                parts: model_parts(msg),
            }),
            Role::Tool => {
                let part = Part {
                    function_response: Some(FunctionResponse {
                        name: msg.tool_name.clone().unwrap_or_default(),
                        response: serde_json::json!({ "content": msg.text() }),
                    }),
                    ..Default::default()
                };
                // Results answering one model turn share a single user turn.
                match contents.last_mut() {
                    Some(last) if last.parts.iter().all(Part::is_function_response) && !last.parts.is_empty() => {
                        last.parts.push(part);
                    }
                    _ => contents.push(Content {
                        role: "user",
                        parts: vec![part],
                    }),
                }
            }
        }
    }

    let declarations: Vec<FunctionDeclaration> = request.tools.iter().map(translate_tool).collect();
    let tools = if declarations.is_empty() {
        Vec::new()
    } else {
        vec![GeminiTool {
            function_declarations: declarations,
        }]
    };

    let body = GenerateRequest {
        contents,
        system_instruction: system_text.map(|text| SystemInstruction {
            parts: vec![Part::text(text)],
        }),
        tools,
    };

    Ok(serde_json::to_value(&body)?)
}

fn user_parts(msg: &Message) -> Vec<Part> {
    let content = split_user_content(msg);
    let mut text = content.text;
    let mut images = Vec::new();

    for image in content.images {
        match image {
            ImageRef::Inline { mime_type, data } => images.push(Part {
                inline_data: Some(InlineData { mime_type, data }),
                ..Default::default()
            }),
            ImageRef::Remote(url) => text.push_str(&format!("\n[Image: {url}]")),
        }
    }

    let mut parts = Vec::with_capacity(images.len() + 1);
    if !text.is_empty() || images.is_empty() {
        parts.push(Part::text(text));
    }
    parts.extend(images);
    parts
}

fn model_parts(msg: &Message) -> Vec<Part> {
    let text = msg.text();
    let mut parts = Vec::new();
    if !text.is_empty() {
        parts.push(Part::text(text));
    }

    for call in &msg.tool_calls {
        let args = call
            .parse_arguments()
            .unwrap_or_else(|_| Value::Object(serde_json::Map::new()));
        parts.push(Part {
            function_call: Some(FunctionCall {
                name: call.name.clone(),
                args,
            }),
            ..Default::default()
        });
    }

    if parts.is_empty() {
        parts.push(Part::text(""));
    }
    parts
}

fn translate_tool(tool: &ToolDefinition) -> FunctionDeclaration {
    let mut schema = tool.parameter_schema.clone();
    sanitize_schema(&mut schema);

    let has_properties = schema
        .get("properties")
        .and_then(Value::as_object)
        .is_some_and(|props| !props.is_empty());

    FunctionDeclaration {
        name: tool.name.clone(),
        description: tool.description.clone(),
        parameters: has_properties.then_some(schema),
    }
}

/// Strip keywords the function-declaration schema dialect rejects
fn sanitize_schema(schema: &mut Value) {
    match schema {
        Value::Object(map) => {
            for key in UNSUPPORTED_SCHEMA_KEYS {
                map.remove(key);
            }
            map.values_mut().for_each(sanitize_schema);
        }
        Value::Array(items) => items.iter_mut().for_each(sanitize_schema),
        _ => {}
    }
}

pub(super) fn parse_response(raw: &Value) -> Result<ParsedResponse> {
    let resp: GenerateResponse = serde_json::from_value(raw.clone())?;

    if let Some(error) = resp.error {
        return Err(embedded_error(&error));
    }

    let Some(candidate) = resp.candidates.into_iter().next() else {
        let reason = resp
            .prompt_feedback
            .and_then(|f| f.block_reason)
            .map_or_else(|| "response has no candidates".to_string(), |r| format!("prompt was blocked ({r})"));
        return Err(ChatError::malformed(reason));
    };

    let mut parsed = ParsedResponse::default();
    for part in candidate.content.map(|c| c.parts).unwrap_or_default() {
        if let Some(text) = part.text {
            parsed.text.push_str(&text);
        }
        if let Some(call) = part.function_call {
            let arguments = if call.args.is_null() {
                String::new()
            } else {
                call.args.to_string()
            };
            parsed
                .tool_calls
                .push(ToolCall::new(ToolCall::generate_id(), call.name, arguments));
        }
        if let Some(image) = part.inline_data {
            parsed
                .images
                .push(format!("data:{};base64,{}", image.mime_type, image.data));
        }
    }

    parsed.usage = resp.usage_metadata.map(|u| TokenUsage {
        prompt_tokens: u.prompt_token_count,
        completion_tokens: u.candidates_token_count,
        total_tokens: u.total_token_count,
    });

    Ok(parsed)
}
