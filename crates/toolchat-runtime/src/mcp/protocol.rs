//! Tool server wire protocol types
//!
//! JSON-RPC 2.0 envelopes for `tools/list` and `tools/call`.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use toolchat_core::tool::ToolDefinition;

/// JSON-RPC request to a tool server
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct McpRequest {
    pub jsonrpc: String,
    pub id: u64,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl McpRequest {
    pub fn new(id: u64, method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            method: method.into(),
            params,
        }
    }

    pub fn list_tools(id: u64) -> Self {
        Self::new(id, "tools/list", None)
    }

    pub fn call_tool(id: u64, name: impl Into<String>, arguments: Value) -> Self {
        Self::new(
            id,
            "tools/call",
            Some(serde_json::json!({
                "name": name.into(),
                "arguments": arguments
            })),
        )
    }
}

/// JSON-RPC response from a tool server
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct McpResponse {
    #[serde(default)]
    pub jsonrpc: Option<String>,
    #[serde(default)]
    pub id: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<McpError>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct McpError {
    pub code: i64,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// Tool as advertised by `tools/list`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct McpTool {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(rename = "inputSchema", default)]
    pub input_schema: Value,
}

impl From<McpTool> for ToolDefinition {
    fn from(tool: McpTool) -> Self {
        Self::new(tool.name, tool.description, tool.input_schema)
    }
}

/// Flatten a `tools/call` result to text.
///
/// `content` parts are joined with newlines, using each part's `text` or,
/// for non-text parts, the part's JSON. Anything else is serialized whole.
pub fn flatten_result(result: &Value) -> String {
    match result.get("content").and_then(Value::as_array) {
        Some(parts) => parts
            .iter()
            .map(|part| {
                part.get("text")
                    .and_then(Value::as_str)
                    .map_or_else(|| part.to_string(), str::to_string)
            })
            .collect::<Vec<_>>()
            .join("\n"),
        None => result.to_string(),
    }
}

/// Payload of the last `data:` line of an event-stream body
/// Whether a body is event-stream framed, for servers that mislabel it
pub fn looks_like_event_stream(body: &str) -> bool {
    let body = body.trim_start();
    body.starts_with("event:") || body.starts_with("data:")
}

pub fn event_stream_payload(body: &str) -> Option<&str> {
    body.lines()
        .filter_map(|line| line.strip_prefix("data:"))
        .map(str::trim)
        .filter(|data| !data.is_empty())
        .last()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_looks_like_event_stream() {
        assert!(looks_like_event_stream("event: message\ndata: {}\n\n"));
        assert!(looks_like_event_stream("\ndata: {}"));
        assert!(!looks_like_event_stream(r#"{"jsonrpc": "2.0"}"#));
    }

    #[test]
    fn test_flatten_mixed_parts() {
        let result = serde_json::json!({"content": [
            {"type": "text", "text": "line one"},
            {"type": "image", "data": "AAAA", "mimeType": "image/png"},
            {"type": "text", "text": "line two"}
        ]});
        let flat = flatten_result(&result);
        let lines: Vec<_> = flat.lines().collect();
        assert_eq!(lines[0], "line one");
        assert!(lines[1].contains("\"mimeType\":\"image/png\""));
        assert_eq!(lines[2], "line two");
    }

    #[test]
    fn test_flatten_without_content() {
        assert_eq!(flatten_result(&serde_json::json!({"value": 4})), r#"{"value":4}"#);
    }

    #[test]
    fn test_event_stream_payload() {
        let body = "event: message\ndata: {\"a\":1}\n\nevent: message\ndata: {\"b\":2}\n\n";
        assert_eq!(event_stream_payload(body), Some("{\"b\":2}"));
        assert_eq!(event_stream_payload("event: ping\n\n"), None);
    }

    #[test]
    fn test_call_tool_request_shape() {
        let request = McpRequest::call_tool(7, "search", serde_json::json!({"q": "x"}));
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["jsonrpc"], "2.0");
        assert_eq!(json["method"], "tools/call");
        assert_eq!(json["params"]["arguments"]["q"], "x");
    }
}
