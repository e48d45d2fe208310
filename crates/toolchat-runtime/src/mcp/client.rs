//! Tool server client
//!
//! JSON-RPC over HTTP POST. Both transports (`streamable-http` and `sse`)
//! share the envelope; a response framed as `text/event-stream` is unwrapped
//! from its last `data:` line. Each call has exactly one outstanding request;
//! responses are never multiplexed.

use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use serde_json::Value;
use toolchat_core::{
    error::{ChatError, FailureSignal, Result},
    tool::{AuthKind, ToolDefinition, ToolExecutor, ToolServerConnection, TransportKind},
};
use tracing::{debug, info, warn};

use super::protocol::{
    McpRequest, McpResponse, McpTool, event_stream_payload, flatten_result, looks_like_event_stream,
};
use crate::http::{parse_json, parse_url, read_body, transport_error};

/// Client for JSON-RPC tool servers
#[derive(Debug)]
pub struct McpClient {
    http: reqwest::Client,
    /// Request ID counter
    next_id: AtomicU64,
}

impl Default for McpClient {
    fn default() -> Self {
        Self::new(reqwest::Client::new())
    }
}

impl McpClient {
    pub fn new(http: reqwest::Client) -> Self {
        Self {
            http,
            next_id: AtomicU64::new(1),
        }
    }

    fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::SeqCst)
    }

    /// Send one request; yields the `result` member, or a bare JSON array body
    async fn send_request(&self, connection: &ToolServerConnection, request: McpRequest) -> Result<Value> {
        let url = parse_url(&connection.url)?;
        debug!(server = %connection.id, method = %request.method, id = request.id, "Tool server request");

        let mut builder = self
            .http
            .post(url)
            .header(ACCEPT, "application/json, text/event-stream")
            .json(&request);
        if let Some(token) = connection.bearer_token() {
            builder = builder.bearer_auth(token);
        }

        let response = builder.send().await.map_err(|e| transport_error(&e))?;
        let event_stream = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v.starts_with("text/event-stream"));

        let body = read_body(response).await?;
        let payload = if event_stream || looks_like_event_stream(&body) {
            event_stream_payload(&body).ok_or_else(|| ChatError::malformed("event stream carried no data"))?
        } else {
            body.as_str()
        };

        let value = parse_json(payload)?;
        if value.is_array() {
            return Ok(value);
        }

        let response: McpResponse = serde_json::from_value(value)?;
        if let Some(err) = response.error {
            return Err(FailureSignal::RpcError {
                code: err.code,
                message: err.message,
            }
            .into());
        }

        response
            .result
            .ok_or_else(|| ChatError::malformed("JSON-RPC response has neither result nor error"))
    }

    /// `tools/list`
    pub async fn list_tools(&self, connection: &ToolServerConnection) -> Result<Vec<ToolDefinition>> {
        let result = self.send_request(connection, McpRequest::list_tools(self.next_id())).await?;

        let tools = if result.is_array() {
            result
        } else {
            result
                .get("tools")
                .cloned()
                .ok_or_else(|| ChatError::malformed("tools/list result has no tools"))?
        };

        let tools: Vec<McpTool> = serde_json::from_value(tools)?;
        debug!(server = %connection.id, count = tools.len(), "Tool server advertised tools");
        Ok(tools.into_iter().map(ToolDefinition::from).collect())
    }

    /// `tools/call`, flattened to text
    pub async fn call_tool(
        &self,
        connection: &ToolServerConnection,
        name: &str,
        arguments: Value,
    ) -> Result<String> {
        let result = self
            .send_request(connection, McpRequest::call_tool(self.next_id(), name, arguments))
            .await?;

        if result.get("isError").and_then(Value::as_bool) == Some(true) {
            warn!(tool = name, server = %connection.id, "Tool reported an error result");
        }

        Ok(flatten_result(&result))
    }

    /// Discover tools and move `connection` to `connected`, or to `error`
    /// carrying the classified message.
    pub async fn connect(&self, connection: &mut ToolServerConnection) -> Result<()> {
        connection.mark_connecting();
        match self.list_tools(connection).await {
            Ok(tools) => {
                info!(server = %connection.id, url = %connection.url, tools = tools.len(), "Connected to tool server");
                connection.mark_connected(tools);
                Ok(())
            }
            Err(err) => {
                warn!(server = %connection.id, url = %connection.url, error = %err, "Tool server connection failed");
                connection.mark_error(err.user_message());
                Err(err)
            }
        }
    }

    /// Connect to a tool server and return the tools it offers
    pub async fn connect_to_tools(
        &self,
        url: &str,
        transport: TransportKind,
        auth: AuthKind,
        token: &str,
    ) -> Result<Vec<ToolDefinition>> {
        let mut connection = ToolServerConnection::new(url, transport, auth, token);
        self.connect(&mut connection).await?;
        Ok(connection.tools)
    }
}

#[async_trait]
impl ToolExecutor for McpClient {
    async fn call_tool(
        &self,
        connection: &ToolServerConnection,
        name: &str,
        arguments: Value,
    ) -> Result<String> {
        Self::call_tool(self, connection, name, arguments).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use toolchat_core::error::ErrorKind;
    use toolchat_core::tool::ConnectionState;
    use wiremock::matchers::{body_partial_json, header, method};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn connection(server: &MockServer) -> ToolServerConnection {
        ToolServerConnection::new(server.uri(), TransportKind::StreamableHttp, AuthKind::Bearer, "tok")
    }

    fn rpc_result(result: Value) -> ResponseTemplate {
        ResponseTemplate::new(200).set_body_json(serde_json::json!({"jsonrpc": "2.0", "id": 1, "result": result}))
    }

    #[tokio::test]
    async fn test_connect_discovers_tools() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(header("authorization", "Bearer tok"))
            .and(body_partial_json(serde_json::json!({"method": "tools/list"})))
            .respond_with(rpc_result(serde_json::json!({"tools": [
                {"name": "search", "description": "Web search", "inputSchema": {"type": "object", "properties": {"q": {"type": "string"}}}},
                {"name": "ping"}
            ]})))
            .mount(&server)
            .await;

        let mut conn = connection(&server);
        McpClient::default().connect(&mut conn).await.unwrap();

        assert_eq!(conn.state, ConnectionState::Connected);
        assert_eq!(conn.tools.len(), 2);
        assert_eq!(conn.tools[0].description.as_deref(), Some("Web search"));
        assert_eq!(conn.tools[1].parameter_schema["type"], "object");
        assert!(conn.enabled_tools.contains("ping"));
    }

    #[tokio::test]
    async fn test_event_stream_and_bare_array() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(
                "event: message\ndata: [{\"name\": \"echo\"}]\n\n",
                "text/event-stream",
            ))
            .mount(&server)
            .await;

        let tools = McpClient::default()
            .connect_to_tools(&server.uri(), TransportKind::Sse, AuthKind::None, "")
            .await
            .unwrap();
        assert_eq!(tools[0].name, "echo");
    }

    #[tokio::test]
    async fn test_mislabelled_event_stream_is_unwrapped() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                "event: message\ndata: {\"jsonrpc\": \"2.0\", \"id\": 1, \"result\": {\"content\": [{\"type\": \"text\", \"text\": \"pong\"}]}}\n\n",
            ))
            .mount(&server)
            .await;

        let text = McpClient::default()
            .call_tool(&connection(&server), "ping", serde_json::json!({}))
            .await
            .unwrap();
        assert_eq!(text, "pong");
    }

    #[tokio::test]
    async fn test_missing_tools_is_protocol_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(rpc_result(serde_json::json!({"resources": []})))
            .mount(&server)
            .await;

        let mut conn = connection(&server);
        let err = McpClient::default().connect(&mut conn).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Protocol);
        assert_eq!(conn.state, ConnectionState::Error);
        assert!(conn.last_error.is_some());
    }

    #[tokio::test]
    async fn test_call_tool_flattens_content() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_partial_json(serde_json::json!({
                "method": "tools/call",
                "params": {"name": "search", "arguments": {"q": "x"}}
            })))
            .respond_with(rpc_result(serde_json::json!({"content": [
                {"type": "text", "text": "result-text"},
                {"type": "text", "text": "more"}
            ]})))
            .mount(&server)
            .await;

        let text = McpClient::default()
            .call_tool(&connection(&server), "search", serde_json::json!({"q": "x"}))
            .await
            .unwrap();
        assert_eq!(text, "result-text\nmore");
    }

    #[tokio::test]
    async fn test_rpc_error_surfaces_message() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "jsonrpc": "2.0", "id": 1,
                "error": {"code": -32601, "message": "Method not found"}
            })))
            .mount(&server)
            .await;

        let err = McpClient::default()
            .call_tool(&connection(&server), "search", serde_json::json!({}))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert!(err.user_message().contains("Method not found"));
    }

    #[tokio::test]
    async fn test_http_failure_carries_status_and_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503).set_body_string("maintenance"))
            .mount(&server)
            .await;

        let err = McpClient::default()
            .call_tool(&connection(&server), "search", serde_json::json!({}))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Server);
        assert!(err.user_message().contains("503"));
        assert!(err.user_message().contains("maintenance"));
    }

    #[tokio::test]
    async fn test_request_ids_are_fresh() {
        let client = McpClient::default();
        let first = client.next_id();
        assert_eq!(client.next_id(), first + 1);
    }
}
