//! Tool System
//!
//! Tool servers are remote JSON-RPC endpoints. Each configured server is a
//! [`ToolServerConnection`] caching the tools it advertised; the orchestration
//! loop reads a snapshot of the connections through a [`ToolCatalog`] and
//! dispatches approved calls through a [`ToolExecutor`].

use std::collections::BTreeSet;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::Result;

/// Tool definition schema (for LLM function calling)
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// Unique tool identifier
    pub name: String,

    /// Human-readable description (shown to LLM)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// JSON Schema of the arguments object
    #[serde(default = "empty_object_schema")]
    pub parameter_schema: serde_json::Value,
}

fn empty_object_schema() -> serde_json::Value {
    serde_json::json!({ "type": "object", "properties": {} })
}

impl ToolDefinition {
    pub fn new(name: impl Into<String>, description: Option<String>, parameter_schema: serde_json::Value) -> Self {
        Self {
            name: name.into(),
            description,
            parameter_schema: if parameter_schema.is_null() {
                empty_object_schema()
            } else {
                parameter_schema
            },
        }
    }
}

/// HTTP transport flavour; both share the JSON-RPC envelope
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TransportKind {
    #[default]
    StreamableHttp,
    Sse,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthKind {
    #[default]
    None,
    Bearer,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    #[default]
    Idle,
    Connecting,
    Connected,
    Error,
}

/// One configured tool server and the tools it advertised
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ToolServerConnection {
    pub id: String,
    pub url: String,
    #[serde(default)]
    pub transport: TransportKind,
    #[serde(default)]
    pub auth: AuthKind,
    #[serde(default, skip_serializing)]
    pub auth_token: String,
    #[serde(default)]
    pub state: ConnectionState,
    /// Message captured on the last failed connect
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    #[serde(default)]
    pub tools: Vec<ToolDefinition>,
    #[serde(default)]
    pub enabled_tools: BTreeSet<String>,
}

impl ToolServerConnection {
    /// Create an idle connection
    pub fn new(
        url: impl Into<String>,
        transport: TransportKind,
        auth: AuthKind,
        auth_token: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            url: url.into(),
            transport,
            auth,
            auth_token: auth_token.into(),
            state: ConnectionState::Idle,
            last_error: None,
            tools: Vec::new(),
            enabled_tools: BTreeSet::new(),
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    /// Bearer token to send, if any
    pub fn bearer_token(&self) -> Option<&str> {
        match self.auth {
            AuthKind::Bearer if !self.auth_token.is_empty() => Some(&self.auth_token),
            AuthKind::Bearer | AuthKind::None => None,
        }
    }

    pub fn mark_connecting(&mut self) {
        self.state = ConnectionState::Connecting;
        self.last_error = None;
    }

    /// Cache discovered tools; all of them start enabled
    pub fn mark_connected(&mut self, tools: Vec<ToolDefinition>) {
        self.enabled_tools = tools.iter().map(|t| t.name.clone()).collect();
        self.tools = tools;
        self.state = ConnectionState::Connected;
        self.last_error = None;
    }

    pub fn mark_error(&mut self, message: impl Into<String>) {
        self.state = ConnectionState::Error;
        self.last_error = Some(message.into());
        self.tools.clear();
        self.enabled_tools.clear();
    }

    pub fn disconnect(&mut self) {
        self.state = ConnectionState::Idle;
        self.last_error = None;
        self.tools.clear();
        self.enabled_tools.clear();
    }

    /// Toggle a discovered tool; returns false for unknown names
    pub fn set_tool_enabled(&mut self, name: &str, enabled: bool) -> bool {
        if !self.tools.iter().any(|t| t.name == name) {
            return false;
        }
        if enabled {
            self.enabled_tools.insert(name.to_string());
        } else {
            self.enabled_tools.remove(name);
        }
        true
    }

    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected
    }

    /// Enabled tools of a connected server, in advertised order
    pub fn enabled_definitions(&self) -> impl Iterator<Item = &ToolDefinition> {
        self.tools
            .iter()
            .filter(|t| self.is_connected() && self.enabled_tools.contains(&t.name))
    }
}

/// Read-only view over the enabled tools of a connection snapshot
#[derive(Clone, Copy, Debug)]
pub struct ToolCatalog<'a> {
    connections: &'a [ToolServerConnection],
}

impl<'a> ToolCatalog<'a> {
    pub const fn new(connections: &'a [ToolServerConnection]) -> Self {
        Self { connections }
    }

    /// Definitions offered to the model; first server wins on duplicate names
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        let mut seen = BTreeSet::new();
        self.connections
            .iter()
            .flat_map(ToolServerConnection::enabled_definitions)
            .filter(|t| seen.insert(t.name.as_str()))
            .cloned()
            .collect()
    }

    /// Server hosting an enabled tool with this name
    pub fn resolve(&self, name: &str) -> Option<&'a ToolServerConnection> {
        self.connections
            .iter()
            .find(|c| c.enabled_definitions().any(|t| t.name == name))
    }
}

/// Executes an approved tool call on a remote server
#[async_trait]
pub trait ToolExecutor: Send + Sync {
    /// Run `name` on `connection`, returning the flattened textual result
    async fn call_tool(
        &self,
        connection: &ToolServerConnection,
        name: &str,
        arguments: serde_json::Value,
    ) -> Result<String>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn connected(id: &str, names: &[&str]) -> ToolServerConnection {
        let mut conn = ToolServerConnection::new("http://tools", TransportKind::StreamableHttp, AuthKind::None, "")
            .with_id(id);
        conn.mark_connected(
            names
                .iter()
                .map(|n| ToolDefinition::new(*n, None, serde_json::Value::Null))
                .collect(),
        );
        conn
    }

    #[test]
    fn test_connection_lifecycle() {
        let mut conn = ToolServerConnection::new("http://tools", TransportKind::Sse, AuthKind::Bearer, "tok");
        assert_eq!(conn.state, ConnectionState::Idle);
        assert_eq!(conn.bearer_token(), Some("tok"));

        conn.mark_connecting();
        assert_eq!(conn.state, ConnectionState::Connecting);

        conn.mark_connected(vec![ToolDefinition::new("search", None, serde_json::Value::Null)]);
        assert!(conn.is_connected());
        assert!(conn.enabled_tools.contains("search"));

        conn.disconnect();
        assert_eq!(conn.state, ConnectionState::Idle);
        assert!(conn.tools.is_empty());
        assert!(conn.enabled_tools.is_empty());
    }

    #[test]
    fn test_error_captures_message() {
        let mut conn = ToolServerConnection::new("http://tools", TransportKind::Sse, AuthKind::None, "");
        conn.mark_error("connection refused");
        assert_eq!(conn.state, ConnectionState::Error);
        assert_eq!(conn.last_error.as_deref(), Some("connection refused"));
    }

    #[test]
    fn test_catalog_respects_enabled_set() {
        let mut a = connected("a", &["search", "fetch"]);
        let b = connected("b", &["search", "math"]);
        assert!(a.set_tool_enabled("fetch", false));
        assert!(!a.set_tool_enabled("missing", true));

        let connections = vec![a, b];
        let catalog = ToolCatalog::new(&connections);
        let names: Vec<_> = catalog.definitions().into_iter().map(|t| t.name).collect();

        assert_eq!(names, vec!["search", "math"]);
        assert_eq!(catalog.resolve("search").map(|c| c.id.as_str()), Some("a"));
        assert!(catalog.resolve("fetch").is_none());
    }

    #[test]
    fn test_idle_connection_offers_nothing() {
        let mut conn = connected("a", &["search"]);
        conn.state = ConnectionState::Idle;
        let connections = [conn];
        let catalog = ToolCatalog::new(&connections);
        assert!(catalog.definitions().is_empty());
        assert!(catalog.resolve("search").is_none());
    }
}
