//! HTTP/WebSocket Handlers

use axum::{
    Json,
    extract::{
        Path, State, WebSocketUpgrade,
        ws::{Message as WsMessage, WebSocket},
    },
    http::StatusCode,
    response::Response,
};
use futures::{SinkExt, StreamExt, stream::SplitSink};
use serde::{Deserialize, Serialize};

use toolchat_core::{
    ApprovalChannel, ApprovalRequest, Attachment, CancellationToken, ChatError, ErrorKind, Message,
    PendingApproval, ProviderConfig, ProviderId, Session, SessionId, ToolServerConnection, TurnStatus,
    UserInput,
    tool::{AuthKind, TransportKind},
};

use crate::state::AppState;

// ============================================================================
// Response Types
// ============================================================================

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub tool_servers: usize,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

pub type ApiError = (StatusCode, Json<ErrorResponse>);

fn api_error(err: &ChatError) -> ApiError {
    let status = match err.kind() {
        ErrorKind::Configuration => StatusCode::BAD_REQUEST,
        ErrorKind::Auth => StatusCode::UNAUTHORIZED,
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::ToolDenied => StatusCode::FORBIDDEN,
        ErrorKind::TurnBudgetExceeded => StatusCode::UNPROCESSABLE_ENTITY,
        ErrorKind::Transport | ErrorKind::Server | ErrorKind::Protocol => StatusCode::BAD_GATEWAY,
    };
    (
        status,
        Json(ErrorResponse {
            error: err.user_message(),
            code: err.kind().code().into(),
        }),
    )
}

fn not_found(what: impl Into<String>) -> ApiError {
    api_error(&ChatError::NotFound(what.into()))
}

#[derive(Debug, Deserialize)]
pub struct ModelsRequest {
    pub provider: ProviderId,
    #[serde(default)]
    pub credential: String,
    #[serde(default)]
    pub base_url: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ModelsResponse {
    pub models: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct ConnectRequest {
    pub url: String,
    #[serde(default)]
    pub transport: TransportKind,
    #[serde(default)]
    pub auth: AuthKind,
    #[serde(default)]
    pub token: String,
}

#[derive(Debug, Deserialize)]
pub struct ToggleToolRequest {
    pub tool: String,
    pub enabled: bool,
}

// ============================================================================
// REST Handlers
// ============================================================================

/// Health check endpoint
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
        tool_servers: state.tools.read().await.len(),
    })
}

/// Model discovery; falls back to a static list and never errors
pub async fn list_models(
    State(state): State<AppState>,
    Json(payload): Json<ModelsRequest>,
) -> Json<ModelsResponse> {
    let models = state
        .provider
        .list_models(payload.provider, &payload.credential, payload.base_url.as_deref())
        .await;
    Json(ModelsResponse { models })
}

pub async fn list_tool_servers(State(state): State<AppState>) -> Json<Vec<ToolServerConnection>> {
    Json(state.tool_snapshot().await)
}

/// Connect a tool server; it is kept in the list even when the connect fails
pub async fn connect_tool_server(
    State(state): State<AppState>,
    Json(payload): Json<ConnectRequest>,
) -> Result<(StatusCode, Json<ToolServerConnection>), ApiError> {
    let mut connection = ToolServerConnection::new(payload.url, payload.transport, payload.auth, payload.token);
    let result = state.mcp.connect(&mut connection).await;
    state.tools.write().await.push(connection.clone());

    match result {
        Ok(()) => Ok((StatusCode::CREATED, Json(connection))),
        Err(err) => Err(api_error(&err)),
    }
}

pub async fn disconnect_tool_server(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let mut tools = state.tools.write().await;
    let before = tools.len();
    tools.retain(|conn| conn.id != id);

    if tools.len() == before {
        return Err(not_found(format!("Tool server '{id}' is not configured")));
    }
    tracing::info!(server = %id, "Tool server removed");
    Ok(StatusCode::NO_CONTENT)
}

/// Enable or disable one tool; applies from the next message on
pub async fn set_tool_enabled(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(payload): Json<ToggleToolRequest>,
) -> Result<Json<ToolServerConnection>, ApiError> {
    let mut tools = state.tools.write().await;
    let connection = tools
        .iter_mut()
        .find(|conn| conn.id == id)
        .ok_or_else(|| not_found(format!("Tool server '{id}' is not configured")))?;

    if !connection.set_tool_enabled(&payload.tool, payload.enabled) {
        return Err(not_found(format!("Tool '{}' is not offered by server '{id}'", payload.tool)));
    }
    Ok(Json(connection.clone()))
}

pub async fn get_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Session>, ApiError> {
    state
        .sessions
        .load(&SessionId::from_string(id.clone()))
        .map_err(|e| api_error(&e))?
        .map(Json)
        .ok_or_else(|| not_found(format!("Session '{id}' does not exist")))
}

// ============================================================================
// WebSocket chat
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientFrame {
    Send {
        #[serde(default)]
        session_id: Option<String>,
        provider: ProviderConfig,
        text: String,
        #[serde(default)]
        attachments: Vec<Attachment>,
    },
    Approval {
        call_id: String,
        approved: bool,
    },
    Cancel,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerFrame {
    ApprovalRequest {
        request: ApprovalRequest,
    },
    Message {
        session_id: String,
        message: Box<Message>,
    },
    Done {
        session_id: String,
        status: &'static str,
        turns: usize,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<ErrorResponse>,
    },
    Error(ErrorResponse),
}

impl ServerFrame {
    fn error(code: &str, error: impl Into<String>) -> Self {
        Self::Error(ErrorResponse {
            error: error.into(),
            code: code.into(),
        })
    }
}

type WsSink = SplitSink<WebSocket, WsMessage>;

/// WebSocket chat
pub async fn chat_ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let (mut sender, mut receiver) = socket.split();

    while let Some(msg) = receiver.next().await {
        let text = match msg {
            Ok(WsMessage::Text(text)) => text,
            Ok(WsMessage::Close(_)) => break,
            Err(e) => {
                tracing::error!("WebSocket error: {}", e);
                break;
            }
            _ => continue,
        };

        let frame = match serde_json::from_str::<ClientFrame>(&text) {
            Ok(frame) => frame,
            Err(e) => {
                if !send_frame(&mut sender, &ServerFrame::error("INVALID_FRAME", e.to_string())).await {
                    break;
                }
                continue;
            }
        };

        let open = match frame {
            ClientFrame::Send {
                session_id,
                provider,
                text,
                attachments,
            } => {
                let input = UserInput::new(text).with_attachments(attachments);
                let session_id = session_id.map(SessionId::from_string).unwrap_or_default();
                run_turn(&state, session_id, &provider, input, &mut sender, &mut receiver).await
            }
            ClientFrame::Approval { .. } | ClientFrame::Cancel => {
                send_frame(&mut sender, &ServerFrame::error("NOTHING_PENDING", "No message is in flight")).await
            }
        };

        if !open {
            break;
        }
    }
}

/// Run one orchestration call, relaying approvals over the socket.
///
/// Returns false once the socket is gone.
async fn run_turn(
    state: &AppState,
    session_id: SessionId,
    provider: &ProviderConfig,
    input: UserInput,
    sender: &mut WsSink,
    receiver: &mut futures::stream::SplitStream<WebSocket>,
) -> bool {
    let Some(_guard) = state.begin_session(&session_id) else {
        return send_frame(
            sender,
            &ServerFrame::error("SESSION_BUSY", "A message is already in flight for this session"),
        )
        .await;
    };

    let mut session = match state.sessions.load(&session_id) {
        Ok(session) => session.unwrap_or_else(|| Session::with_id(session_id.clone())),
        Err(err) => return send_frame(sender, &ServerFrame::error(err.kind().code(), err.user_message())).await,
    };

    let connections = state.tool_snapshot().await;
    let (gate, mut approvals) = ApprovalChannel::new(1);
    let cancel = CancellationToken::new();
    let mut open = true;

    let outcome = {
        let run = state.orchestrator.send_message(
            provider,
            &session.history,
            input,
            &connections,
            &gate,
            Some(&cancel),
        );
        tokio::pin!(run);
        let mut pending: Option<PendingApproval> = None;

        loop {
            tokio::select! {
                outcome = &mut run => break outcome,
                Some(request) = approvals.recv() => {
                    let frame = ServerFrame::ApprovalRequest { request: request.request.clone() };
                    pending = Some(request);
                    if !send_frame(sender, &frame).await {
                        open = false;
                        cancel.cancel();
                    }
                }
                msg = receiver.next(), if open => match client_frame(msg) {
                    None => {
                        open = false;
                        cancel.cancel();
                    }
                    Some(Ok(ClientFrame::Approval { call_id, approved })) => {
                        match pending.take() {
                            Some(p) if p.request.call_id == call_id => p.respond(approved),
                            other => {
                                pending = other;
                                open = send_frame(sender, &ServerFrame::error("UNKNOWN_CALL", format!("No approval pending for '{call_id}'"))).await;
                            }
                        }
                    }
                    Some(Ok(ClientFrame::Cancel)) => cancel.cancel(),
                    Some(Ok(ClientFrame::Send { .. })) => {
                        open = send_frame(sender, &ServerFrame::error("SESSION_BUSY", "A message is already in flight")).await;
                    }
                    Some(Err(error)) => {
                        open = send_frame(sender, &ServerFrame::error("INVALID_FRAME", error)).await;
                    }
                },
            }

            if !open {
                cancel.cancel();
            }
        }
    };

    session.extend(outcome.messages.iter().cloned());
    if let Err(err) = state.sessions.save(&session) {
        tracing::error!(session = %session.id, error = %err, "Failed to save session");
    }

    if !open {
        return false;
    }

    for message in outcome.messages {
        let frame = ServerFrame::Message {
            session_id: session.id.to_string(),
            message: Box::new(message),
        };
        if !send_frame(sender, &frame).await {
            return false;
        }
    }

    let (status, error) = match &outcome.status {
        TurnStatus::Completed => ("completed", None),
        TurnStatus::TurnBudgetExceeded => ("turn_budget_exceeded", None),
        TurnStatus::Cancelled => ("cancelled", None),
        TurnStatus::Failed(err) => ("failed", Some(api_error(err).1.0)),
    };

    send_frame(
        sender,
        &ServerFrame::Done {
            session_id: session.id.to_string(),
            status,
            turns: outcome.turns,
            error,
        },
    )
    .await
}

/// Decode the next socket frame; `None` when the socket closed
fn client_frame(
    msg: Option<Result<WsMessage, axum::Error>>,
) -> Option<Result<ClientFrame, String>> {
    match msg? {
        Ok(WsMessage::Text(text)) => Some(serde_json::from_str(&text).map_err(|e| e.to_string())),
        Ok(WsMessage::Close(_)) | Err(_) => None,
        Ok(_) => Some(Err("Expected a text frame".into())),
    }
}

async fn send_frame(sender: &mut WsSink, frame: &ServerFrame) -> bool {
    match serde_json::to_string(frame) {
        Ok(json) => sender.send(WsMessage::Text(json.into())).await.is_ok(),
        Err(e) => {
            tracing::error!("Failed to encode frame: {}", e);
            true
        }
    }
}

#[cfg(test)]
mod tests {
    use axum::body::{Body, to_bytes};
    use axum::http::Request;
    use serde_json::Value;
    use tower::ServiceExt;
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;
    use crate::config::ServerConfig;

    fn state() -> AppState {
        AppState::new(&ServerConfig::default()).unwrap()
    }

    async fn call(state: &AppState, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let request = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(body) => request
                .header("content-type", "application/json")
                .body(Body::from(body.to_string())),
            None => request.body(Body::empty()),
        }
        .unwrap();

        let response = crate::app(state.clone()).oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, json)
    }

    async fn tool_server() -> MockServer {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "jsonrpc": "2.0", "id": 1,
                "result": {"tools": [{"name": "search"}, {"name": "fetch"}]}
            })))
            .mount(&server)
            .await;
        server
    }

    #[tokio::test]
    async fn test_health() {
        let (status, body) = call(&state(), "GET", "/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["tool_servers"], 0);
    }

    #[tokio::test]
    async fn test_models_never_error() {
        let body = serde_json::json!({"provider": "custom", "credential": ""});
        let (status, body) = call(&state(), "POST", "/api/models", Some(body)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["models"], serde_json::json!([]));
    }

    #[tokio::test]
    async fn test_tool_server_lifecycle() {
        let server = tool_server().await;
        let state = state();

        let connect = serde_json::json!({"url": server.uri(), "auth": "bearer", "token": "secret"});
        let (status, conn) = call(&state, "POST", "/api/tools", Some(connect)).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(conn["state"], "connected");
        assert!(conn.get("auth_token").is_none());
        let id = conn["id"].as_str().unwrap().to_string();

        let toggle = serde_json::json!({"tool": "fetch", "enabled": false});
        let (status, conn) = call(&state, "PUT", &format!("/api/tools/{id}/enabled"), Some(toggle)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(conn["enabled_tools"], serde_json::json!(["search"]));

        let toggle = serde_json::json!({"tool": "nope", "enabled": true});
        let (status, body) = call(&state, "PUT", &format!("/api/tools/{id}/enabled"), Some(toggle)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["code"], "NOT_FOUND");

        let (status, _) = call(&state, "DELETE", &format!("/api/tools/{id}"), None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        let (_, list) = call(&state, "GET", "/api/tools", None).await;
        assert_eq!(list, serde_json::json!([]));
    }

    #[tokio::test]
    async fn test_failed_connect_is_listed_with_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401).set_body_string("bad token"))
            .mount(&server)
            .await;
        let state = state();

        let (status, body) = call(&state, "POST", "/api/tools", Some(serde_json::json!({"url": server.uri()}))).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["code"], "AUTH_ERROR");

        let (_, list) = call(&state, "GET", "/api/tools", None).await;
        assert_eq!(list[0]["state"], "error");
    }

    #[tokio::test]
    async fn test_unknown_session() {
        let (status, body) = call(&state(), "GET", "/api/sessions/missing", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(body["error"].as_str().unwrap().contains("missing"));
    }

    #[test]
    fn test_client_frames_parse() {
        let send: ClientFrame = serde_json::from_value(serde_json::json!({
            "type": "send",
            "provider": {"provider": "openai", "credential": "sk", "model": "gpt-4o-mini"},
            "text": "hi"
        }))
        .unwrap();
        assert!(matches!(send, ClientFrame::Send { session_id: None, .. }));

        let approval: ClientFrame =
            serde_json::from_str(r#"{"type":"approval","call_id":"a","approved":true}"#).unwrap();
        assert!(matches!(approval, ClientFrame::Approval { approved: true, .. }));
    }

    #[test]
    fn test_done_frame_shape() {
        let frame = ServerFrame::Done {
            session_id: "s".into(),
            status: "completed",
            turns: 1,
            error: None,
        };
        let json = serde_json::to_value(&frame).unwrap();
        assert_eq!(json["type"], "done");
        assert!(json.get("error").is_none());
    }
}
