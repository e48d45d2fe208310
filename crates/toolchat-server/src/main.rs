//! toolchat HTTP Server
//!
//! Axum-based server providing the REST API for model discovery, tool server
//! management and sessions, plus the WebSocket chat endpoint that drives the
//! orchestration loop.

mod config;
mod handlers;
mod state;

use axum::{
    Router,
    routing::{delete, get, post, put},
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::ServerConfig;
use crate::handlers::{
    chat_ws_handler, connect_tool_server, disconnect_tool_server, get_session, health_check, list_models,
    list_tool_servers, set_tool_enabled,
};
use crate::state::AppState;

fn app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_check))
        .route("/api/models", post(list_models))
        // Tool servers
        .route("/api/tools", get(list_tool_servers).post(connect_tool_server))
        .route("/api/tools/{id}", delete(disconnect_tool_server))
        .route("/api/tools/{id}/enabled", put(set_tool_enabled))
        // Conversations
        .route("/api/sessions/{id}", get(get_session))
        .route("/api/chat", get(chat_ws_handler))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info,tower_http=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = ServerConfig::from_env();
    let state = AppState::new(&config)?;

    tracing::info!(
        max_turns = config.max_turns,
        timeout_secs = config.http_timeout.as_secs(),
        system_prompt = config.system_prompt.is_some(),
        "Orchestrator configured"
    );

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;

    tracing::info!("toolchat server running on http://{}", config.bind_addr);
    tracing::info!("Endpoints:");
    tracing::info!("  GET    /health                  - Health check");
    tracing::info!("  POST   /api/models              - Discover provider models");
    tracing::info!("  GET    /api/tools               - List tool servers");
    tracing::info!("  POST   /api/tools               - Connect a tool server");
    tracing::info!("  DELETE /api/tools/{{id}}          - Disconnect a tool server");
    tracing::info!("  PUT    /api/tools/{{id}}/enabled  - Enable or disable a tool");
    tracing::info!("  GET    /api/sessions/{{id}}       - Session history");
    tracing::info!("  GET    /api/chat                - WebSocket chat");

    axum::serve(listener, app(state)).await?;

    Ok(())
}
