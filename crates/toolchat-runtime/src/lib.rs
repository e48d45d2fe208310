//! # toolchat-runtime
//!
//! Network implementations of the `toolchat-core` seams.
//!
//! ## Providers
//!
//! - **OpenAI-compatible**: OpenAI, OpenRouter, Groq, Mistral, DeepSeek and
//!   self-hosted servers behind a custom base URL
//! - **Gemini**: `generateContent` with a query-parameter key
//!
//! ## Usage
//!
//! ```rust,ignore
//! use toolchat_runtime::{HttpProvider, McpClient};
//!
//! let provider = Arc::new(HttpProvider::new(Duration::from_secs(120))?);
//! let tools = Arc::new(McpClient::new(provider.http().clone()));
//! let orchestrator = Orchestrator::new(provider, tools, OrchestratorConfig::default());
//! ```

pub mod client;
mod http;
pub mod providers;

#[cfg(feature = "mcp")]
pub mod mcp;

pub use client::HttpProvider;
#[cfg(feature = "mcp")]
pub use mcp::McpClient;
pub use providers::{AuthPlacement, ProviderAdapter, adapter_for, build_auth, resolve_endpoint};

// Re-export core types for convenience
pub use toolchat_core::{
    ChatError, LlmProvider, Message, Orchestrator, OrchestratorConfig, ProviderConfig, ProviderId, Result,
    ToolExecutor,
};
