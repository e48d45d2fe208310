//! # toolchat-core
//!
//! Provider-agnostic conversation model and the agentic tool-calling loop.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                        Orchestrator                          │
//! │  ┌──────────────┐  ┌──────────────┐  ┌────────────────────┐  │
//! │  │ ApprovalGate │  │ ToolExecutor │  │    LlmProvider     │  │
//! │  │   (human)    │──│ (tool server)│──│    (Strategy)      │  │
//! │  └──────────────┘  └──────────────┘  └────────────────────┘  │
//! └──────────────────────────────────────────────────────────────┘
//!                              │
//!                     wire::{to_wire, from_wire}
//! ```
//!
//! Everything here is free of network I/O. `toolchat-runtime` supplies the
//! HTTP-backed `LlmProvider` and `ToolExecutor`.

pub mod approval;
pub mod error;
pub mod message;
pub mod orchestrator;
pub mod provider;
pub mod session;
pub mod tool;
pub mod wire;

pub use approval::{ApprovalChannel, ApprovalGate, ApprovalRequest, PendingApproval};
pub use error::{ChatError, ErrorKind, FailureSignal, Result, classify};
pub use message::{Attachment, Content, Message, Role, ToolCall};
pub use orchestrator::{Orchestrator, OrchestratorConfig, TurnOutcome, TurnStatus, UserInput};
pub use provider::{LlmProvider, ProviderConfig, ProviderId};
pub use session::{MemorySessionStore, Session, SessionId, SessionStore};
pub use tool::{ToolDefinition, ToolExecutor, ToolServerConnection};
pub use tokio_util::sync::CancellationToken;
