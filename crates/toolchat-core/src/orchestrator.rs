//! Orchestration Loop
//!
//! Drives one user message to completion: call the provider, and while it
//! asks for tools, gate each call on human approval, run it on its tool
//! server and feed the result back. Bounded by a turn budget.
//!
//! ```text
//! Sending ──► Completed
//!    │
//!    └─► AwaitingApproval ──► ExecutingTool ──► … ──► Sending
//! ```

use std::future::Future;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::approval::{ApprovalGate, ApprovalRequest};
use crate::error::{ChatError, FailureSignal};
use crate::message::{Attachment, Message, ToolCall};
use crate::provider::{Completion, CompletionRequest, DebugEnvelope, LlmProvider, ProviderConfig};
use crate::tool::{ToolCatalog, ToolExecutor, ToolServerConnection};

/// Provider round trips allowed per user message
pub const DEFAULT_MAX_TURNS: usize = 5;

/// Tool result recorded when the user rejects a call
pub const TOOL_DENIED_RESULT: &str = "User denied tool execution.";

/// Tool result recorded for calls left unanswered by a cancellation
pub const TOOL_CANCELLED_RESULT: &str = "Tool execution was cancelled.";

const CANCELLED_NOTICE: &str = "Generation was cancelled.";

/// Orchestrator configuration
#[derive(Clone, Debug)]
pub struct OrchestratorConfig {
    /// Prompt sent ahead of the history
    pub system_prompt: Option<String>,

    /// Maximum provider round trips per user message
    pub max_turns: usize,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            system_prompt: None,
            max_turns: DEFAULT_MAX_TURNS,
        }
    }
}

/// New user input for one invocation
#[derive(Clone, Debug, Default)]
pub struct UserInput {
    pub text: String,
    pub attachments: Vec<Attachment>,
}

impl UserInput {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            attachments: Vec::new(),
        }
    }

    pub fn with_attachments(mut self, attachments: Vec<Attachment>) -> Self {
        self.attachments = attachments;
        self
    }
}

/// How an invocation ended
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TurnStatus {
    Completed,
    TurnBudgetExceeded,
    Cancelled,
    Failed(ChatError),
}

/// Result of [`Orchestrator::send_message`]
#[derive(Clone, Debug)]
pub struct TurnOutcome {
    /// Messages produced by this invocation, starting with the user message
    pub messages: Vec<Message>,

    /// Provider round trips performed
    pub turns: usize,

    pub status: TurnStatus,
}

impl TurnOutcome {
    pub fn is_completed(&self) -> bool {
        self.status == TurnStatus::Completed
    }

    /// Terminal message of this invocation
    pub fn final_message(&self) -> Option<&Message> {
        self.messages.last()
    }

    pub fn error(&self) -> Option<&ChatError> {
        match &self.status {
            TurnStatus::Failed(err) => Some(err),
            _ => None,
        }
    }
}

/// The agentic tool-calling loop
pub struct Orchestrator {
    provider: Arc<dyn LlmProvider>,
    executor: Arc<dyn ToolExecutor>,
    config: OrchestratorConfig,
}

impl Orchestrator {
    pub fn new(
        provider: Arc<dyn LlmProvider>,
        executor: Arc<dyn ToolExecutor>,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            provider,
            executor,
            config,
        }
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// Run one user message through the provider and any requested tools.
    ///
    /// Never fails as a Rust error: every terminal path appends a readable
    /// message and reports itself through [`TurnStatus`]. `history` is left
    /// untouched; the caller appends `outcome.messages` to it.
    pub async fn send_message(
        &self,
        provider_config: &ProviderConfig,
        history: &[Message],
        input: UserInput,
        connections: &[ToolServerConnection],
        approval: &dyn ApprovalGate,
        cancel: Option<&CancellationToken>,
    ) -> TurnOutcome {
        let mut run = Run::new(history);
        run.push(Message::user(input.text).with_attachments(input.attachments));

        if let Err(err) = provider_config.validate() {
            warn!(provider = %provider_config.provider, error = %err, "Refusing to send with invalid configuration");
            let notice = Message::notice(err.user_message()).with_debug(DebugEnvelope::unsent(provider_config));
            return run.finish(notice, TurnStatus::Failed(err));
        }

        let catalog = ToolCatalog::new(connections);
        let tools = catalog.definitions();
        let max_turns = self.config.max_turns.max(1);
        let mut last_debug = DebugEnvelope::unsent(provider_config);

        loop {
            if run.turns == max_turns {
                let err = ChatError::from(FailureSignal::TurnLimit(max_turns));
                warn!(turns = run.turns, "Turn budget exhausted");
                let notice = Message::assistant(err.user_message()).with_debug(last_debug);
                return run.finish(notice, TurnStatus::TurnBudgetExceeded);
            }

            run.turns += 1;
            let request = CompletionRequest {
                system_prompt: self.config.system_prompt.as_deref(),
                messages: &run.working,
                tools: &tools,
            };
            debug!(turn = run.turns, messages = request.messages.len(), tools = tools.len(), "Calling provider");

            let result = until_cancelled(cancel, self.provider.complete(provider_config, &request)).await;
            let completion = match result {
                None => return run.cancelled(last_debug),
                Some(Err(err)) => {
                    warn!(turn = run.turns, kind = %err.kind(), error = %err, "Provider call failed");
                    let notice = Message::notice(err.user_message()).with_debug(last_debug);
                    return run.finish(notice, TurnStatus::Failed(err));
                }
                Some(Ok(completion)) => completion,
            };

            let Completion { response, debug } = completion;
            last_debug = debug.clone();

            if response.tool_calls.is_empty() {
                let text = append_image_links(response.text, &response.images);
                let reply = Message::assistant(text).with_usage(response.usage).with_debug(debug);
                info!(turns = run.turns, "Completed");
                return run.finish(reply, TurnStatus::Completed);
            }

            let calls = response.tool_calls;
            run.push(
                Message::assistant(response.text)
                    .with_tool_calls(calls.clone())
                    .with_usage(response.usage)
                    .with_debug(debug),
            );

            for (idx, call) in calls.iter().enumerate() {
                match self.answer(call, &catalog, approval, cancel).await {
                    Some(result) => run.push(Message::tool_result(call, result)),
                    None => {
                        for unanswered in &calls[idx..] {
                            run.push(Message::tool_result(unanswered, TOOL_CANCELLED_RESULT));
                        }
                        return run.cancelled(last_debug);
                    }
                }
            }
        }
    }

    /// Produce the tool result for one call; `None` when cancelled
    async fn answer(
        &self,
        call: &ToolCall,
        catalog: &ToolCatalog<'_>,
        approval: &dyn ApprovalGate,
        cancel: Option<&CancellationToken>,
    ) -> Option<String> {
        let Some(server) = catalog.resolve(&call.name) else {
            debug!(tool = %call.name, "Tool not offered by any connected server");
            return Some(ChatError::from(FailureSignal::UnknownTool(call.name.clone())).user_message());
        };

        let arguments = match call.parse_arguments() {
            Ok(arguments) => arguments,
            Err(err) => return Some(execution_error(&err)),
        };

        let request = ApprovalRequest {
            call_id: call.id.clone(),
            tool_name: call.name.clone(),
            server_id: server.id.clone(),
            arguments: arguments.clone(),
        };
        if !until_cancelled(cancel, approval.approve(request)).await? {
            info!(tool = %call.name, "Tool call denied");
            return Some(TOOL_DENIED_RESULT.to_string());
        }

        debug!(tool = %call.name, server = %server.id, "Executing tool");
        let result = until_cancelled(cancel, self.executor.call_tool(server, &call.name, arguments)).await?;
        Some(result.unwrap_or_else(|err| {
            warn!(tool = %call.name, error = %err, "Tool execution failed");
            execution_error(&err)
        }))
    }
}

/// Working history of one invocation
struct Run {
    working: Vec<Message>,
    prior: usize,
    turns: usize,
}

impl Run {
    fn new(history: &[Message]) -> Self {
        Self {
            working: history.to_vec(),
            prior: history.len(),
            turns: 0,
        }
    }

    fn push(&mut self, message: Message) {
        self.working.push(message);
    }

    fn finish(mut self, last: Message, status: TurnStatus) -> TurnOutcome {
        self.working.push(last);
        TurnOutcome {
            messages: self.working.split_off(self.prior),
            turns: self.turns,
            status,
        }
    }

    fn cancelled(self, debug: DebugEnvelope) -> TurnOutcome {
        info!(turns = self.turns, "Cancelled");
        self.finish(Message::notice(CANCELLED_NOTICE).with_debug(debug), TurnStatus::Cancelled)
    }
}

/// Await `fut` unless `cancel` fires first
async fn until_cancelled<F: Future>(cancel: Option<&CancellationToken>, fut: F) -> Option<F::Output> {
    match cancel {
        Some(token) => tokio::select! {
            biased;
            () = token.cancelled() => None,
            out = fut => Some(out),
        },
        None => Some(fut.await),
    }
}

fn execution_error(err: &ChatError) -> String {
    format!("Error executing tool: {}", err.user_message())
}

fn append_image_links(mut text: String, images: &[String]) -> String {
    for (n, url) in images.iter().enumerate() {
        if !text.is_empty() {
            text.push_str("\n\n");
        }
        text.push_str(&format!("![generated image {}]({url})", n + 1));
    }
    text
}
