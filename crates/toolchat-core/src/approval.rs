//! Human approval gate
//!
//! Every tool call that resolves to a connected server is put to an
//! [`ApprovalGate`] before it runs. The gate may take arbitrarily long; the
//! orchestration loop imposes no timeout.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot};

/// What the user is asked to approve
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ApprovalRequest {
    pub call_id: String,
    pub tool_name: String,
    /// Tool server the call will be sent to
    pub server_id: String,
    pub arguments: serde_json::Value,
}

#[async_trait]
pub trait ApprovalGate: Send + Sync {
    /// Resolve to `true` to run the call, `false` to deny it
    async fn approve(&self, request: ApprovalRequest) -> bool;
}

/// Gate with a fixed answer
#[derive(Clone, Copy, Debug)]
pub struct StaticApproval(pub bool);

#[async_trait]
impl ApprovalGate for StaticApproval {
    async fn approve(&self, _request: ApprovalRequest) -> bool {
        self.0
    }
}

/// A request waiting on a decision from outside the loop
#[derive(Debug)]
pub struct PendingApproval {
    pub request: ApprovalRequest,
    responder: oneshot::Sender<bool>,
}

impl PendingApproval {
    /// Deliver the decision; a loop that already went away is ignored
    pub fn respond(self, approved: bool) {
        let _ = self.responder.send(approved);
    }
}

/// Gate that forwards each request over a channel, e.g. to a WebSocket
/// handler that asks the user.
///
/// A dropped receiver or a dropped [`PendingApproval`] counts as a denial.
#[derive(Clone, Debug)]
pub struct ApprovalChannel {
    sender: mpsc::Sender<PendingApproval>,
}

impl ApprovalChannel {
    pub fn new(buffer: usize) -> (Self, mpsc::Receiver<PendingApproval>) {
        let (sender, receiver) = mpsc::channel(buffer.max(1));
        (Self { sender }, receiver)
    }
}

#[async_trait]
impl ApprovalGate for ApprovalChannel {
    async fn approve(&self, request: ApprovalRequest) -> bool {
        let (responder, decision) = oneshot::channel();
        let tool = request.tool_name.clone();

        if self.sender.send(PendingApproval { request, responder }).await.is_err() {
            tracing::warn!(%tool, "Approval receiver gone, denying tool call");
            return false;
        }

        decision.await.unwrap_or(false)
    }
}
