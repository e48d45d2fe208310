//! Application State

use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::RwLock;
use toolchat_core::{
    LlmProvider, MemorySessionStore, Orchestrator, SessionId, SessionStore, ToolExecutor, ToolServerConnection,
};
use toolchat_runtime::{HttpProvider, McpClient};

use crate::config::ServerConfig;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<Orchestrator>,

    /// Used directly for model discovery
    pub provider: Arc<dyn LlmProvider>,

    pub mcp: Arc<McpClient>,

    /// Configured tool servers; snapshotted per orchestration call
    pub tools: Arc<RwLock<Vec<ToolServerConnection>>>,

    pub sessions: Arc<dyn SessionStore>,

    /// Sessions with a message in flight
    active: Arc<Mutex<HashSet<SessionId>>>,
}

impl AppState {
    pub fn new(config: &ServerConfig) -> anyhow::Result<Self> {
        let provider = Arc::new(HttpProvider::new(config.http_timeout)?);
        let mcp = Arc::new(McpClient::new(provider.http().clone()));
        Ok(Self::from_parts(provider, mcp, config))
    }

    pub fn from_parts(provider: Arc<HttpProvider>, mcp: Arc<McpClient>, config: &ServerConfig) -> Self {
        let executor: Arc<dyn ToolExecutor> = mcp.clone();
        let orchestrator = Orchestrator::new(provider.clone(), executor, config.orchestrator_config());

        Self {
            orchestrator: Arc::new(orchestrator),
            provider,
            mcp,
            tools: Arc::new(RwLock::new(Vec::new())),
            sessions: Arc::new(MemorySessionStore::new()),
            active: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    pub async fn tool_snapshot(&self) -> Vec<ToolServerConnection> {
        self.tools.read().await.clone()
    }

    /// Claim `id` for one orchestration call; `None` if one is already running
    pub fn begin_session(&self, id: &SessionId) -> Option<SessionGuard> {
        let mut active = self.active.lock().unwrap_or_else(PoisonError::into_inner);
        active.insert(id.clone()).then(|| SessionGuard {
            active: self.active.clone(),
            id: id.clone(),
        })
    }
}

/// Releases the session claim on drop
pub struct SessionGuard {
    active: Arc<Mutex<HashSet<SessionId>>>,
    id: SessionId,
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        self.active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_flight_per_session() {
        let state = AppState::new(&ServerConfig::default()).unwrap();
        let id = SessionId::new();

        let guard = state.begin_session(&id).unwrap();
        assert!(state.begin_session(&id).is_none());
        assert!(state.begin_session(&SessionId::new()).is_some());

        drop(guard);
        assert!(state.begin_session(&id).is_some());
    }
}
