//! Session Management
//!
//! A session is one conversation: its canonical history plus bookkeeping.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::Result;
use crate::message::Message;

/// Unique session identifier
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A conversation and its history
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Session {
    pub id: SessionId,

    /// Canonical history, oldest first
    pub history: Vec<Message>,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,
}

impl Session {
    pub fn with_id(id: SessionId) -> Self {
        let now = Utc::now();
        Self {
            id,
            history: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Append the messages of a finished invocation
    pub fn extend(&mut self, messages: impl IntoIterator<Item = Message>) {
        self.history.extend(messages);
        self.updated_at = Utc::now();
    }
}

/// Session store trait for persistence
pub trait SessionStore: Send + Sync {
    fn save(&self, session: &Session) -> Result<()>;

    fn load(&self, id: &SessionId) -> Result<Option<Session>>;
}

/// In-memory session store
#[derive(Debug, Default)]
pub struct MemorySessionStore {
    sessions: RwLock<HashMap<SessionId, Session>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SessionStore for MemorySessionStore {
    fn save(&self, session: &Session) -> Result<()> {
        let mut sessions = self.sessions.write().unwrap_or_else(PoisonError::into_inner);
        sessions.insert(session.id.clone(), session.clone());
        Ok(())
    }

    fn load(&self, id: &SessionId) -> Result<Option<Session>> {
        let sessions = self.sessions.read().unwrap_or_else(PoisonError::into_inner);
        Ok(sessions.get(id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extend_bumps_updated_at() {
        let mut session = Session::with_id(SessionId::from_string("s1"));
        let created = session.created_at;

        session.extend([Message::user("hello"), Message::assistant("hi")]);
        assert_eq!(session.history.len(), 2);
        assert!(session.updated_at >= created);
    }

    #[test]
    fn test_memory_store() {
        let store = MemorySessionStore::new();
        let mut session = Session::with_id(SessionId::new());
        session.extend([Message::user("hello")]);
        let id = session.id.clone();

        assert!(store.load(&id).unwrap().is_none());
        store.save(&session).unwrap();

        session.extend([Message::assistant("hi")]);
        store.save(&session).unwrap();
        let loaded = store.load(&id).unwrap().unwrap();
        assert_eq!(loaded.history.len(), 2);
        assert_eq!(loaded.history[1].text(), "hi");
    }
}
