//! Conversation history store.
//!
//! Sessions hold a bounded FIFO of messages. The oldest message is dropped
//! once `max_turns` is reached; sessions idle longer than the TTL are evicted
//! by [`HistoryStore::evict_expired`].

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use tokio::sync::RwLock;

use crate::config::HistoryConfig;
use crate::errors::{AgentError, Result};

/// Who produced a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// One stored message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

/// Session-keyed message history
#[async_trait]
pub trait HistoryStore: Send + Sync {
    /// Open a new empty session and return its id
    async fn create(&self) -> String;

    /// Append a message; unknown sessions are created on first append
    async fn append(&self, session_id: &str, role: Role, content: &str) -> Result<()>;

    /// Messages of a session, oldest first
    async fn get(&self, session_id: &str) -> Result<Vec<Message>>;

    /// Drop a session; returns whether it existed
    async fn evict(&self, session_id: &str) -> bool;

    /// Drop every idle session; returns how many were removed
    async fn evict_expired(&self) -> usize;
}

#[derive(Debug)]
struct Session {
    messages: VecDeque<Message>,
    last_active: DateTime<Utc>,
}

impl Session {
    fn new(capacity: usize) -> Self {
        Self {
            messages: VecDeque::with_capacity(capacity),
            last_active: Utc::now(),
        }
    }
}

/// In-process history store
pub struct InMemoryHistory {
    sessions: RwLock<HashMap<String, Session>>,
    max_turns: usize,
    ttl: ChronoDuration,
}

impl InMemoryHistory {
    pub fn new(config: &HistoryConfig) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            max_turns: config.max_turns.max(1),
            ttl: ChronoDuration::seconds(config.ttl_secs as i64),
        }
    }

    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }
}

#[async_trait]
impl HistoryStore for InMemoryHistory {
    async fn create(&self) -> String {
        let id = uuid::Uuid::new_v4().to_string();
        let mut sessions = self.sessions.write().await;
        sessions.insert(id.clone(), Session::new(self.max_turns));
        id
    }

    async fn append(&self, session_id: &str, role: Role, content: &str) -> Result<()> {
        if session_id.is_empty() {
            return Err(AgentError::Generic("session id must not be empty".to_string()));
        }

        let mut sessions = self.sessions.write().await;
        let session = sessions
            .entry(session_id.to_string())
            .or_insert_with(|| Session::new(self.max_turns));

        // Evict oldest if at capacity
        if session.messages.len() >= self.max_turns {
            session.messages.pop_front();
        }

        let now = Utc::now();
        session.messages.push_back(Message {
            role,
            content: content.to_string(),
            timestamp: now,
        });
        session.last_active = now;
        Ok(())
    }

    async fn get(&self, session_id: &str) -> Result<Vec<Message>> {
        let sessions = self.sessions.read().await;
        sessions
            .get(session_id)
            .map(|s| s.messages.iter().cloned().collect())
            .ok_or_else(|| AgentError::Generic(format!("Unknown session: {}", session_id)))
    }

    async fn evict(&self, session_id: &str) -> bool {
        self.sessions.write().await.remove(session_id).is_some()
    }

    async fn evict_expired(&self) -> usize {
        let cutoff = Utc::now() - self.ttl;
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, s| s.last_active > cutoff);
        let removed = before - sessions.len();
        if removed > 0 {
            tracing::debug!(removed, "evicted idle sessions");
        }
        removed
    }
}
