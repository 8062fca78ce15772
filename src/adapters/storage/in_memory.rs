//! In-Memory Document Store Adapter
//!
//! Stores sessions and messages in memory. Useful for testing and
//! single-process development runs.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::domain::chat::{Message, Session};
use crate::domain::foundation::{DomainError, SessionId};
use crate::ports::{MessageRepository, SessionRepository};

/// In-memory store for sessions and their message history.
#[derive(Debug, Clone, Default)]
pub struct InMemoryDocumentStore {
    sessions: Arc<RwLock<HashMap<SessionId, Session>>>,
    messages: Arc<RwLock<HashMap<SessionId, Vec<Message>>>>,
}

impl InMemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// All messages stored for a session, oldest first.
    pub async fn messages_for(&self, session_id: &SessionId) -> Vec<Message> {
        self.messages
            .read()
            .await
            .get(session_id)
            .cloned()
            .unwrap_or_default()
    }

    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }
}

#[async_trait]
impl SessionRepository for InMemoryDocumentStore {
    async fn save(&self, session: &Session) -> Result<(), DomainError> {
        self.sessions
            .write()
            .await
            .insert(session.id().clone(), session.clone());
        Ok(())
    }

    async fn find_by_id(&self, id: &SessionId) -> Result<Option<Session>, DomainError> {
        Ok(self.sessions.read().await.get(id).cloned())
    }
}

#[async_trait]
impl MessageRepository for InMemoryDocumentStore {
    async fn insert(&self, message: &Message) -> Result<(), DomainError> {
        self.messages
            .write()
            .await
            .entry(message.session_id().clone())
            .or_default()
            .push(message.clone());
        Ok(())
    }

    async fn recent(&self, session_id: &SessionId, limit: usize) -> Result<Vec<Message>, DomainError> {
        let messages = self.messages.read().await;
        let history = messages.get(session_id).map(Vec::as_slice).unwrap_or(&[]);
        let start = history.len().saturating_sub(limit);
        Ok(history[start..].to_vec())
    }
}
