//! Redis-backed document store.
//!
//! Keys, for prefix `agent_relay`:
//!
//! - `agent_relay:session:<id>` - session JSON
//! - `agent_relay:session:<id>:messages` - list of message JSON, oldest first

use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::AsyncCommands;

use crate::domain::chat::{Message, Session};
use crate::domain::foundation::{DomainError, ErrorCode, SessionId};
use crate::ports::{MessageRepository, SessionRepository};

#[derive(Clone)]
pub struct RedisDocumentStore {
    conn: MultiplexedConnection,
    key_prefix: String,
}

impl RedisDocumentStore {
    pub fn new(conn: MultiplexedConnection, key_prefix: impl Into<String>) -> Self {
        Self {
            conn,
            key_prefix: key_prefix.into(),
        }
    }

    pub async fn connect(url: &str, key_prefix: impl Into<String>) -> Result<Self, DomainError> {
        let client = redis::Client::open(url).map_err(storage_error)?;
        let conn = client
            .get_multiplexed_tokio_connection()
            .await
            .map_err(storage_error)?;
        Ok(Self::new(conn, key_prefix))
    }

    fn session_key(&self, id: &SessionId) -> String {
        format!("{}:session:{}", self.key_prefix, id)
    }

    fn messages_key(&self, id: &SessionId) -> String {
        format!("{}:session:{}:messages", self.key_prefix, id)
    }
}

fn storage_error(e: redis::RedisError) -> DomainError {
    DomainError::new(ErrorCode::DatabaseError, e.to_string())
}

#[async_trait]
impl SessionRepository for RedisDocumentStore {
    async fn save(&self, session: &Session) -> Result<(), DomainError> {
        let json = serde_json::to_string(session)?;
        let mut conn = self.conn.clone();
        conn.set::<_, _, ()>(self.session_key(session.id()), json)
            .await
            .map_err(storage_error)?;
        Ok(())
    }

    async fn find_by_id(&self, id: &SessionId) -> Result<Option<Session>, DomainError> {
        let mut conn = self.conn.clone();
        let json: Option<String> = conn
            .get(self.session_key(id))
            .await
            .map_err(storage_error)?;
        json.map(|j| serde_json::from_str(&j).map_err(DomainError::from))
            .transpose()
    }
}

#[async_trait]
impl MessageRepository for RedisDocumentStore {
    async fn insert(&self, message: &Message) -> Result<(), DomainError> {
        let json = serde_json::to_string(message)?;
        let mut conn = self.conn.clone();
        conn.rpush::<_, _, ()>(self.messages_key(message.session_id()), json)
            .await
            .map_err(storage_error)?;
        Ok(())
    }

    async fn recent(&self, session_id: &SessionId, limit: usize) -> Result<Vec<Message>, DomainError> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        let mut conn = self.conn.clone();
        let start = -(limit.min(isize::MAX as usize) as isize);
        let raw: Vec<String> = conn
            .lrange(self.messages_key(session_id), start, -1)
            .await
            .map_err(storage_error)?;

        raw.iter()
            .map(|j| serde_json::from_str(j).map_err(DomainError::from))
            .collect()
    }
}
