//! Session repository port.

use async_trait::async_trait;

use crate::domain::chat::Session;
use crate::domain::foundation::{DomainError, SessionId};

/// Document store access for sessions.
#[async_trait]
pub trait SessionRepository: Send + Sync {
    /// Inserts or replaces a session.
    async fn save(&self, session: &Session) -> Result<(), DomainError>;

    /// Finds a session by id. `Ok(None)` when it does not exist.
    async fn find_by_id(&self, id: &SessionId) -> Result<Option<Session>, DomainError>;
}
