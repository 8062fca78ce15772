//! Message repository port.

use async_trait::async_trait;

use crate::domain::chat::Message;
use crate::domain::foundation::{DomainError, SessionId};

/// Document store access for messages.
#[async_trait]
pub trait MessageRepository: Send + Sync {
    /// Appends a message to its session's history.
    async fn insert(&self, message: &Message) -> Result<(), DomainError>;

    /// Returns up to `limit` most recent messages, oldest first.
    async fn recent(&self, session_id: &SessionId, limit: usize) -> Result<Vec<Message>, DomainError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[allow(dead_code)]
    fn assert_object_safe(_: &dyn MessageRepository) {}
}
