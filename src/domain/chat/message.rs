//! Message entity.
//!
//! Messages are immutable records of user/assistant exchanges within a
//! session.

use crate::domain::foundation::{DomainError, ErrorCode, MessageId, SessionId, Timestamp, UserId};
use serde::{Deserialize, Serialize};

/// Maximum length of a single message body, in characters.
pub const MAX_CONTENT_LENGTH: usize = 32_000;

/// Who authored a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SenderType {
    User,
    Assistant,
}

/// An immutable message within a session.
///
/// # Invariants
///
/// - `content` is non-empty and at most `MAX_CONTENT_LENGTH` characters
/// - `created_at` is set at construction and never changes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    id: MessageId,
    session_id: SessionId,
    user_id: UserId,
    sender: SenderType,
    content: String,

    /// Opaque attachment references (file ids) supplied by the client.
    #[serde(default)]
    attachments: Vec<String>,

    created_at: Timestamp,
}

impl Message {
    /// Creates a message sent by the user.
    ///
    /// # Errors
    ///
    /// - `ValidationFailed` if content is empty or too long
    pub fn from_user(
        session_id: SessionId,
        user_id: UserId,
        content: impl Into<String>,
        attachments: Vec<String>,
    ) -> Result<Self, DomainError> {
        Self::new(session_id, user_id, SenderType::User, content.into(), attachments)
    }

    /// Creates the assistant's reply for a run.
    pub fn from_assistant(
        session_id: SessionId,
        user_id: UserId,
        content: impl Into<String>,
    ) -> Result<Self, DomainError> {
        Self::new(session_id, user_id, SenderType::Assistant, content.into(), Vec::new())
    }

    fn new(
        session_id: SessionId,
        user_id: UserId,
        sender: SenderType,
        content: String,
        attachments: Vec<String>,
    ) -> Result<Self, DomainError> {
        if content.trim().is_empty() {
            return Err(DomainError::new(
                ErrorCode::ValidationFailed,
                "Message content cannot be empty",
            ));
        }
        if content.chars().count() > MAX_CONTENT_LENGTH {
            return Err(DomainError::new(
                ErrorCode::ValidationFailed,
                format!("Message content cannot exceed {} characters", MAX_CONTENT_LENGTH),
            ));
        }

        Ok(Self {
            id: MessageId::new(),
            session_id,
            user_id,
            sender,
            content,
            attachments,
            created_at: Timestamp::now(),
        })
    }

    pub fn id(&self) -> MessageId {
        self.id
    }

    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    pub fn user_id(&self) -> &UserId {
        &self.user_id
    }

    pub fn sender(&self) -> SenderType {
        self.sender
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn attachments(&self) -> &[String] {
        &self.attachments
    }

    pub fn created_at(&self) -> &Timestamp {
        &self.created_at
    }

    /// Returns true for messages written by the user.
    pub fn is_from_user(&self) -> bool {
        self.sender == SenderType::User
    }
}
