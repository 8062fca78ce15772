//! Session entity.

use crate::domain::foundation::{DomainError, ErrorCode, SessionId, Timestamp, UserId};
use serde::{Deserialize, Serialize};

/// Maximum length for session title.
pub const MAX_TITLE_LENGTH: usize = 200;

/// A chat session between one user and an assistant.
///
/// # Invariants
///
/// - `title` is non-empty and at most `MAX_TITLE_LENGTH` characters
/// - `user_id` never changes after creation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    id: SessionId,
    user_id: UserId,

    /// Assistant configuration the run should use, if any.
    assistant_id: Option<String>,

    title: String,
    created_at: Timestamp,
    updated_at: Timestamp,
}

impl Session {
    /// Creates a new session.
    ///
    /// # Errors
    ///
    /// - `ValidationFailed` if title is empty or too long
    pub fn new(id: SessionId, user_id: UserId, title: impl Into<String>) -> Result<Self, DomainError> {
        let title = Self::normalize_title(title.into())?;
        let now = Timestamp::now();
        Ok(Self {
            id,
            user_id,
            assistant_id: None,
            title,
            created_at: now,
            updated_at: now,
        })
    }

    /// Starts a session titled after the first message it will hold.
    pub fn started_from(user_id: UserId, first_message: &str) -> Result<Self, DomainError> {
        let title: String = first_message.trim().chars().take(MAX_TITLE_LENGTH).collect();
        let title = if title.is_empty() { "New chat".to_string() } else { title };
        Self::new(SessionId::generate(), user_id, title)
    }

    /// Sets the assistant used for runs in this session.
    pub fn with_assistant(mut self, assistant_id: impl Into<String>) -> Self {
        self.assistant_id = Some(assistant_id.into());
        self
    }

    pub fn id(&self) -> &SessionId {
        &self.id
    }

    pub fn user_id(&self) -> &UserId {
        &self.user_id
    }

    pub fn assistant_id(&self) -> Option<&str> {
        self.assistant_id.as_deref()
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn created_at(&self) -> &Timestamp {
        &self.created_at
    }

    pub fn updated_at(&self) -> &Timestamp {
        &self.updated_at
    }

    /// Returns true if the given user owns this session.
    pub fn is_owner(&self, user_id: &UserId) -> bool {
        &self.user_id == user_id
    }

    /// Records activity on the session (a message was appended).
    pub fn touch(&mut self) {
        self.updated_at = Timestamp::now();
    }

    fn normalize_title(title: String) -> Result<String, DomainError> {
        let trimmed = title.trim();
        if trimmed.is_empty() {
            return Err(DomainError::new(
                ErrorCode::ValidationFailed,
                "Session title cannot be empty",
            ));
        }
        if trimmed.chars().count() > MAX_TITLE_LENGTH {
            return Err(DomainError::new(
                ErrorCode::ValidationFailed,
                format!("Session title cannot exceed {} characters", MAX_TITLE_LENGTH),
            ));
        }
        Ok(trimmed.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user() -> UserId {
        UserId::new("user-1").unwrap()
    }

    #[test]
    fn new_session_trims_title() {
        let session = Session::new(SessionId::generate(), user(), "  Trip planning  ").unwrap();
        assert_eq!(session.title(), "Trip planning");
        assert!(session.assistant_id().is_none());
        assert_eq!(session.created_at(), session.updated_at());
    }

    #[test]
    fn new_session_rejects_blank_title() {
        let err = Session::new(SessionId::generate(), user(), "   ").unwrap_err();
        assert_eq!(err.code, ErrorCode::ValidationFailed);
    }

    #[test]
    fn new_session_rejects_long_title() {
        let title = "x".repeat(MAX_TITLE_LENGTH + 1);
        assert!(Session::new(SessionId::generate(), user(), title).is_err());
    }

    #[test]
    fn started_from_truncates_first_message() {
        let long = "y".repeat(MAX_TITLE_LENGTH * 2);
        let session = Session::started_from(user(), &long).unwrap();
        assert_eq!(session.title().chars().count(), MAX_TITLE_LENGTH);
    }

    #[test]
    fn started_from_blank_message_uses_placeholder_title() {
        let session = Session::started_from(user(), "  ").unwrap();
        assert_eq!(session.title(), "New chat");
    }

    #[test]
    fn ownership_is_checked_by_user_id() {
        let session = Session::new(SessionId::generate(), user(), "t").unwrap();
        assert!(session.is_owner(&user()));
        assert!(!session.is_owner(&UserId::new("other").unwrap()));
    }

    #[test]
    fn session_serializes_round_trip() {
        let session = Session::new(SessionId::generate(), user(), "t")
            .unwrap()
            .with_assistant("asst-1");
        let json = serde_json::to_string(&session).unwrap();
        let back: Session = serde_json::from_str(&json).unwrap();
        assert_eq!(back, session);
        assert_eq!(back.assistant_id(), Some("asst-1"));
    }
}
