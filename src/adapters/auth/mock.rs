//! Mock token verifier for testing.
//!
//! ```ignore
//! let verifier = MockTokenVerifier::new().with_test_user("valid-token", "user-123")?;
//! let user = verifier.verify("valid-token").await?;
//! ```

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use async_trait::async_trait;

use crate::domain::foundation::{AuthError, AuthenticatedUser, UserId, ValidationError};
use crate::ports::TokenVerifier;

/// Maps fixed tokens to users. Unknown tokens return `InvalidToken`.
#[derive(Debug, Default)]
pub struct MockTokenVerifier {
    tokens: RwLock<HashMap<String, AuthenticatedUser>>,
    /// Optional error to return for all verifications
    force_error: RwLock<Option<AuthError>>,
}

impl MockTokenVerifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a valid token that maps to a user.
    pub fn with_user(self, token: impl Into<String>, user: AuthenticatedUser) -> Self {
        self.tokens
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(token.into(), user);
        self
    }

    /// Adds a valid token for a user with the given id.
    pub fn with_test_user(
        self,
        token: impl Into<String>,
        user_id: impl Into<String>,
    ) -> Result<Self, ValidationError> {
        let user_id = user_id.into();
        let email = format!("{}@test.example.com", user_id);
        let user = AuthenticatedUser::new(UserId::new(user_id)?, Some(email));
        Ok(self.with_user(token, user))
    }

    /// Forces all verifications to return the specified error.
    pub fn with_error(self, error: AuthError) -> Self {
        *self
            .force_error
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(error);
        self
    }
}

#[async_trait]
impl TokenVerifier for MockTokenVerifier {
    async fn verify(&self, token: &str) -> Result<AuthenticatedUser, AuthError> {
        if let Some(error) = self
            .force_error
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
        {
            return Err(error);
        }

        self.tokens
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(token)
            .cloned()
            .ok_or(AuthError::InvalidToken)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn known_token_returns_user() {
        let verifier = MockTokenVerifier::new()
            .with_test_user("tok", "user-1")
            .unwrap();
        let user = verifier.verify("tok").await.unwrap();
        assert_eq!(user.id.as_str(), "user-1");
        assert_eq!(user.email.as_deref(), Some("user-1@test.example.com"));
    }

    #[tokio::test]
    async fn unknown_token_is_invalid() {
        let verifier = MockTokenVerifier::new();
        assert_eq!(verifier.verify("nope").await.unwrap_err(), AuthError::InvalidToken);
    }

    #[tokio::test]
    async fn forced_error_wins() {
        let verifier = MockTokenVerifier::new()
            .with_test_user("tok", "user-1")
            .unwrap()
            .with_error(AuthError::service_unavailable("down"));
        assert!(verifier.verify("tok").await.unwrap_err().is_transient());
    }
}
