//! TokenVerifier port - Interface for access token verification.
//!
//! The gateway verifies a token before upgrading a socket; only a verified
//! `AuthenticatedUser` ever reaches the ingress loop.

use async_trait::async_trait;

use crate::domain::foundation::{AuthError, AuthenticatedUser};

/// Port for verifying bearer tokens.
#[async_trait]
pub trait TokenVerifier: Send + Sync {
    /// Verifies the token and returns the user it identifies.
    ///
    /// # Errors
    ///
    /// - `InvalidToken` for malformed or badly signed tokens
    /// - `TokenExpired` when the `exp` claim has passed
    /// - `ServiceUnavailable` when verification could not be attempted
    async fn verify(&self, token: &str) -> Result<AuthenticatedUser, AuthError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::foundation::UserId;

    struct FixedVerifier;

    #[async_trait]
    impl TokenVerifier for FixedVerifier {
        async fn verify(&self, token: &str) -> Result<AuthenticatedUser, AuthError> {
            match token {
                "good" => Ok(AuthenticatedUser::new(UserId::new("u-1").unwrap(), None)),
                _ => Err(AuthError::InvalidToken),
            }
        }
    }

    #[tokio::test]
    async fn verifier_is_usable_as_trait_object() {
        let verifier: Box<dyn TokenVerifier> = Box::new(FixedVerifier);
        assert_eq!(verifier.verify("good").await.unwrap().id.as_str(), "u-1");
        assert_eq!(verifier.verify("bad").await.unwrap_err(), AuthError::InvalidToken);
    }
}
