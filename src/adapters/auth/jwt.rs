//! HMAC JWT adapter for the `TokenVerifier` port.
//!
//! Tokens are signed with a shared secret (HS256 by default). The `sub`
//! claim becomes the user id; `exp` is always validated.

use async_trait::async_trait;
use jsonwebtoken::{decode, errors::ErrorKind, Algorithm, DecodingKey, Validation};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use crate::config::AuthConfig;
use crate::domain::foundation::{AuthError, AuthenticatedUser, UserId};
use crate::ports::TokenVerifier;

/// Claims we read from the access token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessClaims {
    pub sub: String,
    pub exp: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

/// Verifies HMAC-signed access tokens.
pub struct JwtTokenVerifier {
    key: DecodingKey,
    validation: Validation,
}

impl JwtTokenVerifier {
    pub fn new(secret: &SecretString, algorithm: Algorithm, leeway_secs: u64) -> Self {
        let mut validation = Validation::new(algorithm);
        validation.leeway = leeway_secs;
        validation.validate_exp = true;
        validation.set_required_spec_claims(&["exp", "sub"]);

        Self {
            key: DecodingKey::from_secret(secret.expose_secret().as_bytes()),
            validation,
        }
    }

    /// Builds a verifier from the `auth` config section.
    pub fn from_config(config: &AuthConfig) -> Result<Self, AuthError> {
        let algorithm = parse_algorithm(&config.jwt_algorithm)?;
        Ok(Self::new(&config.jwt_secret, algorithm, config.leeway_secs))
    }
}

fn parse_algorithm(name: &str) -> Result<Algorithm, AuthError> {
    match name.to_ascii_uppercase().as_str() {
        "HS256" => Ok(Algorithm::HS256),
        "HS384" => Ok(Algorithm::HS384),
        "HS512" => Ok(Algorithm::HS512),
        other => Err(AuthError::service_unavailable(format!(
            "unsupported JWT algorithm: {}",
            other
        ))),
    }
}

#[async_trait]
impl TokenVerifier for JwtTokenVerifier {
    async fn verify(&self, token: &str) -> Result<AuthenticatedUser, AuthError> {
        let data = decode::<AccessClaims>(token, &self.key, &self.validation).map_err(|e| {
            match e.kind() {
                ErrorKind::ExpiredSignature => {
                    tracing::debug!("Token expired");
                    AuthError::TokenExpired
                }
                _ => {
                    tracing::debug!(error = %e, "Token validation failed");
                    AuthError::InvalidToken
                }
            }
        })?;

        let id = UserId::new(data.claims.sub).map_err(|_| AuthError::InvalidToken)?;
        Ok(AuthenticatedUser::new(id, data.claims.email))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{encode, EncodingKey, Header};

    const SECRET: &str = "test-secret-that-is-long-enough";

    fn verifier() -> JwtTokenVerifier {
        JwtTokenVerifier::new(&SecretString::new(SECRET.to_string()), Algorithm::HS256, 0)
    }

    fn now() -> u64 {
        chrono::Utc::now().timestamp() as u64
    }

    fn token(claims: &AccessClaims, secret: &str) -> String {
        encode(
            &Header::new(Algorithm::HS256),
            claims,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn valid_token_yields_user() {
        let claims = AccessClaims {
            sub: "user-42".into(),
            exp: now() + 600,
            email: Some("u@example.com".into()),
        };
        let user = verifier().verify(&token(&claims, SECRET)).await.unwrap();
        assert_eq!(user.id.as_str(), "user-42");
        assert_eq!(user.email.as_deref(), Some("u@example.com"));
    }

    #[tokio::test]
    async fn expired_token_is_reported_as_expired() {
        let claims = AccessClaims {
            sub: "user-42".into(),
            exp: now() - 600,
            email: None,
        };
        let err = verifier().verify(&token(&claims, SECRET)).await.unwrap_err();
        assert_eq!(err, AuthError::TokenExpired);
    }

    #[tokio::test]
    async fn wrong_secret_is_invalid() {
        let claims = AccessClaims {
            sub: "user-42".into(),
            exp: now() + 600,
            email: None,
        };
        let err = verifier()
            .verify(&token(&claims, "another-secret"))
            .await
            .unwrap_err();
        assert_eq!(err, AuthError::InvalidToken);
    }

    #[tokio::test]
    async fn empty_subject_is_invalid() {
        let claims = AccessClaims {
            sub: String::new(),
            exp: now() + 600,
            email: None,
        };
        let err = verifier().verify(&token(&claims, SECRET)).await.unwrap_err();
        assert_eq!(err, AuthError::InvalidToken);
    }

    #[tokio::test]
    async fn garbage_is_invalid() {
        assert_eq!(
            verifier().verify("not-a-jwt").await.unwrap_err(),
            AuthError::InvalidToken
        );
    }

    #[test]
    fn only_hmac_algorithms_are_accepted() {
        assert!(matches!(parse_algorithm("hs256"), Ok(Algorithm::HS256)));
        assert!(matches!(parse_algorithm("HS512"), Ok(Algorithm::HS512)));
        assert!(parse_algorithm("RS256").is_err());
    }
}
