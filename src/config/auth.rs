//! Authentication configuration

use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;

use super::error::ValidationError;
use super::server::Environment;

const SUPPORTED_ALGORITHMS: &[&str] = &["HS256", "HS384", "HS512"];
const MIN_PRODUCTION_SECRET_LEN: usize = 32;

/// Access token verification (shared-secret JWT)
#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    /// HMAC signing key
    pub jwt_secret: SecretString,

    /// Signing algorithm
    #[serde(default = "default_algorithm")]
    pub jwt_algorithm: String,

    /// Clock skew tolerated on `exp`, in seconds
    #[serde(default = "default_leeway")]
    pub leeway_secs: u64,
}

impl AuthConfig {
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            jwt_secret: SecretString::new(secret.into()),
            jwt_algorithm: default_algorithm(),
            leeway_secs: default_leeway(),
        }
    }

    /// Validate authentication configuration
    ///
    /// Production requires a secret of at least 32 bytes.
    pub fn validate(&self, environment: &Environment) -> Result<(), ValidationError> {
        let secret = self.jwt_secret.expose_secret();
        if secret.is_empty() {
            return Err(ValidationError::MissingRequired("AUTH__JWT_SECRET"));
        }
        if *environment == Environment::Production && secret.len() < MIN_PRODUCTION_SECRET_LEN {
            return Err(ValidationError::WeakJwtSecret);
        }
        if !SUPPORTED_ALGORITHMS.contains(&self.jwt_algorithm.to_ascii_uppercase().as_str()) {
            return Err(ValidationError::UnsupportedJwtAlgorithm(self.jwt_algorithm.clone()));
        }
        Ok(())
    }
}

fn default_algorithm() -> String {
    "HS256".to_string()
}

fn default_leeway() -> u64 {
    30
}
