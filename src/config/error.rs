//! Configuration error types

use thiserror::Error;

/// Errors that can occur during configuration loading
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration loading failed: {0}")]
    LoadError(#[from] config::ConfigError),

    #[error("Validation failed: {0}")]
    ValidationFailed(#[from] ValidationError),
}

/// Errors that can occur during configuration validation
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Required configuration missing: {0}")]
    MissingRequired(&'static str),

    #[error("Invalid port number")]
    InvalidPort,

    #[error("Invalid socket address: {0}")]
    InvalidSocketAddr(String),

    #[error("Invalid log format (expected text or json)")]
    InvalidLogFormat,

    #[error("WebSocket path must start with '/'")]
    InvalidWsPath,

    #[error("Invalid Redis URL format")]
    InvalidRedisUrl,

    #[error("Unsupported JWT algorithm: {0}")]
    UnsupportedJwtAlgorithm(String),

    #[error("JWT secret must be at least 32 bytes in production")]
    WeakJwtSecret,

    #[error("{0} must be greater than zero")]
    MustBePositive(&'static str),

    #[error("Backoff initial delay exceeds the maximum delay")]
    InvalidBackoff,
}
