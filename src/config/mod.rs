//! Application configuration module
//!
//! Type-safe configuration loaded from environment variables using the
//! `config` and `dotenvy` crates. Variables use the `AGENT_RELAY` prefix and
//! `__` between nested keys. Both binaries load the same `AppConfig`; the
//! gateway ignores `worker` and the worker ignores the HTTP settings.
//!
//! # Example
//!
//! ```no_run
//! use agent_relay::config::AppConfig;
//!
//! let config = AppConfig::load().expect("Failed to load configuration");
//! config.validate().expect("Invalid configuration");
//! ```

mod auth;
mod error;
mod redis;
mod relay;
mod server;
mod worker;

pub use auth::AuthConfig;
pub use error::{ConfigError, ValidationError};
pub use redis::RedisConfig;
pub use relay::RelayConfig;
pub use server::{Environment, LogFormat, ServerConfig};
pub use worker::WorkerConfig;

use serde::Deserialize;

/// Root application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// HTTP server and logging
    #[serde(default)]
    pub server: ServerConfig,

    /// Redis connection (bus, queue, document store)
    pub redis: RedisConfig,

    /// Access token verification
    pub auth: AuthConfig,

    /// Bus channel and delivery tuning
    #[serde(default)]
    pub relay: RelayConfig,

    /// Job consumption
    #[serde(default)]
    pub worker: WorkerConfig,
}

impl AppConfig {
    /// Load configuration from environment variables
    ///
    /// This function:
    /// 1. Loads `.env` file if present (for development)
    /// 2. Reads environment variables with `AGENT_RELAY` prefix
    /// 3. Uses `__` (double underscore) to separate nested values
    /// 4. Deserializes into typed configuration structs
    ///
    /// # Environment Variable Format
    ///
    /// - `AGENT_RELAY__SERVER__PORT=8080` -> `server.port = 8080`
    /// - `AGENT_RELAY__REDIS__URL=...` -> `redis.url = ...`
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required variables are missing or values
    /// cannot be parsed into the expected types.
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let config = config::Config::builder()
            .add_source(
                config::Environment::default()
                    .prefix("AGENT_RELAY")
                    .separator("__"),
            )
            .build()?
            .try_deserialize()?;

        Ok(config)
    }

    /// Validate all configuration values
    ///
    /// # Errors
    ///
    /// Returns `ValidationError` if any configuration value is invalid.
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.server.validate()?;
        self.redis.validate()?;
        self.auth.validate(&self.server.environment)?;
        self.relay.validate()?;
        self.worker.validate()?;
        Ok(())
    }

    /// Load and validate in one step.
    pub fn load_validated() -> Result<Self, ConfigError> {
        let config = Self::load()?;
        config.validate()?;
        Ok(config)
    }

    pub fn is_production(&self) -> bool {
        self.server.is_production()
    }
}
