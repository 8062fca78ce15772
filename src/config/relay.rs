//! Relay configuration: bus channel, outbound queue, client buffers

use serde::Deserialize;
use std::time::Duration;

use super::error::ValidationError;

#[derive(Debug, Clone, Deserialize)]
pub struct RelayConfig {
    /// Shared pub/sub channel carrying envelopes
    #[serde(default = "default_channel")]
    pub channel: String,

    /// Envelopes queued by the outbound publisher before producers wait
    #[serde(default = "default_outbound_capacity")]
    pub outbound_capacity: usize,

    /// Extra publish attempts per envelope
    #[serde(default = "default_publish_retries")]
    pub publish_retries: u32,

    #[serde(default = "default_initial_backoff")]
    pub resubscribe_initial_backoff_ms: u64,

    #[serde(default = "default_max_backoff")]
    pub resubscribe_max_backoff_ms: u64,

    /// Frames queued per client before the client is dropped as too slow
    #[serde(default = "default_client_buffer")]
    pub client_buffer: usize,

    /// Seconds without run events before the client is told the run timed
    /// out (0 disables)
    #[serde(default = "default_run_idle_timeout")]
    pub run_idle_timeout_secs: u64,

    /// Limit for a single inbound handler call
    #[serde(default = "default_handler_timeout")]
    pub handler_timeout_secs: u64,
}

impl RelayConfig {
    pub fn resubscribe_initial_backoff(&self) -> Duration {
        Duration::from_millis(self.resubscribe_initial_backoff_ms)
    }

    pub fn resubscribe_max_backoff(&self) -> Duration {
        Duration::from_millis(self.resubscribe_max_backoff_ms)
    }

    /// `None` when the watchdog is disabled.
    pub fn run_idle_timeout(&self) -> Option<Duration> {
        (self.run_idle_timeout_secs > 0).then(|| Duration::from_secs(self.run_idle_timeout_secs))
    }

    pub fn handler_timeout(&self) -> Duration {
        Duration::from_secs(self.handler_timeout_secs)
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.channel.trim().is_empty() {
            return Err(ValidationError::MissingRequired("RELAY__CHANNEL"));
        }
        if self.outbound_capacity == 0 {
            return Err(ValidationError::MustBePositive("relay.outbound_capacity"));
        }
        if self.client_buffer == 0 {
            return Err(ValidationError::MustBePositive("relay.client_buffer"));
        }
        if self.handler_timeout_secs == 0 {
            return Err(ValidationError::MustBePositive("relay.handler_timeout_secs"));
        }
        if self.resubscribe_initial_backoff_ms == 0 {
            return Err(ValidationError::MustBePositive("relay.resubscribe_initial_backoff_ms"));
        }
        if self.resubscribe_initial_backoff_ms > self.resubscribe_max_backoff_ms {
            return Err(ValidationError::InvalidBackoff);
        }
        Ok(())
    }
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            channel: default_channel(),
            outbound_capacity: default_outbound_capacity(),
            publish_retries: default_publish_retries(),
            resubscribe_initial_backoff_ms: default_initial_backoff(),
            resubscribe_max_backoff_ms: default_max_backoff(),
            client_buffer: default_client_buffer(),
            run_idle_timeout_secs: default_run_idle_timeout(),
            handler_timeout_secs: default_handler_timeout(),
        }
    }
}

fn default_channel() -> String {
    "websocket_messages".to_string()
}

fn default_outbound_capacity() -> usize {
    1024
}

fn default_publish_retries() -> u32 {
    3
}

fn default_initial_backoff() -> u64 {
    100
}

fn default_max_backoff() -> u64 {
    30_000
}

fn default_client_buffer() -> usize {
    256
}

fn default_run_idle_timeout() -> u64 {
    120
}

fn default_handler_timeout() -> u64 {
    30
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_relay_config_defaults() {
        let config = RelayConfig::default();
        assert_eq!(config.channel, "websocket_messages");
        assert_eq!(config.outbound_capacity, 1024);
        assert_eq!(config.publish_retries, 3);
        assert_eq!(config.resubscribe_initial_backoff(), Duration::from_millis(100));
        assert_eq!(config.resubscribe_max_backoff(), Duration::from_secs(30));
        assert_eq!(config.client_buffer, 256);
        assert_eq!(config.run_idle_timeout(), Some(Duration::from_secs(120)));
        assert_eq!(config.handler_timeout(), Duration::from_secs(30));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zero_idle_timeout_disables_watchdog() {
        let config = RelayConfig {
            run_idle_timeout_secs: 0,
            ..Default::default()
        };
        assert_eq!(config.run_idle_timeout(), None);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validation_rejects_inverted_backoff() {
        let config = RelayConfig {
            resubscribe_initial_backoff_ms: 5_000,
            resubscribe_max_backoff_ms: 1_000,
            ..Default::default()
        };
        assert_eq!(config.validate(), Err(ValidationError::InvalidBackoff));
    }

    #[test]
    fn test_validation_rejects_zero_buffers() {
        let config = RelayConfig {
            client_buffer: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
