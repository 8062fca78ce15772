//! EventPublisher port - Interface for publishing raw messages on a bus channel.
//!
//! The relay only ever publishes serialized `Envelope`s, but the port is
//! payload-agnostic so adapters stay thin wrappers over the broker.

use async_trait::async_trait;
use thiserror::Error;

/// Errors raised by event bus adapters.
#[derive(Debug, Clone, Error)]
pub enum BusError {
    /// The broker could not be reached.
    #[error("bus connection failed: {0}")]
    Connection(String),

    #[error("publish to '{channel}' failed: {reason}")]
    Publish { channel: String, reason: String },

    #[error("subscribe to '{channel}' failed: {reason}")]
    Subscribe { channel: String, reason: String },

    /// The subscription stream ended or the adapter was shut down.
    #[error("bus subscription closed")]
    Closed,
}

impl BusError {
    pub fn publish(channel: impl Into<String>, reason: impl ToString) -> Self {
        BusError::Publish {
            channel: channel.into(),
            reason: reason.to_string(),
        }
    }

    pub fn subscribe(channel: impl Into<String>, reason: impl ToString) -> Self {
        BusError::Subscribe {
            channel: channel.into(),
            reason: reason.to_string(),
        }
    }
}

/// Port for publishing messages to a named channel.
///
/// Delivery is best-effort: a successful return means the broker accepted
/// the message, not that any subscriber received it. Messages published by
/// one caller on one channel reach subscribers in publish order.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish(&self, channel: &str, payload: String) -> Result<(), BusError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    // Compile-time check that trait is object-safe
    #[allow(dead_code)]
    fn assert_object_safe(_: &dyn EventPublisher) {}

    #[test]
    fn bus_error_messages_name_the_channel() {
        let err = BusError::publish("websocket_messages", "broken pipe");
        assert_eq!(
            err.to_string(),
            "publish to 'websocket_messages' failed: broken pipe"
        );
        let err = BusError::subscribe("websocket_messages", "refused");
        assert!(err.to_string().contains("refused"));
    }
}
