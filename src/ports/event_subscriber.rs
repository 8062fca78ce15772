//! EventSubscriber port - Interface for subscribing to a bus channel.

use async_trait::async_trait;
use futures::Stream;
use std::pin::Pin;

use super::event_publisher::BusError;

/// Stream of raw payloads received on one channel.
///
/// The stream ends (or yields an error) when the underlying subscription is
/// lost; callers that need a long-lived subscription resubscribe.
pub type MessageStream = Pin<Box<dyn Stream<Item = Result<String, BusError>> + Send>>;

/// Port for subscribing to a named channel.
///
/// Only messages published after the subscription is established are
/// delivered; there is no replay.
#[async_trait]
pub trait EventSubscriber: Send + Sync {
    async fn subscribe(&self, channel: &str) -> Result<MessageStream, BusError>;
}

/// Combined trait for event bus implementations.
pub trait EventBus: super::EventPublisher + EventSubscriber {}

// Blanket implementation - any type that implements both traits is an EventBus
impl<T: super::EventPublisher + EventSubscriber> EventBus for T {}
