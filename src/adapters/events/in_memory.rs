//! In-memory event bus for tests and single-process runs.
//!
//! Each channel is a `tokio::sync::broadcast` channel, so every subscriber
//! sees every message published after it subscribed, in publish order.
//! Failure injection helpers let tests exercise retry and resubscribe paths.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};
use tokio::sync::broadcast;

use crate::ports::{BusError, EventPublisher, EventSubscriber, MessageStream};

const CHANNEL_CAPACITY: usize = 4096;

/// In-memory pub/sub bus.
///
/// # Example
///
/// ```ignore
/// let bus = Arc::new(InMemoryEventBus::new());
/// let mut stream = bus.subscribe("websocket_messages").await?;
/// bus.publish("websocket_messages", payload).await?;
/// assert_eq!(bus.published_on("websocket_messages").len(), 1);
/// ```
pub struct InMemoryEventBus {
    channels: Mutex<HashMap<String, broadcast::Sender<String>>>,
    published: Mutex<Vec<(String, String)>>,
    failing_publishes: AtomicUsize,
    failing_subscribes: AtomicUsize,
}

impl InMemoryEventBus {
    pub fn new() -> Self {
        Self {
            channels: Mutex::new(HashMap::new()),
            published: Mutex::new(Vec::new()),
            failing_publishes: AtomicUsize::new(0),
            failing_subscribes: AtomicUsize::new(0),
        }
    }

    fn sender(&self, channel: &str) -> broadcast::Sender<String> {
        self.channels
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(channel.to_string())
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .clone()
    }

    /// Takes one unit from a failure budget. True if the call should fail.
    fn consume_failure(budget: &AtomicUsize) -> bool {
        budget
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }

    // === Test Helpers ===

    /// Makes the next `n` publishes fail.
    pub fn fail_next_publishes(&self, n: usize) {
        self.failing_publishes.store(n, Ordering::SeqCst);
    }

    /// Makes the next `n` subscribe attempts fail.
    pub fn fail_next_subscribes(&self, n: usize) {
        self.failing_subscribes.store(n, Ordering::SeqCst);
    }

    /// Ends every open subscription on the channel, as a dropped broker
    /// connection would.
    pub fn disconnect(&self, channel: &str) {
        self.channels
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(channel);
    }

    /// Number of live subscribers on a channel.
    pub fn subscriber_count(&self, channel: &str) -> usize {
        self.channels
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(channel)
            .map(|tx| tx.receiver_count())
            .unwrap_or(0)
    }

    /// Payloads successfully published on a channel, in order.
    pub fn published_on(&self, channel: &str) -> Vec<String> {
        self.published
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|(c, _)| c == channel)
            .map(|(_, p)| p.clone())
            .collect()
    }

    pub fn published_count(&self) -> usize {
        self.published
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

impl Default for InMemoryEventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EventPublisher for InMemoryEventBus {
    async fn publish(&self, channel: &str, payload: String) -> Result<(), BusError> {
        if Self::consume_failure(&self.failing_publishes) {
            return Err(BusError::publish(channel, "injected failure"));
        }

        self.published
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((channel.to_string(), payload.clone()));

        // No subscribers is not an error, same as a broker with no listeners.
        let _ = self.sender(channel).send(payload);
        Ok(())
    }
}

#[async_trait]
impl EventSubscriber for InMemoryEventBus {
    async fn subscribe(&self, channel: &str) -> Result<MessageStream, BusError> {
        if Self::consume_failure(&self.failing_subscribes) {
            return Err(BusError::subscribe(channel, "injected failure"));
        }

        let rx = self.sender(channel).subscribe();
        let stream = futures::stream::unfold(rx, |mut rx| async move {
            loop {
                match rx.recv().await {
                    Ok(payload) => return Some((Ok(payload), rx)),
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "In-memory subscriber lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => return None,
                }
            }
        });
        Ok(Box::pin(stream))
    }
}
