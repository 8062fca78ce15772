//! Outbound publisher - ordered, non-failing publishing onto the bus.
//!
//! Producers push envelopes onto a bounded in-process queue. A single sender
//! loop drains the queue and publishes each envelope on the relay channel,
//! retrying transient failures before moving on. Because there is exactly
//! one sender per process, envelopes leave the process in the order they
//! were queued. Failures are logged and counted; they never reach producers.
//! Queueing never waits: when the queue is full (the bus is down and the
//! loop is stuck retrying) the envelope is dropped, so a worker keeps
//! running its job instead of stalling behind the broker.
//!
//! ## Configuration
//!
//! | Setting | Default | Description |
//! |---------|---------|-------------|
//! | `capacity` | 1024 | Queued envelopes before new ones are dropped |
//! | `retries` | 3 | Extra publish attempts per envelope |
//! | `retry_delay` | 50ms | Base delay, multiplied by the attempt number |
//!
//! The loop exits once every `OutboundPublisher` handle has been dropped and
//! the queue is empty.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use async_trait::async_trait;

use crate::domain::relay::Envelope;
use crate::ports::{EventPublisher, RelayPublisher};

#[derive(Debug, Clone)]
pub struct OutboundConfig {
    pub channel: String,
    pub capacity: usize,
    pub retries: u32,
    pub retry_delay: Duration,
}

impl OutboundConfig {
    pub fn new(channel: impl Into<String>) -> Self {
        Self {
            channel: channel.into(),
            capacity: 1024,
            retries: 3,
            retry_delay: Duration::from_millis(50),
        }
    }

    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity.max(1);
        self
    }

    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }
}

/// Totals reported by the sender loop when it exits.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OutboundStats {
    pub published: u64,
    pub failed: u64,
}

/// Cloneable handle for queueing envelopes.
#[derive(Clone)]
pub struct OutboundPublisher {
    tx: mpsc::Sender<Envelope>,
    dropped: Arc<AtomicU64>,
}

impl OutboundPublisher {
    /// Starts the sender loop on the current runtime.
    pub fn spawn(
        publisher: Arc<dyn EventPublisher>,
        config: OutboundConfig,
    ) -> (Self, JoinHandle<OutboundStats>) {
        let (tx, rx) = mpsc::channel(config.capacity.max(1));
        let handle = tokio::spawn(drain(publisher, config, rx));
        let outbound = Self {
            tx,
            dropped: Arc::new(AtomicU64::new(0)),
        };
        (outbound, handle)
    }

    /// Queues an envelope without waiting.
    ///
    /// Returns false if the queue is full or the sender loop is gone; the
    /// envelope is dropped, logged and counted.
    pub async fn publish(&self, envelope: Envelope) -> bool {
        match self.tx.try_send(envelope) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(envelope)) => {
                let dropped = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                tracing::warn!(
                    event = %envelope.event,
                    connection_id = ?envelope.connection_id,
                    dropped,
                    "Outbound queue full, envelope dropped"
                );
                false
            }
            Err(mpsc::error::TrySendError::Closed(envelope)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                tracing::error!(event = %envelope.event, "Outbound publisher stopped, envelope dropped");
                false
            }
        }
    }

    /// Envelopes refused at the queue, across all clones of this handle.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Envelopes currently waiting to be sent.
    pub fn queued(&self) -> usize {
        self.tx.max_capacity() - self.tx.capacity()
    }
}

#[async_trait]
impl RelayPublisher for OutboundPublisher {
    async fn relay(&self, envelope: Envelope) -> bool {
        self.publish(envelope).await
    }
}

async fn drain(
    publisher: Arc<dyn EventPublisher>,
    config: OutboundConfig,
    mut rx: mpsc::Receiver<Envelope>,
) -> OutboundStats {
    let mut stats = OutboundStats::default();

    while let Some(envelope) = rx.recv().await {
        if send_with_retry(publisher.as_ref(), &config, &envelope).await {
            stats.published += 1;
        } else {
            stats.failed += 1;
        }
    }

    tracing::debug!(
        published = stats.published,
        failed = stats.failed,
        "Outbound publisher drained"
    );
    stats
}

async fn send_with_retry(
    publisher: &dyn EventPublisher,
    config: &OutboundConfig,
    envelope: &Envelope,
) -> bool {
    let payload = match envelope.encode() {
        Ok(payload) => payload,
        Err(e) => {
            tracing::error!(event = %envelope.event, error = %e, "Envelope serialization failed");
            return false;
        }
    };

    let mut attempt = 0;
    loop {
        match publisher.publish(&config.channel, payload.clone()).await {
            Ok(()) => return true,
            Err(e) if attempt < config.retries => {
                attempt += 1;
                tracing::warn!(
                    channel = %config.channel,
                    event = %envelope.event,
                    attempt,
                    error = %e,
                    "Publish failed, retrying"
                );
                tokio::time::sleep(config.retry_delay * attempt).await;
            }
            Err(e) => {
                tracing::error!(
                    channel = %config.channel,
                    event = %envelope.event,
                    connection_id = ?envelope.connection_id,
                    error = %e,
                    "Publish failed, envelope dropped"
                );
                return false;
            }
        }
    }
}
