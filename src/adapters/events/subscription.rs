//! Long-lived, reconnecting subscription to one bus channel.
//!
//! A lost subscription (stream error, stream end, failed subscribe) is
//! retried with exponential backoff. The caller only ever sees payloads;
//! `next()` returns `None` once shutdown is requested and never before.

use futures::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

use crate::ports::{EventSubscriber, MessageStream};
use crate::shutdown;

/// Exponential backoff with a ceiling.
#[derive(Debug, Clone)]
pub struct Backoff {
    initial: Duration,
    max: Duration,
    current: Duration,
}

impl Backoff {
    pub fn new(initial: Duration, max: Duration) -> Self {
        let initial = initial.max(Duration::from_millis(1));
        let max = max.max(initial);
        Self {
            initial,
            max,
            current: initial,
        }
    }

    /// Returns the delay to wait now and doubles the next one.
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        self.current = (self.current * 2).min(self.max);
        delay
    }

    pub fn reset(&mut self) {
        self.current = self.initial;
    }
}

enum Step {
    Payload(String),
    Lost(String),
    Shutdown,
}

pub struct ResilientSubscription {
    subscriber: Arc<dyn EventSubscriber>,
    channel: String,
    backoff: Backoff,
    stream: Option<MessageStream>,
    shutdown: watch::Receiver<bool>,
    resubscribes: u64,
}

impl ResilientSubscription {
    pub fn new(
        subscriber: Arc<dyn EventSubscriber>,
        channel: impl Into<String>,
        backoff: Backoff,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            subscriber,
            channel: channel.into(),
            backoff,
            stream: None,
            shutdown,
            resubscribes: 0,
        }
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }

    /// Times the subscription had to be re-established after a loss.
    pub fn resubscribes(&self) -> u64 {
        self.resubscribes
    }

    /// Subscribes eagerly so messages published right after this returns are
    /// not missed. Later losses are handled by `next()`.
    pub async fn connect(&mut self) -> bool {
        self.ensure_subscribed().await
    }

    /// Waits for the next payload.
    pub async fn next(&mut self) -> Option<String> {
        loop {
            if !self.ensure_subscribed().await {
                return None;
            }

            let step = match self.stream.as_mut() {
                Some(stream) => {
                    tokio::select! {
                        biased;
                        _ = shutdown::requested(&mut self.shutdown) => Step::Shutdown,
                        item = stream.next() => match item {
                            Some(Ok(payload)) => Step::Payload(payload),
                            Some(Err(e)) => Step::Lost(e.to_string()),
                            None => Step::Lost("stream ended".to_string()),
                        },
                    }
                }
                None => continue,
            };

            match step {
                Step::Payload(payload) => return Some(payload),
                Step::Shutdown => return None,
                Step::Lost(reason) => {
                    tracing::warn!(channel = %self.channel, %reason, "Bus subscription lost");
                    self.stream = None;
                    self.resubscribes += 1;
                    if !self.pause().await {
                        return None;
                    }
                }
            }
        }
    }

    /// Subscribes if needed, retrying with backoff. False on shutdown.
    async fn ensure_subscribed(&mut self) -> bool {
        while self.stream.is_none() {
            if *self.shutdown.borrow() {
                return false;
            }
            match self.subscriber.subscribe(&self.channel).await {
                Ok(stream) => {
                    tracing::info!(channel = %self.channel, "Subscribed to bus channel");
                    self.backoff.reset();
                    self.stream = Some(stream);
                }
                Err(e) => {
                    tracing::warn!(channel = %self.channel, error = %e, "Bus subscribe failed");
                    if !self.pause().await {
                        return false;
                    }
                }
            }
        }
        true
    }

    /// Sleeps for the next backoff delay. False if shutdown interrupted it.
    async fn pause(&mut self) -> bool {
        let delay = self.backoff.next_delay();
        tracing::debug!(channel = %self.channel, delay_ms = delay.as_millis() as u64, "Backing off");
        tokio::select! {
            _ = tokio::time::sleep(delay) => true,
            _ = shutdown::requested(&mut self.shutdown) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::events::InMemoryEventBus;
    use crate::ports::EventPublisher;

    fn fast_backoff() -> Backoff {
        Backoff::new(Duration::from_millis(1), Duration::from_millis(8))
    }

    #[test]
    fn backoff_doubles_up_to_max_and_resets() {
        let mut backoff = Backoff::new(Duration::from_millis(100), Duration::from_millis(350));
        assert_eq!(backoff.next_delay(), Duration::from_millis(100));
        assert_eq!(backoff.next_delay(), Duration::from_millis(200));
        assert_eq!(backoff.next_delay(), Duration::from_millis(350));
        assert_eq!(backoff.next_delay(), Duration::from_millis(350));
        backoff.reset();
        assert_eq!(backoff.next_delay(), Duration::from_millis(100));
    }

    #[test]
    fn backoff_max_never_below_initial() {
        let mut backoff = Backoff::new(Duration::from_millis(50), Duration::from_millis(10));
        assert_eq!(backoff.next_delay(), Duration::from_millis(50));
        assert_eq!(backoff.next_delay(), Duration::from_millis(50));
    }

    #[tokio::test]
    async fn retries_failed_subscribes() {
        let bus = Arc::new(InMemoryEventBus::new());
        bus.fail_next_subscribes(3);
        let (_tx, rx) = shutdown::channel();
        let mut sub = ResilientSubscription::new(bus.clone(), "ch", fast_backoff(), rx);

        assert!(sub.connect().await);
        bus.publish("ch", "hello".into()).await.unwrap();
        assert_eq!(sub.next().await.as_deref(), Some("hello"));
    }

    #[tokio::test]
    async fn resubscribes_after_disconnect() {
        let bus = Arc::new(InMemoryEventBus::new());
        let (_tx, rx) = shutdown::channel();
        let mut sub = ResilientSubscription::new(bus.clone(), "ch", fast_backoff(), rx);
        assert!(sub.connect().await);

        bus.disconnect("ch");

        let publisher = bus.clone();
        tokio::spawn(async move {
            while publisher.subscriber_count("ch") == 0 {
                tokio::time::sleep(Duration::from_millis(1)).await;
            }
            publisher.publish("ch", "after".into()).await.unwrap();
        });

        let got = tokio::time::timeout(Duration::from_secs(2), sub.next())
            .await
            .unwrap();
        assert_eq!(got.as_deref(), Some("after"));
        assert_eq!(sub.resubscribes(), 1);
    }

    #[tokio::test]
    async fn shutdown_ends_next() {
        let bus = Arc::new(InMemoryEventBus::new());
        let (tx, rx) = shutdown::channel();
        let mut sub = ResilientSubscription::new(bus, "ch", fast_backoff(), rx);
        assert!(sub.connect().await);

        tx.send(true).unwrap();
        let got = tokio::time::timeout(Duration::from_secs(1), sub.next())
            .await
            .unwrap();
        assert!(got.is_none());
    }

    #[tokio::test]
    async fn shutdown_interrupts_subscribe_retries() {
        let bus = Arc::new(InMemoryEventBus::new());
        bus.fail_next_subscribes(usize::MAX);
        let (tx, rx) = shutdown::channel();
        let slow = Backoff::new(Duration::from_secs(60), Duration::from_secs(60));
        let mut sub = ResilientSubscription::new(bus, "ch", slow, rx);

        let handle = tokio::spawn(async move { sub.connect().await });
        tokio::time::sleep(Duration::from_millis(10)).await;
        tx.send(true).unwrap();
        let connected = tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();
        assert!(!connected);
    }
}
