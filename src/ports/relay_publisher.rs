//! RelayPublisher port - Hands envelopes to the bus without failing.
//!
//! Worker code producing client events must never be aborted by a bus
//! problem. Implementations queue the envelope and deal with transport
//! errors themselves (retry, log, drop).

use async_trait::async_trait;

use crate::domain::relay::Envelope;

#[async_trait]
pub trait RelayPublisher: Send + Sync {
    /// Queues an envelope for publishing, preserving call order.
    ///
    /// Returns false if the envelope was dropped without being queued.
    async fn relay(&self, envelope: Envelope) -> bool;
}
