//! Relay listener: bridges the shared bus channel into the local registry.
//!
//! # Event Flow
//!
//! ```text
//! worker ── publish ──▶ bus channel ──▶ RelayListener (every gateway)
//!                                          │ decode Envelope
//!                                          ├─ broadcast ──▶ every local connection
//!                                          └─ unicast ────▶ registry.get(id)
//!                                                            ├─ present ─▶ queue Frame
//!                                                            └─ absent ──▶ drop (owned elsewhere)
//! ```
//!
//! Each payload is handled on its own: a bad envelope or a failed send is
//! logged and the loop moves on to the next message.

use std::sync::Arc;

use super::registry::ConnectionRegistry;
use crate::adapters::events::ResilientSubscription;
use crate::domain::relay::{Envelope, Target};

/// What happened to one bus payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayOutcome {
    /// Queued for the addressed local connection.
    Delivered,
    /// Fanned out to this many local connections.
    Broadcast { recipients: usize },
    /// Addressed to a connection this process does not own.
    NotLocal,
    /// Could not be decoded.
    Invalid,
    /// The local connection refused the frame.
    Failed,
}

/// Counters returned when the listener stops.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RelayStats {
    pub delivered: u64,
    pub broadcasts: u64,
    pub not_local: u64,
    pub invalid: u64,
    pub failed: u64,
}

impl RelayStats {
    fn record(&mut self, outcome: &RelayOutcome) {
        match outcome {
            RelayOutcome::Delivered => self.delivered += 1,
            RelayOutcome::Broadcast { .. } => self.broadcasts += 1,
            RelayOutcome::NotLocal => self.not_local += 1,
            RelayOutcome::Invalid => self.invalid += 1,
            RelayOutcome::Failed => self.failed += 1,
        }
    }
}

pub struct RelayListener {
    registry: Arc<ConnectionRegistry>,
    subscription: ResilientSubscription,
}

impl RelayListener {
    pub fn new(registry: Arc<ConnectionRegistry>, subscription: ResilientSubscription) -> Self {
        Self {
            registry,
            subscription,
        }
    }

    /// Subscribes before the gateway starts accepting sockets.
    pub async fn connect(&mut self) -> bool {
        self.subscription.connect().await
    }

    /// Relays bus payloads until shutdown.
    pub async fn run(mut self) -> RelayStats {
        let mut stats = RelayStats::default();
        tracing::info!(channel = %self.subscription.channel(), "Relay listener started");

        while let Some(payload) = self.subscription.next().await {
            let outcome = Self::relay(&self.registry, &payload);
            stats.record(&outcome);
        }

        tracing::info!(
            channel = %self.subscription.channel(),
            delivered = stats.delivered,
            broadcasts = stats.broadcasts,
            not_local = stats.not_local,
            invalid = stats.invalid,
            failed = stats.failed,
            resubscribes = self.subscription.resubscribes(),
            "Relay listener stopped"
        );
        stats
    }

    /// Routes one raw bus payload to local connections.
    pub fn relay(registry: &ConnectionRegistry, payload: &str) -> RelayOutcome {
        let envelope = match Envelope::decode(payload) {
            Ok(envelope) => envelope,
            Err(e) => {
                tracing::warn!(error = %e, "Dropping undecodable bus message");
                return RelayOutcome::Invalid;
            }
        };

        match envelope.target() {
            Some(Target::Broadcast { exclude }) => {
                let recipients = registry.broadcast(&envelope.to_frame(), exclude);
                tracing::debug!(event = %envelope.event, recipients, "Broadcast relayed");
                RelayOutcome::Broadcast { recipients }
            }
            Some(Target::Connection(id)) => {
                let Some(connection) = registry.get(id) else {
                    tracing::debug!(
                        connection_id = %id,
                        event = %envelope.event,
                        "Connection not local, dropping"
                    );
                    return RelayOutcome::NotLocal;
                };
                match connection.deliver(&envelope.to_frame()) {
                    Ok(()) => RelayOutcome::Delivered,
                    Err(e) => {
                        tracing::debug!(
                            connection_id = %id,
                            event = %envelope.event,
                            error = %e,
                            "Relay send failed"
                        );
                        RelayOutcome::Failed
                    }
                }
            }
            // decode() rejects envelopes without a target
            None => RelayOutcome::Invalid,
        }
    }
}
