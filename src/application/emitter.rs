//! Worker event emitter: turns one agent run into `agent_response` envelopes.
//!
//! Every envelope is addressed to the connection that dispatched the run and
//! handed to the [`RelayPublisher`] in the order the run produced it. A bad
//! event (untranslatable, or refused by the publisher) is logged and skipped.
//! The terminal `done` envelope is always published last, exactly once.

use std::sync::Arc;

use futures::StreamExt;
use serde_json::{json, Value};

use crate::domain::agent::{AgentStreamEvent, RunEvent};
use crate::domain::foundation::{ConnectionId, SessionId};
use crate::domain::relay::{events, Envelope};
use crate::ports::{RelayPublisher, RunEventStream};

/// Outcome of relaying one run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunSummary {
    /// Envelopes accepted by the publisher, `done` included.
    pub relayed: usize,

    /// Run events with no client-facing translation.
    pub skipped: usize,

    /// Events that could not be translated or queued.
    pub failed: usize,

    /// Whether the run's stream ended with an error.
    pub errored: bool,

    /// Assistant reply text: the concatenated tokens, or the last full
    /// message output when the run streamed no tokens.
    pub reply: String,
}

/// Publishes events for a single connection.
#[derive(Clone)]
pub struct WorkerEventEmitter {
    publisher: Arc<dyn RelayPublisher>,
    connection_id: ConnectionId,
}

impl WorkerEventEmitter {
    pub fn new(publisher: Arc<dyn RelayPublisher>, connection_id: ConnectionId) -> Self {
        Self {
            publisher,
            connection_id,
        }
    }

    pub fn connection_id(&self) -> &ConnectionId {
        &self.connection_id
    }

    /// Sends one event to this emitter's connection.
    pub async fn send(&self, event: &str, data: Value) -> bool {
        let envelope = Envelope::unicast(self.connection_id.clone(), event, data);
        self.publisher.relay(envelope).await
    }

    /// Sends one event to every connection on every gateway, minus `exclude`.
    pub async fn broadcast(&self, event: &str, data: Value, exclude: Vec<ConnectionId>) -> bool {
        let envelope = Envelope::broadcast(event, data).excluding(exclude);
        self.publisher.relay(envelope).await
    }

    /// Relays a run's event stream, then the terminal `done`.
    pub async fn emit_stream(&self, mut stream: RunEventStream, session_id: &SessionId) -> RunSummary {
        let mut summary = RunSummary::default();
        let mut tokens = String::new();
        let mut last_output: Option<String> = None;

        while let Some(item) = stream.next().await {
            let event = match item {
                Ok(event) => event,
                Err(e) => {
                    tracing::error!(
                        connection_id = %self.connection_id,
                        session_id = %session_id,
                        error = %e,
                        "Agent run failed mid-stream"
                    );
                    summary.errored = true;
                    if self.send(events::ERROR, json!({ "message": e.to_string() })).await {
                        summary.relayed += 1;
                    } else {
                        summary.failed += 1;
                    }
                    break;
                }
            };

            match &event {
                RunEvent::TextDelta(delta) => tokens.push_str(delta),
                RunEvent::MessageOutput { text, .. } => last_output = Some(text.clone()),
                _ => {}
            }

            let Some(stream_event) = AgentStreamEvent::from_run_event(&event) else {
                tracing::trace!(event = event.label(), "Run event has no client form");
                summary.skipped += 1;
                continue;
            };

            if self.send_stream_event(&stream_event).await {
                summary.relayed += 1;
            } else {
                summary.failed += 1;
            }
        }

        if self.send_done(session_id).await {
            summary.relayed += 1;
        } else {
            summary.failed += 1;
        }

        summary.reply = if tokens.is_empty() {
            last_output.unwrap_or_default()
        } else {
            tokens
        };

        tracing::info!(
            connection_id = %self.connection_id,
            session_id = %session_id,
            relayed = summary.relayed,
            skipped = summary.skipped,
            failed = summary.failed,
            "Run relayed"
        );
        summary
    }

    /// Reports a run that could not start, then closes it with `done`.
    pub async fn emit_failure(&self, session_id: &SessionId, message: &str) {
        self.send(events::ERROR, json!({ "message": message })).await;
        self.send_done(session_id).await;
    }

    async fn send_stream_event(&self, event: &AgentStreamEvent) -> bool {
        if event.is_done() {
            tracing::debug!(connection_id = %self.connection_id, "Relaying run completion");
        }
        match event.to_payload() {
            Ok(payload) => self.send(events::AGENT_RESPONSE, payload).await,
            Err(e) => {
                tracing::warn!(
                    connection_id = %self.connection_id,
                    kind = event.kind(),
                    error = %e,
                    "Failed to serialize stream event"
                );
                false
            }
        }
    }

    async fn send_done(&self, session_id: &SessionId) -> bool {
        self.send_stream_event(&AgentStreamEvent::done(session_id.clone()))
            .await
    }
}
