//! Per-connection ingress loop.
//!
//! `IngressSession::open` mints the connection id, registers the
//! connection and greets the client with `connection_established`.
//! `run` then reads inbound frames until the socket closes: protocol and
//! dispatch errors become `error` frames and the loop carries on; transport
//! errors and close frames end it. The registry entry is owned by a guard,
//! so the connection is unregistered exactly once on every exit path,
//! including a panic or an aborted task.

use std::sync::Arc;
use std::time::Instant;

use futures::{Stream, StreamExt};

use super::connection::ClientConnection;
use super::messages::{connection_established, parse_inbound, ProtocolError};
use super::registry::ConnectionRegistry;
use crate::application::{HandlerContext, HandlerRegistry};
use crate::domain::foundation::{AuthenticatedUser, ConnectionId};
use crate::domain::relay::Frame;

/// Transport-neutral view of what arrived on the socket.
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    Text(String),
    Binary,
    /// Protocol ping/pong, answered by the transport.
    Control,
    Close,
    Error(String),
}

/// Why the read loop ended.
#[derive(Debug, Clone, PartialEq)]
pub enum CloseReason {
    /// The client sent a close frame.
    ClientClosed,
    /// The inbound stream ended without a close frame.
    StreamEnded,
    /// Reading from the socket failed.
    TransportError(String),
    /// The server closed the connection (overflow, writer failure, shutdown).
    ServerClosed,
}

/// Removes the connection from the registry when dropped.
struct Registration {
    registry: Arc<ConnectionRegistry>,
    connection: Arc<ClientConnection>,
}

impl Drop for Registration {
    fn drop(&mut self) {
        self.connection.request_close();
        if self.registry.unregister(self.connection.id()).is_some() {
            tracing::info!(
                connection_id = %self.connection.id(),
                remaining = self.registry.len(),
                "Connection unregistered"
            );
        }
    }
}

pub struct IngressSession {
    connection: Arc<ClientConnection>,
    handlers: Arc<HandlerRegistry>,
    _registration: Registration,
}

impl IngressSession {
    /// Registers a new connection for an authenticated user.
    ///
    /// Returns the session and the receiver the socket writer drains.
    pub fn open(
        registry: Arc<ConnectionRegistry>,
        handlers: Arc<HandlerRegistry>,
        user: AuthenticatedUser,
        client_buffer: usize,
    ) -> (Self, tokio::sync::mpsc::Receiver<String>) {
        let (connection, rx) = loop {
            let (connection, rx) = ClientConnection::new(ConnectionId::new(), user.clone(), client_buffer);
            if registry.register(connection.clone()) {
                break (connection, rx);
            }
            tracing::warn!(connection_id = %connection.id(), "Connection id collision, minting another");
        };

        tracing::info!(
            connection_id = %connection.id(),
            user_id = %user.id,
            connections = registry.len(),
            "Connection registered"
        );

        let greeting = connection_established(connection.id(), &user, connection.connected_at());
        if let Err(e) = connection.send_frame(&greeting) {
            tracing::debug!(connection_id = %connection.id(), error = %e, "Failed to greet client");
        }

        let session = Self {
            connection: connection.clone(),
            handlers,
            _registration: Registration { registry, connection },
        };
        (session, rx)
    }

    pub fn connection(&self) -> &Arc<ClientConnection> {
        &self.connection
    }

    pub fn connection_id(&self) -> &ConnectionId {
        self.connection.id()
    }

    /// Reads inbound frames until the connection ends.
    ///
    /// Consumes the session; the connection is unregistered on return.
    pub async fn run<S>(self, mut inbound: S) -> CloseReason
    where
        S: Stream<Item = Inbound> + Unpin,
    {
        let reason = loop {
            let next = tokio::select! {
                _ = self.connection.closed() => break CloseReason::ServerClosed,
                next = inbound.next() => next,
            };

            match next {
                None => break CloseReason::StreamEnded,
                Some(Inbound::Close) => break CloseReason::ClientClosed,
                Some(Inbound::Error(e)) => break CloseReason::TransportError(e),
                Some(Inbound::Control) => {}
                Some(Inbound::Binary) => self.reject(ProtocolError::Binary),
                Some(Inbound::Text(text)) => self.handle_text(&text).await,
            }
        };

        tracing::debug!(
            connection_id = %self.connection.id(),
            reason = ?reason,
            "Ingress loop ended"
        );
        reason
    }

    async fn handle_text(&self, text: &str) {
        let inbound = match parse_inbound(text) {
            Ok(inbound) => inbound,
            Err(e) => return self.reject(e),
        };

        let ctx = HandlerContext {
            connection_id: self.connection.id().clone(),
            user: self.connection.user().clone(),
        };

        let started = Instant::now();
        match self.handlers.dispatch(&ctx, &inbound.event, inbound.data).await {
            Ok(reply) => {
                if reply.run_dispatched {
                    self.connection.mark_run_dispatched_since(started);
                }
                if let Some(frame) = reply.frame {
                    self.send(&frame);
                }
            }
            Err(e) => {
                tracing::warn!(
                    connection_id = %self.connection.id(),
                    event = %inbound.event,
                    error = %e,
                    "Failed to handle inbound event"
                );
                self.send(&e.to_frame());
            }
        }
    }

    fn reject(&self, error: ProtocolError) {
        tracing::warn!(connection_id = %self.connection.id(), error = %error, "Protocol error");
        self.send(&error.to_frame());
    }

    fn send(&self, frame: &Frame) {
        if let Err(e) = self.connection.send_frame(frame) {
            tracing::debug!(
                connection_id = %self.connection.id(),
                event = %frame.event,
                error = %e,
                "Failed to queue frame"
            );
        }
    }
}
