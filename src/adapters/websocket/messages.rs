//! WebSocket message protocol.
//!
//! Client → server frames are `{"event": "<name>", "data": {...}}`.
//! Server → client frames use the same shape (see [`Frame`]).

use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use crate::domain::foundation::{AuthenticatedUser, ConnectionId, Timestamp};
use crate::domain::relay::{events, Frame};

// ============================================
// Client → Server
// ============================================

/// A decoded inbound frame.
#[derive(Debug, Clone, PartialEq)]
pub struct InboundEvent {
    pub event: String,
    pub data: Value,
}

/// Malformed inbound frames. The messages are shown to the client verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    #[error("Invalid JSON message")]
    InvalidJson,

    #[error("Missing 'event' field in message")]
    MissingEvent,

    #[error("Binary messages are not supported")]
    Binary,
}

impl ProtocolError {
    pub fn to_frame(&self) -> Frame {
        Frame::error(self.to_string())
    }
}

/// Parses a text frame into an event name and payload.
///
/// `data` defaults to an empty object when absent or null.
pub fn parse_inbound(text: &str) -> Result<InboundEvent, ProtocolError> {
    let value: Value = serde_json::from_str(text).map_err(|_| ProtocolError::InvalidJson)?;
    let Value::Object(mut object) = value else {
        return Err(ProtocolError::MissingEvent);
    };

    let event = match object.remove("event") {
        Some(Value::String(event)) if !event.trim().is_empty() => event,
        _ => return Err(ProtocolError::MissingEvent),
    };

    let data = match object.remove("data") {
        None | Some(Value::Null) => Value::Object(Default::default()),
        Some(data) => data,
    };

    Ok(InboundEvent { event, data })
}

// ============================================
// Server → Client
// ============================================

/// Payload of the `connection_established` frame.
#[derive(Debug, Clone, Serialize)]
pub struct ConnectionEstablished<'a> {
    pub connection_id: &'a ConnectionId,
    pub user_id: &'a str,
    pub status: &'static str,
    pub connected_at: String,
}

/// The first frame every client receives.
pub fn connection_established(
    connection_id: &ConnectionId,
    user: &AuthenticatedUser,
    connected_at: &Timestamp,
) -> Frame {
    let payload = ConnectionEstablished {
        connection_id,
        user_id: user.id.as_str(),
        status: "connected",
        connected_at: connected_at.to_rfc3339(),
    };
    let data = serde_json::to_value(payload).unwrap_or_else(|_| {
        serde_json::json!({ "connection_id": connection_id, "status": "connected" })
    });
    Frame::new(events::CONNECTION_ESTABLISHED, data)
}
