//! Bus envelope.
//!
//! Wire shape (JSON, one message per bus publish):
//!
//! ```text
//! unicast:   {"connection_id": "<id>", "event": "...", "data": {...}}
//! broadcast: {"broadcast": true, "event": "...", "data": {...}, "exclude": ["<id>"]}
//! ```
//!
//! Unknown extra fields are ignored so newer producers can add metadata.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use super::frame::{empty_object, Frame};
use crate::domain::foundation::ConnectionId;

/// Failure to decode a bus message into an envelope.
#[derive(Debug, Error)]
pub enum EnvelopeError {
    #[error("malformed envelope: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("envelope has an empty event name")]
    EmptyEvent,

    #[error("envelope has neither a connection_id nor a broadcast flag")]
    NoTarget,
}

/// Who an envelope is addressed to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target<'a> {
    Connection(&'a ConnectionId),
    Broadcast { exclude: &'a [ConnectionId] },
}

/// The unit carried on the shared bus channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connection_id: Option<ConnectionId>,

    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub broadcast: bool,

    /// Connections a broadcast should skip.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub exclude: Vec<ConnectionId>,

    pub event: String,

    #[serde(default = "empty_object")]
    pub data: Value,
}

impl Envelope {
    /// Envelope addressed to one connection.
    pub fn unicast(connection_id: ConnectionId, event: impl Into<String>, data: Value) -> Self {
        Self {
            connection_id: Some(connection_id),
            broadcast: false,
            exclude: Vec::new(),
            event: event.into(),
            data,
        }
    }

    /// Envelope fanned out to every connection on every gateway.
    pub fn broadcast(event: impl Into<String>, data: Value) -> Self {
        Self {
            connection_id: None,
            broadcast: true,
            exclude: Vec::new(),
            event: event.into(),
            data,
        }
    }

    /// Skips the given connections when broadcasting.
    pub fn excluding(mut self, ids: impl IntoIterator<Item = ConnectionId>) -> Self {
        self.exclude.extend(ids);
        self
    }

    /// Decodes and validates a raw bus payload.
    ///
    /// The broadcast flag wins over a connection id when both are present.
    pub fn decode(payload: &str) -> Result<Self, EnvelopeError> {
        let envelope: Envelope = serde_json::from_str(payload)?;
        if envelope.event.trim().is_empty() {
            return Err(EnvelopeError::EmptyEvent);
        }
        if !envelope.broadcast && envelope.connection_id.is_none() {
            return Err(EnvelopeError::NoTarget);
        }
        Ok(envelope)
    }

    /// Serializes the envelope for publishing.
    pub fn encode(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Resolves the addressing mode of a decoded envelope.
    pub fn target(&self) -> Option<Target<'_>> {
        if self.broadcast {
            return Some(Target::Broadcast {
                exclude: &self.exclude,
            });
        }
        self.connection_id.as_ref().map(Target::Connection)
    }

    /// The client-visible part of the envelope.
    pub fn to_frame(&self) -> Frame {
        Frame::new(self.event.clone(), self.data.clone())
    }

    pub fn into_frame(self) -> Frame {
        Frame::new(self.event, self.data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn conn(id: &str) -> ConnectionId {
        ConnectionId::parse(id).unwrap()
    }

    #[test]
    fn unicast_wire_shape_omits_broadcast_fields() {
        let env = Envelope::unicast(conn("c1"), "agent_response", json!({"type": "token"}));
        let value: Value = serde_json::from_str(&env.encode().unwrap()).unwrap();
        assert_eq!(
            value,
            json!({"connection_id": "c1", "event": "agent_response", "data": {"type": "token"}})
        );
    }

    #[test]
    fn broadcast_wire_shape_has_flag_and_no_connection() {
        let env = Envelope::broadcast("notice", json!({}));
        let value: Value = serde_json::from_str(&env.encode().unwrap()).unwrap();
        assert_eq!(value, json!({"broadcast": true, "event": "notice", "data": {}}));
    }

    #[test]
    fn decode_accepts_foreign_producer_payload() {
        let env = Envelope::decode(
            r#"{"connection_id":"abc","event":"agent_response","data":{"x":1},"trace":"t"}"#,
        )
        .unwrap();
        assert_eq!(env.target(), Some(Target::Connection(&conn("abc"))));
        assert_eq!(env.data, json!({"x": 1}));
    }

    #[test]
    fn decode_defaults_missing_data() {
        let env = Envelope::decode(r#"{"broadcast":true,"event":"ping"}"#).unwrap();
        assert_eq!(env.data, json!({}));
        assert!(matches!(env.target(), Some(Target::Broadcast { exclude }) if exclude.is_empty()));
    }

    #[test]
    fn decode_rejects_untargeted_envelope() {
        let err = Envelope::decode(r#"{"event":"x","data":{}}"#).unwrap_err();
        assert!(matches!(err, EnvelopeError::NoTarget));
    }

    #[test]
    fn decode_rejects_empty_event() {
        let err = Envelope::decode(r#"{"connection_id":"a","event":" "}"#).unwrap_err();
        assert!(matches!(err, EnvelopeError::EmptyEvent));
    }

    #[test]
    fn decode_rejects_garbage() {
        assert!(matches!(
            Envelope::decode("not json").unwrap_err(),
            EnvelopeError::Malformed(_)
        ));
    }

    #[test]
    fn broadcast_flag_wins_over_connection_id() {
        let env = Envelope::decode(r#"{"connection_id":"a","broadcast":true,"event":"x"}"#).unwrap();
        assert!(matches!(env.target(), Some(Target::Broadcast { .. })));
    }

    #[test]
    fn excluding_round_trips_through_the_wire() {
        let env = Envelope::broadcast("x", json!({})).excluding([conn("a"), conn("b")]);
        let back = Envelope::decode(&env.encode().unwrap()).unwrap();
        assert_eq!(back.exclude, vec![conn("a"), conn("b")]);
    }

    #[test]
    fn into_frame_drops_addressing() {
        let frame = Envelope::unicast(conn("a"), "pong", json!({"t": 1})).into_frame();
        assert_eq!(frame, Frame::new("pong", json!({"t": 1})));
    }
}
