//! Client-visible WebSocket frame.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Reserved and handler-defined outbound event names.
pub mod events {
    pub const CONNECTION_ESTABLISHED: &str = "connection_established";
    pub const ERROR: &str = "error";
    pub const AGENT_RESPONSE: &str = "agent_response";
    pub const PROCESSING_SESSION: &str = "processing_session";
    pub const MESSAGE_INGESTED: &str = "message_ingested";
    pub const PONG: &str = "pong";
}

/// One JSON text frame sent to a client: `{"event": ..., "data": {...}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    pub event: String,
    #[serde(default = "empty_object")]
    pub data: Value,
}

impl Frame {
    pub fn new(event: impl Into<String>, data: Value) -> Self {
        Self {
            event: event.into(),
            data,
        }
    }

    /// An `error` frame carrying a human readable message.
    pub fn error(message: impl Into<String>) -> Self {
        Self::new(events::ERROR, json!({ "message": message.into() }))
    }

    /// Returns true for `error` frames.
    pub fn is_error(&self) -> bool {
        self.event == events::ERROR
    }

    /// Serializes the frame to the text sent over the socket.
    pub fn to_text(&self) -> String {
        json!({ "event": self.event, "data": self.data }).to_string()
    }
}

pub(crate) fn empty_object() -> Value {
    Value::Object(Default::default())
}
