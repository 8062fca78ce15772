//! Inbound WebSocket event handlers.
//!
//! The registry maps event names to handlers; `build_registry` wires the
//! handlers the gateway serves.

mod ingest_message;
mod ping;
mod registry;

use std::sync::Arc;
use std::time::Duration;

pub use ingest_message::{IngestMessageHandler, IngestMessagePayload};
pub use ping::PingHandler;
pub use registry::{
    DispatchError, HandlerContext, HandlerError, HandlerRegistry, HandlerReply, InboundHandler,
};

use crate::application::WorkDispatcher;
use crate::ports::{MessageRepository, SessionRepository};

/// Inbound event names served by the gateway.
pub mod names {
    pub const INGEST_MESSAGE: &str = "ingest_message";
    pub const PING: &str = "ping";
}

/// Builds the gateway's handler table.
pub fn build_registry(
    sessions: Arc<dyn SessionRepository>,
    messages: Arc<dyn MessageRepository>,
    dispatcher: WorkDispatcher,
    timeout: Duration,
) -> HandlerRegistry {
    HandlerRegistry::new()
        .with_timeout(timeout)
        .with_handler(
            names::INGEST_MESSAGE,
            IngestMessageHandler::new(sessions, messages, dispatcher),
        )
        .with_handler(names::PING, PingHandler)
}
