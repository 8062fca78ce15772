//! `ping` handler.

use async_trait::async_trait;
use serde_json::{json, Value};

use super::registry::{HandlerContext, HandlerError, HandlerReply, InboundHandler};
use crate::domain::foundation::Timestamp;
use crate::domain::relay::{events, Frame};

/// Answers `ping` with `pong {timestamp}`.
#[derive(Debug, Default, Clone, Copy)]
pub struct PingHandler;

#[async_trait]
impl InboundHandler for PingHandler {
    async fn handle(&self, _ctx: &HandlerContext, _data: Value) -> Result<HandlerReply, HandlerError> {
        let frame = Frame::new(
            events::PONG,
            json!({ "timestamp": Timestamp::now().to_rfc3339() }),
        );
        Ok(HandlerReply::frame(frame))
    }
}
