//! Inbound event handler registry and dispatch.
//!
//! The table is built once at process start (builder style) and is
//! read-only afterwards. Dispatch never panics past the caller: unknown
//! events, handler errors, panics and timeouts all come back as `DispatchError`,
//! which the ingress loop turns into an `error` frame.

use std::any::Any;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::FutureExt;
use serde_json::Value;
use thiserror::Error;

use crate::domain::foundation::{
    AuthenticatedUser, ConnectionId, DomainError, ErrorCode, ValidationError,
};
use crate::domain::relay::Frame;
use crate::ports::QueueError;

/// Who sent the inbound event.
#[derive(Debug, Clone)]
pub struct HandlerContext {
    pub connection_id: ConnectionId,
    pub user: AuthenticatedUser,
}

/// What a handler wants the ingress loop to do next.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HandlerReply {
    /// Frame to send back to the same connection.
    pub frame: Option<Frame>,

    /// True when the handler started a run that will stream events back.
    pub run_dispatched: bool,
}

impl HandlerReply {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn frame(frame: Frame) -> Self {
        Self {
            frame: Some(frame),
            run_dispatched: false,
        }
    }

    pub fn run_started(frame: Frame) -> Self {
        Self {
            frame: Some(frame),
            run_dispatched: true,
        }
    }
}

/// Failures raised by handlers. The message is shown to the client.
#[derive(Debug, Clone, Error)]
pub enum HandlerError {
    #[error("{0}")]
    InvalidPayload(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Internal(String),
}

impl From<ValidationError> for HandlerError {
    fn from(err: ValidationError) -> Self {
        HandlerError::InvalidPayload(err.to_string())
    }
}

impl From<DomainError> for HandlerError {
    fn from(err: DomainError) -> Self {
        match err.code {
            ErrorCode::ValidationFailed => HandlerError::InvalidPayload(err.message),
            ErrorCode::SessionNotFound => HandlerError::NotFound(err.message),
            _ => HandlerError::Internal(err.message),
        }
    }
}

impl From<QueueError> for HandlerError {
    fn from(err: QueueError) -> Self {
        HandlerError::Internal(err.to_string())
    }
}

#[derive(Debug, Clone, Error)]
pub enum DispatchError {
    #[error("Unknown event: {0}")]
    UnknownEvent(String),

    #[error("Error processing event: {0}")]
    Handler(#[from] HandlerError),

    #[error("Error processing event: handler timed out")]
    TimedOut,

    #[error("Error processing event: {0}")]
    Panicked(String),
}

impl DispatchError {
    /// The `error` frame reported to the client.
    pub fn to_frame(&self) -> Frame {
        Frame::error(self.to_string())
    }
}

/// Handles one inbound event name.
#[async_trait]
pub trait InboundHandler: Send + Sync {
    async fn handle(&self, ctx: &HandlerContext, data: Value) -> Result<HandlerReply, HandlerError>;
}

/// Maps inbound event names to handlers.
pub struct HandlerRegistry {
    handlers: HashMap<String, Arc<dyn InboundHandler>>,
    timeout: Duration,
}

impl HandlerRegistry {
    /// Default limit for a single handler call.
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
            timeout: Self::DEFAULT_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Registers a handler, replacing any previous one for the same name.
    pub fn register(&mut self, event: impl Into<String>, handler: impl InboundHandler + 'static) {
        self.handlers.insert(event.into(), Arc::new(handler));
    }

    pub fn with_handler(mut self, event: impl Into<String>, handler: impl InboundHandler + 'static) -> Self {
        self.register(event, handler);
        self
    }

    pub fn has_handler(&self, event: &str) -> bool {
        self.handlers.contains_key(event)
    }

    /// Registered event names (sorted).
    pub fn events(&self) -> Vec<String> {
        let mut names: Vec<String> = self.handlers.keys().cloned().collect();
        names.sort();
        names
    }

    pub async fn dispatch(
        &self,
        ctx: &HandlerContext,
        event: &str,
        data: Value,
    ) -> Result<HandlerReply, DispatchError> {
        let Some(handler) = self.handlers.get(event) else {
            return Err(DispatchError::UnknownEvent(event.to_string()));
        };

        let call = AssertUnwindSafe(handler.handle(ctx, data)).catch_unwind();
        match tokio::time::timeout(self.timeout, call).await {
            Ok(Ok(result)) => Ok(result?),
            Ok(Err(panic)) => {
                let message = panic_message(panic.as_ref());
                tracing::error!(
                    connection_id = %ctx.connection_id,
                    event,
                    panic = %message,
                    "Handler panicked"
                );
                Err(DispatchError::Panicked(message))
            }
            Err(_elapsed) => {
                tracing::error!(
                    connection_id = %ctx.connection_id,
                    event,
                    timeout_secs = self.timeout.as_secs_f64(),
                    "Handler timed out"
                );
                Err(DispatchError::TimedOut)
            }
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "handler panicked".to_string()
    }
}

impl Default for HandlerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::foundation::UserId;
    use serde_json::json;

    struct EchoHandler;

    #[async_trait]
    impl InboundHandler for EchoHandler {
        async fn handle(&self, _ctx: &HandlerContext, data: Value) -> Result<HandlerReply, HandlerError> {
            Ok(HandlerReply::frame(Frame::new("echo", data)))
        }
    }

    struct FailingHandler;

    #[async_trait]
    impl InboundHandler for FailingHandler {
        async fn handle(&self, _ctx: &HandlerContext, _data: Value) -> Result<HandlerReply, HandlerError> {
            Err(HandlerError::NotFound("Session not found: s-1".into()))
        }
    }

    struct SlowHandler;

    #[async_trait]
    impl InboundHandler for SlowHandler {
        async fn handle(&self, _ctx: &HandlerContext, _data: Value) -> Result<HandlerReply, HandlerError> {
            tokio::time::sleep(Duration::from_secs(10)).await;
            Ok(HandlerReply::none())
        }
    }

    struct PanickingHandler;

    #[async_trait]
    impl InboundHandler for PanickingHandler {
        async fn handle(&self, _ctx: &HandlerContext, _data: Value) -> Result<HandlerReply, HandlerError> {
            panic!("session store exploded");
        }
    }

    fn ctx() -> HandlerContext {
        HandlerContext {
            connection_id: ConnectionId::new(),
            user: AuthenticatedUser::new(UserId::new("u-1").unwrap(), None),
        }
    }

    #[tokio::test]
    async fn dispatches_to_registered_handler() {
        let registry = HandlerRegistry::new().with_handler("echo", EchoHandler);
        let reply = registry.dispatch(&ctx(), "echo", json!({"a": 1})).await.unwrap();
        assert_eq!(reply.frame, Some(Frame::new("echo", json!({"a": 1}))));
        assert!(!reply.run_dispatched);
    }

    #[tokio::test]
    async fn unknown_event_is_a_recoverable_error() {
        let registry = HandlerRegistry::new();
        let err = registry.dispatch(&ctx(), "unknown_event", json!({})).await.unwrap_err();
        assert_eq!(err.to_string(), "Unknown event: unknown_event");
        assert_eq!(err.to_frame().data, json!({"message": "Unknown event: unknown_event"}));
    }

    #[tokio::test]
    async fn handler_errors_are_prefixed() {
        let registry = HandlerRegistry::new().with_handler("f", FailingHandler);
        let err = registry.dispatch(&ctx(), "f", json!({})).await.unwrap_err();
        assert_eq!(
            err.to_string(),
            "Error processing event: Session not found: s-1"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn slow_handlers_time_out() {
        let registry = HandlerRegistry::new()
            .with_timeout(Duration::from_secs(1))
            .with_handler("slow", SlowHandler);
        let err = registry.dispatch(&ctx(), "slow", json!({})).await.unwrap_err();
        assert!(matches!(err, DispatchError::TimedOut));
    }

    #[tokio::test]
    async fn panicking_handler_becomes_an_error() {
        let registry = HandlerRegistry::new()
            .with_handler("boom", PanickingHandler)
            .with_handler("echo", EchoHandler);

        let err = registry.dispatch(&ctx(), "boom", json!({})).await.unwrap_err();
        assert!(matches!(err, DispatchError::Panicked(_)));
        assert_eq!(
            err.to_string(),
            "Error processing event: session store exploded"
        );

        let reply = registry.dispatch(&ctx(), "echo", json!({})).await.unwrap();
        assert!(reply.frame.is_some());
    }

    #[test]
    fn lists_registered_events() {
        let registry = HandlerRegistry::new()
            .with_handler("ping", EchoHandler)
            .with_handler("ingest_message", EchoHandler);
        assert_eq!(registry.events(), vec!["ingest_message", "ping"]);
        assert!(registry.has_handler("ping"));
        assert!(!registry.has_handler("pong"));
    }

    #[test]
    fn domain_errors_map_to_handler_errors() {
        let not_found: HandlerError =
            DomainError::new(ErrorCode::SessionNotFound, "Session not found: x").into();
        assert!(matches!(not_found, HandlerError::NotFound(_)));
        let db: HandlerError = DomainError::new(ErrorCode::DatabaseError, "down").into();
        assert!(matches!(db, HandlerError::Internal(_)));
    }
}
