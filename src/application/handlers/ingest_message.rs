//! `ingest_message` handler: stores the user's message and starts a run.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use super::registry::{HandlerContext, HandlerError, HandlerReply, InboundHandler};
use crate::application::WorkDispatcher;
use crate::domain::chat::{Message, Session};
use crate::domain::foundation::{SessionId, ValidationError};
use crate::domain::relay::{events, Frame};
use crate::ports::{MessageRepository, SessionRepository};

/// Inbound payload of `ingest_message`.
#[derive(Debug, Clone, Deserialize)]
pub struct IngestMessagePayload {
    #[serde(default)]
    pub session_id: Option<String>,

    #[serde(default)]
    pub content: Option<String>,

    #[serde(default)]
    pub attachments: Vec<String>,
}

impl IngestMessagePayload {
    pub fn from_value(data: Value) -> Result<Self, HandlerError> {
        serde_json::from_value(data)
            .map_err(|e| HandlerError::InvalidPayload(format!("Invalid ingest_message payload: {}", e)))
    }

    fn content(&self) -> Result<&str, ValidationError> {
        match self.content.as_deref() {
            None => Err(ValidationError::missing_field("content")),
            Some(c) if c.trim().is_empty() => Err(ValidationError::empty_field("content")),
            Some(c) => Ok(c),
        }
    }

    fn session_id(&self) -> Result<Option<SessionId>, ValidationError> {
        self.session_id.as_deref().map(SessionId::new).transpose()
    }
}

/// Persists the message, then enqueues `process_session` for the connection.
pub struct IngestMessageHandler {
    sessions: Arc<dyn SessionRepository>,
    messages: Arc<dyn MessageRepository>,
    dispatcher: WorkDispatcher,
}

impl IngestMessageHandler {
    pub fn new(
        sessions: Arc<dyn SessionRepository>,
        messages: Arc<dyn MessageRepository>,
        dispatcher: WorkDispatcher,
    ) -> Self {
        Self {
            sessions,
            messages,
            dispatcher,
        }
    }

    async fn resolve_session(
        &self,
        ctx: &HandlerContext,
        session_id: Option<SessionId>,
        content: &str,
    ) -> Result<Session, HandlerError> {
        let Some(id) = session_id else {
            let session = Session::started_from(ctx.user.id.clone(), content)?;
            self.sessions.save(&session).await?;
            tracing::info!(
                connection_id = %ctx.connection_id,
                session_id = %session.id(),
                "Session created"
            );
            return Ok(session);
        };

        // Another user's session is reported exactly like a missing one.
        match self.sessions.find_by_id(&id).await? {
            Some(session) if session.is_owner(&ctx.user.id) => Ok(session),
            _ => Err(HandlerError::NotFound(format!("Session not found: {}", id))),
        }
    }
}

#[async_trait]
impl InboundHandler for IngestMessageHandler {
    async fn handle(&self, ctx: &HandlerContext, data: Value) -> Result<HandlerReply, HandlerError> {
        let payload = IngestMessagePayload::from_value(data)?;
        let content = payload.content()?;
        let session_id = payload.session_id()?;

        let mut session = self.resolve_session(ctx, session_id, content).await?;

        let message = Message::from_user(
            session.id().clone(),
            ctx.user.id.clone(),
            content,
            payload.attachments.clone(),
        )?;
        self.messages.insert(&message).await?;

        session.touch();
        self.sessions.save(&session).await?;

        self.dispatcher.dispatch_run(&ctx.connection_id, session.id()).await?;

        let ack = Frame::new(
            events::MESSAGE_INGESTED,
            json!({
                "message_id": message.id().to_string(),
                "session_id": session.id().to_string(),
            }),
        );
        Ok(HandlerReply::run_started(ack))
    }
}
