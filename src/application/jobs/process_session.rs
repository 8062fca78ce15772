//! `process_session(connection_id, session_id)`: one agent run.
//!
//! 1. Tell the client its session is being processed
//! 2. Load the session and its recent history
//! 3. Start the agent and relay its stream through the emitter
//! 4. Store the assistant's reply
//!
//! Anything that stops the run before the stream starts is reported to the
//! client as an `error` followed by `done`, so the client never waits on a
//! run that will not produce anything.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;

use crate::application::dispatcher::PROCESS_SESSION;
use crate::application::emitter::WorkerEventEmitter;
use crate::application::worker::{JobError, JobFunction};
use crate::domain::chat::Message;
use crate::domain::foundation::{ConnectionId, SessionId};
use crate::domain::relay::events;
use crate::ports::{AgentRunner, Job, MessageRepository, RelayPublisher, RunRequest, SessionRepository};

pub struct ProcessSessionJob {
    publisher: Arc<dyn RelayPublisher>,
    sessions: Arc<dyn SessionRepository>,
    messages: Arc<dyn MessageRepository>,
    runner: Arc<dyn AgentRunner>,
    history_limit: usize,
}

impl ProcessSessionJob {
    pub const DEFAULT_HISTORY_LIMIT: usize = 100;

    pub fn new(
        publisher: Arc<dyn RelayPublisher>,
        sessions: Arc<dyn SessionRepository>,
        messages: Arc<dyn MessageRepository>,
        runner: Arc<dyn AgentRunner>,
    ) -> Self {
        Self {
            publisher,
            sessions,
            messages,
            runner,
            history_limit: Self::DEFAULT_HISTORY_LIMIT,
        }
    }

    pub fn with_history_limit(mut self, limit: usize) -> Self {
        self.history_limit = limit;
        self
    }

    fn parse_args(job: &Job) -> Result<(ConnectionId, SessionId), JobError> {
        let connection_id = job
            .str_arg(0)
            .ok_or_else(|| JobError::InvalidArguments("missing connection_id".into()))
            .and_then(|s| {
                ConnectionId::parse(s).map_err(|e| JobError::InvalidArguments(e.to_string()))
            })?;
        let session_id = job
            .str_arg(1)
            .ok_or_else(|| JobError::InvalidArguments("missing session_id".into()))
            .and_then(|s| SessionId::new(s).map_err(|e| JobError::InvalidArguments(e.to_string())))?;
        Ok((connection_id, session_id))
    }

    async fn process(&self, emitter: &WorkerEventEmitter, session_id: &SessionId) -> Result<(), JobError> {
        let session = match self.sessions.find_by_id(session_id).await {
            Ok(Some(session)) => session,
            Ok(None) => {
                let message = format!("Session not found: {}", session_id);
                emitter.emit_failure(session_id, &message).await;
                return Err(JobError::SessionNotFound(session_id.to_string()));
            }
            Err(e) => {
                emitter.emit_failure(session_id, "Failed to load session").await;
                return Err(e.into());
            }
        };

        let history = match self.messages.recent(session_id, self.history_limit).await {
            Ok(history) => history,
            Err(e) => {
                emitter.emit_failure(session_id, "Failed to load session history").await;
                return Err(e.into());
            }
        };

        tracing::debug!(
            session_id = %session_id,
            history = history.len(),
            agent = self.runner.name(),
            "Starting agent run"
        );

        let stream = match self.runner.start(RunRequest { session: session.clone(), history }).await {
            Ok(stream) => stream,
            Err(e) => {
                emitter.emit_failure(session_id, &e.to_string()).await;
                return Err(e.into());
            }
        };

        let summary = emitter.emit_stream(stream, session_id).await;

        if summary.reply.is_empty() {
            return Ok(());
        }

        let reply = Message::from_assistant(session_id.clone(), session.user_id().clone(), summary.reply)?;
        self.messages.insert(&reply).await?;
        Ok(())
    }
}

#[async_trait]
impl JobFunction for ProcessSessionJob {
    fn name(&self) -> &str {
        PROCESS_SESSION
    }

    async fn run(&self, job: &Job) -> Result<(), JobError> {
        let (connection_id, session_id) = Self::parse_args(job)?;
        let emitter = WorkerEventEmitter::new(self.publisher.clone(), connection_id);

        emitter
            .send(events::PROCESSING_SESSION, json!({ "session_id": session_id.as_str() }))
            .await;

        self.process(&emitter, &session_id).await
    }
}
