//! AgentRunner port - Interface for executing one agent run.
//!
//! A run takes the session and its history and yields `RunEvent`s in the
//! order the agent produces them. The stream ending means the run finished.

use async_trait::async_trait;
use futures::Stream;
use std::pin::Pin;
use thiserror::Error;

use crate::domain::agent::RunEvent;
use crate::domain::chat::{Message, Session};

/// Errors raised while starting or driving a run.
#[derive(Debug, Clone, Error)]
pub enum AgentError {
    #[error("agent unavailable: {0}")]
    Unavailable(String),

    #[error("agent run failed: {0}")]
    RunFailed(String),
}

/// Ordered stream of events from one run.
pub type RunEventStream = Pin<Box<dyn Stream<Item = Result<RunEvent, AgentError>> + Send>>;

/// Input for one run.
#[derive(Debug, Clone)]
pub struct RunRequest {
    pub session: Session,

    /// Recent messages, oldest first. The last one is the message that
    /// triggered the run.
    pub history: Vec<Message>,
}

#[async_trait]
pub trait AgentRunner: Send + Sync {
    async fn start(&self, request: RunRequest) -> Result<RunEventStream, AgentError>;

    /// Runner name for logging.
    fn name(&self) -> &'static str;
}
