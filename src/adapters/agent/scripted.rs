//! Scripted agent runner for testing.
//!
//! Replays a fixed sequence of events (or errors) for every run and records
//! the requests it received.

use async_trait::async_trait;
use futures::stream;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use crate::domain::agent::RunEvent;
use crate::ports::{AgentError, AgentRunner, RunEventStream, RunRequest};

#[derive(Debug, Clone, Default)]
pub struct ScriptedAgentRunner {
    script: Vec<Result<RunEvent, AgentError>>,
    start_error: Option<AgentError>,
    /// Pause before the stream is returned, to keep a run in flight.
    start_delay: Duration,
    requests: Arc<Mutex<Vec<RunRequest>>>,
}

impl ScriptedAgentRunner {
    pub fn new(events: Vec<RunEvent>) -> Self {
        Self {
            script: events.into_iter().map(Ok).collect(),
            ..Self::default()
        }
    }

    /// Appends a mid-stream failure after the scripted events.
    pub fn then_fail(mut self, error: AgentError) -> Self {
        self.script.push(Err(error));
        self
    }

    /// Makes `start` itself fail.
    pub fn failing(error: AgentError) -> Self {
        Self {
            start_error: Some(error),
            ..Self::default()
        }
    }

    pub fn with_start_delay(mut self, delay: Duration) -> Self {
        self.start_delay = delay;
        self
    }

    /// Requests received so far.
    pub fn requests(&self) -> Vec<RunRequest> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl AgentRunner for ScriptedAgentRunner {
    async fn start(&self, request: RunRequest) -> Result<RunEventStream, AgentError> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(request);
        if !self.start_delay.is_zero() {
            tokio::time::sleep(self.start_delay).await;
        }
        if let Some(error) = &self.start_error {
            return Err(error.clone());
        }
        Ok(Box::pin(stream::iter(self.script.clone())))
    }

    fn name(&self) -> &'static str {
        "scripted"
    }
}
