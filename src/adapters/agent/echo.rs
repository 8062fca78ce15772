//! Echo agent runner.
//!
//! Streams the last user message back as an assistant reply, one word per
//! text delta, wrapped in the same event sequence a real agent produces.
//! Lets the relay be run end to end without an LLM.

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use std::time::Duration;

use crate::domain::agent::RunEvent;
use crate::domain::chat::SenderType;
use crate::ports::{AgentError, AgentRunner, RunEventStream, RunRequest};

const AGENT_NAME: &str = "Echo";

#[derive(Debug, Clone, Default)]
pub struct EchoAgentRunner {
    /// Pause between deltas, to mimic model latency.
    delay: Duration,
}

impl EchoAgentRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Builds the full event script for a prompt.
    fn script(prompt: &str) -> Vec<RunEvent> {
        let reply = format!("You said: {}", prompt.trim());
        let mut events = vec![RunEvent::AgentUpdated {
            name: AGENT_NAME.to_string(),
        }];
        events.extend(split_keeping_spaces(&reply).into_iter().map(RunEvent::TextDelta));
        events.push(RunEvent::MessageOutput {
            role: "assistant".to_string(),
            text: reply,
        });
        events
    }
}

/// Splits text into chunks whose concatenation is the original text.
fn split_keeping_spaces(text: &str) -> Vec<String> {
    text.split_inclusive(' ').map(str::to_string).collect()
}

#[async_trait]
impl AgentRunner for EchoAgentRunner {
    async fn start(&self, request: RunRequest) -> Result<RunEventStream, AgentError> {
        let prompt = request
            .history
            .iter()
            .rev()
            .find(|m| m.sender() == SenderType::User)
            .map(|m| m.content().to_string())
            .ok_or_else(|| AgentError::RunFailed("no user message in history".to_string()))?;

        let delay = self.delay;
        let events = stream::iter(Self::script(&prompt)).then(move |event| async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            Ok(event)
        });
        Ok(Box::pin(events))
    }

    fn name(&self) -> &'static str {
        "echo"
    }
}
