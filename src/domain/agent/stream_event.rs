//! Client-facing agent stream events.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::run_event::{RunEvent, ToolInvocation};
use crate::domain::foundation::SessionId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HandoffAction {
    Requested,
    Completed,
}

/// Sub-events carried in `agent_response` frames.
///
/// Serialized with a `type` discriminator; [`AgentStreamEvent::to_payload`]
/// adds an identical `kind` field for clients that read that one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AgentStreamEvent {
    Token {
        delta: String,
    },
    AgentSwitch {
        agent: String,
    },
    MessageOutput {
        role: String,
        text: String,
    },
    ToolCall {
        call_id: String,
        #[serde(flatten)]
        tool: ToolInvocation,
    },
    ToolOutput {
        call_id: String,
        output: Value,
    },
    Handoff {
        action: HandoffAction,
        from: Option<String>,
        to: Option<String>,
    },
    /// Terminal marker, exactly one per run.
    Done {
        session_id: SessionId,
    },
}

impl AgentStreamEvent {
    /// Translates a run event. Returns `None` for events clients never see.
    pub fn from_run_event(event: &RunEvent) -> Option<Self> {
        let translated = match event {
            RunEvent::TextDelta(delta) => AgentStreamEvent::Token {
                delta: delta.clone(),
            },
            RunEvent::AgentUpdated { name } => AgentStreamEvent::AgentSwitch {
                agent: name.clone(),
            },
            RunEvent::MessageOutput { role, text } => AgentStreamEvent::MessageOutput {
                role: role.clone(),
                text: text.clone(),
            },
            RunEvent::ToolCalled { call_id, tool } => AgentStreamEvent::ToolCall {
                call_id: call_id.clone(),
                tool: tool.clone(),
            },
            RunEvent::ToolOutput { call_id, output } => AgentStreamEvent::ToolOutput {
                call_id: call_id.clone(),
                output: output.clone(),
            },
            RunEvent::HandoffRequested { from, to } => AgentStreamEvent::Handoff {
                action: HandoffAction::Requested,
                from: from.clone(),
                to: to.clone(),
            },
            RunEvent::HandoffOccurred { from, to } => AgentStreamEvent::Handoff {
                action: HandoffAction::Completed,
                from: from.clone(),
                to: to.clone(),
            },
            RunEvent::Other { .. } => return None,
        };
        Some(translated)
    }

    pub fn done(session_id: SessionId) -> Self {
        AgentStreamEvent::Done { session_id }
    }

    /// The discriminator value shared by `type` and `kind`.
    pub fn kind(&self) -> &'static str {
        match self {
            AgentStreamEvent::Token { .. } => "token",
            AgentStreamEvent::AgentSwitch { .. } => "agent_switch",
            AgentStreamEvent::MessageOutput { .. } => "message_output",
            AgentStreamEvent::ToolCall { .. } => "tool_call",
            AgentStreamEvent::ToolOutput { .. } => "tool_output",
            AgentStreamEvent::Handoff { .. } => "handoff",
            AgentStreamEvent::Done { .. } => "done",
        }
    }

    pub fn is_done(&self) -> bool {
        matches!(self, AgentStreamEvent::Done { .. })
    }

    /// Builds the `data` object of the `agent_response` frame.
    pub fn to_payload(&self) -> Result<Value, serde_json::Error> {
        let mut value = serde_json::to_value(self)?;
        if let Value::Object(map) = &mut value {
            map.insert("kind".to_string(), Value::String(self.kind().to_string()));
        }
        Ok(value)
    }
}
