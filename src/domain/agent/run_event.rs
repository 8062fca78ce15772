//! Internal events produced by an agent run.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// What a tool call is doing. The shape differs per tool kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "tool_type", rename_all = "snake_case")]
pub enum ToolInvocation {
    Function { name: String, arguments: Value },
    ComputerUse { action: Value, status: String },
    FileSearch { queries: Vec<String>, status: String },
    WebSearch { status: String },
}

/// One step of an agent run, in the order the runner produced it.
#[derive(Debug, Clone, PartialEq)]
pub enum RunEvent {
    /// Incremental output text.
    TextDelta(String),

    /// Control passed to a different named agent.
    AgentUpdated { name: String },

    /// A complete output message was created.
    MessageOutput { role: String, text: String },

    ToolCalled { call_id: String, tool: ToolInvocation },

    ToolOutput { call_id: String, output: Value },

    HandoffRequested { from: Option<String>, to: Option<String> },

    HandoffOccurred { from: Option<String>, to: Option<String> },

    /// Anything the client has no use for (reasoning, MCP listings).
    Other { name: String },
}

impl RunEvent {
    /// Short label used in log fields.
    pub fn label(&self) -> &str {
        match self {
            RunEvent::TextDelta(_) => "text_delta",
            RunEvent::AgentUpdated { .. } => "agent_updated",
            RunEvent::MessageOutput { .. } => "message_output_created",
            RunEvent::ToolCalled { .. } => "tool_called",
            RunEvent::ToolOutput { .. } => "tool_output",
            RunEvent::HandoffRequested { .. } => "handoff_requested",
            RunEvent::HandoffOccurred { .. } => "handoff_occurred",
            RunEvent::Other { name } => name,
        }
    }
}
