//! Agent run events.
//!
//! `RunEvent` is what an agent runner yields while it works. The worker
//! translates each one into at most one client-facing `AgentStreamEvent`,
//! which travels to the browser as the `data` of an `agent_response` frame.

mod run_event;
mod stream_event;

pub use run_event::{RunEvent, ToolInvocation};
pub use stream_event::{AgentStreamEvent, HandoffAction};
