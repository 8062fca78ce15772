//! Agent runner adapters.
//!
//! - `EchoAgentRunner` - stand-in runner that streams back the user's text
//! - `ScriptedAgentRunner` - replays a fixed event script (testing)

mod echo;
mod scripted;

pub use echo::EchoAgentRunner;
pub use scripted::ScriptedAgentRunner;
