//! Chat domain module.
//!
//! Sessions and the messages exchanged in them. These records are owned by
//! the document store; the relay only reads a session, appends messages and
//! hands history to the agent runner.

mod message;
mod session;

pub use message::{Message, SenderType, MAX_CONTENT_LENGTH};
pub use session::{Session, MAX_TITLE_LENGTH};
