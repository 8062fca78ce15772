//! Domain layer containing the relay's pure types.
//!
//! # Module Organization
//!
//! - `foundation` - Shared primitives (IDs, timestamps, auth, errors)
//! - `relay` - Bus envelopes and client frames
//! - `agent` - Agent run events and their client-facing translation
//! - `chat` - Sessions and messages owned by the document store

pub mod agent;
pub mod chat;
pub mod foundation;
pub mod relay;
