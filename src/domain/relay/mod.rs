//! Relay protocol types.
//!
//! `Envelope` is what travels on the shared bus channel; `Frame` is what a
//! client receives on its socket. Both carry the same `{event, data}` pair so
//! a relayed worker event is indistinguishable from a locally produced frame.

mod envelope;
mod frame;

pub use envelope::{Envelope, EnvelopeError, Target};
pub use frame::{events, Frame};
