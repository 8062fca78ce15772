//! Agent Relay - cross-process delivery of agent run events to WebSocket
//! clients.
//!
//! Gateways accept client sockets and relay envelopes from a shared pub/sub
//! channel to the connections they own. Workers run agent jobs taken from a
//! task queue and publish each run's events on that channel, addressed by
//! connection id.

pub mod adapters;
pub mod application;
pub mod config;
pub mod domain;
pub mod ports;
pub mod shutdown;
pub mod telemetry;
