//! WebSocket gateway adapters.
//!
//! # Architecture
//!
//! ```text
//!   client socket ──▶ handler (auth, upgrade) ──▶ IngressSession ──▶ HandlerRegistry
//!         ▲                                            │ register / unregister
//!         │                                            ▼
//!    writer task ◀── ClientConnection ◀──────── ConnectionRegistry
//!                                                      ▲
//!                      bus channel ──▶ RelayListener ──┘
//!                                      RunWatchdog ────┘
//! ```
//!
//! # Components
//!
//! - [`connection`] - One live client and its bounded send queue
//! - [`registry`] - Process-local connection table
//! - [`messages`] - Inbound parsing and server frames
//! - [`ingress`] - Per-connection read loop
//! - [`relay`] - Bus to registry bridge
//! - [`watchdog`] - Idle run timeout
//! - [`handler`] - Axum routes

pub mod connection;
pub mod handler;
pub mod ingress;
pub mod messages;
pub mod registry;
pub mod relay;
pub mod watchdog;

pub use connection::{ClientConnection, SendError};
pub use handler::{gateway_router, ws_handler, GatewayState};
pub use ingress::{CloseReason, Inbound, IngressSession};
pub use messages::{connection_established, parse_inbound, InboundEvent, ProtocolError};
pub use registry::ConnectionRegistry;
pub use relay::{RelayListener, RelayOutcome, RelayStats};
pub use watchdog::{sweep_idle_runs, RunWatchdog, RUN_TIMED_OUT};
