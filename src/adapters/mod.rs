//! Adapters - Implementations of port interfaces.
//!
//! Adapters connect the application to external systems:
//! - `agent` - Agent runners (echo stand-in, scripted for tests)
//! - `auth` - Access token verification (JWT, mock)
//! - `events` - Pub/sub bus (Redis, in-memory) and the outbound publisher
//! - `queue` - Job queue (Redis lists, in-memory)
//! - `storage` - Session and message store (Redis, in-memory)
//! - `websocket` - Client gateway: ingress, registry, relay listener

pub mod agent;
pub mod auth;
pub mod events;
pub mod queue;
pub mod storage;
pub mod websocket;

pub use events::{InMemoryEventBus, OutboundPublisher, RedisEventBus};
pub use queue::{InMemoryJobQueue, RedisJobQueue};
pub use storage::{InMemoryDocumentStore, RedisDocumentStore};
