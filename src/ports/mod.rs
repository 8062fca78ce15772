//! Ports - Interfaces for external dependencies.
//!
//! Following hexagonal architecture, ports define the contracts between
//! the relay and the outside world. Adapters implement these ports.
//!
//! ## Messaging Ports
//!
//! - `EventPublisher` / `EventSubscriber` - Shared pub/sub bus
//! - `RelayPublisher` - Ordered, non-failing envelope publishing
//! - `JobQueue` / `JobConsumer` - Distributed task queue
//!
//! ## Collaborator Ports
//!
//! - `TokenVerifier` - Access token verification
//! - `SessionRepository` / `MessageRepository` - Document store
//! - `AgentRunner` - The long-running agent computation

mod agent_runner;
mod event_publisher;
mod event_subscriber;
mod job_queue;
mod message_repository;
mod relay_publisher;
mod session_repository;
mod token_verifier;

pub use agent_runner::{AgentError, AgentRunner, RunEventStream, RunRequest};
pub use event_publisher::{BusError, EventPublisher};
pub use event_subscriber::{EventBus, EventSubscriber, MessageStream};
pub use job_queue::{ClaimedJob, Job, JobConsumer, JobQueue, QueueError};
pub use message_repository::MessageRepository;
pub use relay_publisher::RelayPublisher;
pub use session_repository::SessionRepository;
pub use token_verifier::TokenVerifier;
