//! Event bus adapters.
//!
//! - `InMemoryEventBus` - broadcast-channel bus for tests and local runs
//! - `RedisEventBus` - Redis PUBLISH / SUBSCRIBE
//! - `OutboundPublisher` - ordered publishing queue in front of any bus
//! - `ResilientSubscription` - reconnecting subscription with backoff

mod in_memory;
mod outbound;
mod redis;
mod subscription;

pub use self::redis::RedisEventBus;
pub use in_memory::InMemoryEventBus;
pub use outbound::{OutboundConfig, OutboundPublisher, OutboundStats};
pub use subscription::{Backoff, ResilientSubscription};
