//! Job queue adapters.

mod in_memory;
mod redis;

pub use self::redis::RedisJobQueue;
pub use in_memory::InMemoryJobQueue;
