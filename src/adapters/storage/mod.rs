//! Document store adapters.
//!
//! - **RedisDocumentStore** - Sessions and messages in Redis
//! - **InMemoryDocumentStore** - Same contract in memory (testing/development)

mod in_memory;
mod redis;

pub use self::redis::RedisDocumentStore;
pub use in_memory::InMemoryDocumentStore;
