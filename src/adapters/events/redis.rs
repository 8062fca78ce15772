//! Redis pub/sub adapter for the event bus ports.
//!
//! Publishing goes through one shared `MultiplexedConnection`. Every
//! subscription opens its own dedicated connection, since a Redis connection
//! in subscribe mode cannot issue other commands.

use async_trait::async_trait;
use futures::StreamExt;
use redis::aio::MultiplexedConnection;
use redis::AsyncCommands;

use crate::ports::{BusError, EventPublisher, EventSubscriber, MessageStream};

/// Event bus backed by Redis PUBLISH / SUBSCRIBE.
#[derive(Clone)]
pub struct RedisEventBus {
    client: redis::Client,
    conn: MultiplexedConnection,
}

impl RedisEventBus {
    /// Opens the publishing connection.
    pub async fn connect(url: &str) -> Result<Self, BusError> {
        let client =
            redis::Client::open(url).map_err(|e| BusError::Connection(e.to_string()))?;
        let conn = client
            .get_multiplexed_tokio_connection()
            .await
            .map_err(|e| BusError::Connection(e.to_string()))?;
        Ok(Self { client, conn })
    }
}

#[async_trait]
impl EventPublisher for RedisEventBus {
    async fn publish(&self, channel: &str, payload: String) -> Result<(), BusError> {
        let mut conn = self.conn.clone();
        let receivers: i64 = conn
            .publish(channel, payload)
            .await
            .map_err(|e: redis::RedisError| BusError::publish(channel, e))?;
        tracing::trace!(channel, receivers, "Published to Redis");
        Ok(())
    }
}

#[async_trait]
impl EventSubscriber for RedisEventBus {
    async fn subscribe(&self, channel: &str) -> Result<MessageStream, BusError> {
        let conn = self
            .client
            .get_async_connection()
            .await
            .map_err(|e| BusError::subscribe(channel, e))?;
        let mut pubsub = conn.into_pubsub();
        pubsub
            .subscribe(channel)
            .await
            .map_err(|e| BusError::subscribe(channel, e))?;

        let channel = channel.to_string();
        let stream = pubsub.into_on_message().map(move |msg| {
            msg.get_payload::<String>()
                .map_err(|e| BusError::subscribe(channel.as_str(), e))
        });
        Ok(Box::pin(stream))
    }
}
