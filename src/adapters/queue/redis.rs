//! Redis list-backed job queue.
//!
//! Keys, for queue `agents` and prefix `agent_relay`:
//!
//! - `agent_relay:queue:agents` - waiting jobs (LPUSH in, pop from the tail)
//! - `agent_relay:queue:agents:processing:<consumer>` - jobs this consumer
//!   claimed and has not acknowledged yet
//!
//! Claiming is an atomic BRPOPLPUSH, so a job is never lost between the two
//! lists. A worker that dies mid-job leaves it on its processing list, and
//! `recover` puts it back on the queue at the next start, behind the jobs
//! already waiting. Only this consumer's list is touched, so every running
//! worker needs its own consumer name.

use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::AsyncCommands;
use std::time::Duration;

use crate::ports::{ClaimedJob, Job, JobConsumer, JobQueue, QueueError};

#[derive(Clone)]
pub struct RedisJobQueue {
    conn: MultiplexedConnection,
    /// Used only for BRPOPLPUSH so blocking waits never stall other commands.
    blocking: MultiplexedConnection,
    key_prefix: String,
    consumer: String,
}

impl RedisJobQueue {
    pub async fn connect(
        url: &str,
        key_prefix: impl Into<String>,
        consumer: impl Into<String>,
    ) -> Result<Self, QueueError> {
        let client =
            redis::Client::open(url).map_err(|e| QueueError::Connection(e.to_string()))?;
        let conn = client
            .get_multiplexed_tokio_connection()
            .await
            .map_err(|e| QueueError::Connection(e.to_string()))?;
        let blocking = client
            .get_multiplexed_tokio_connection()
            .await
            .map_err(|e| QueueError::Connection(e.to_string()))?;
        Ok(Self {
            conn,
            blocking,
            key_prefix: key_prefix.into(),
            consumer: consumer.into(),
        })
    }

    fn queue_key(&self, queue: &str) -> String {
        queue_key(&self.key_prefix, queue)
    }

    fn processing_key(&self, queue: &str) -> String {
        processing_key(&self.key_prefix, queue, &self.consumer)
    }
}

fn queue_key(prefix: &str, queue: &str) -> String {
    format!("{prefix}:queue:{queue}")
}

fn processing_key(prefix: &str, queue: &str, consumer: &str) -> String {
    format!("{prefix}:queue:{queue}:processing:{consumer}")
}

fn command_error(e: redis::RedisError) -> QueueError {
    QueueError::Command(e.to_string())
}

#[async_trait]
impl JobQueue for RedisJobQueue {
    async fn enqueue(&self, queue: &str, job: Job) -> Result<(), QueueError> {
        let payload = serde_json::to_string(&job)?;
        let mut conn = self.conn.clone();
        conn.lpush::<_, _, ()>(self.queue_key(queue), payload)
            .await
            .map_err(command_error)?;
        Ok(())
    }
}

#[async_trait]
impl JobConsumer for RedisJobQueue {
    async fn next_job(&self, queue: &str, timeout: Duration) -> Result<Option<ClaimedJob>, QueueError> {
        let processing = self.processing_key(queue);
        let mut blocking = self.blocking.clone();
        let payload: Option<String> = redis::cmd("BRPOPLPUSH")
            .arg(self.queue_key(queue))
            .arg(&processing)
            .arg(timeout.as_secs().max(1))
            .query_async(&mut blocking)
            .await
            .map_err(command_error)?;

        let Some(payload) = payload else {
            return Ok(None);
        };

        match serde_json::from_str::<Job>(&payload) {
            Ok(job) => Ok(Some(ClaimedJob { job, receipt: payload })),
            Err(e) => {
                let mut conn = self.conn.clone();
                conn.lrem::<_, _, ()>(&processing, 1, &payload)
                    .await
                    .map_err(command_error)?;
                Err(QueueError::Serialization(e.to_string()))
            }
        }
    }

    async fn ack(&self, queue: &str, claimed: &ClaimedJob) -> Result<(), QueueError> {
        let mut conn = self.conn.clone();
        conn.lrem::<_, _, ()>(self.processing_key(queue), 1, &claimed.receipt)
            .await
            .map_err(command_error)?;
        Ok(())
    }

    async fn recover(&self, queue: &str) -> Result<usize, QueueError> {
        let processing = self.processing_key(queue);
        let target = self.queue_key(queue);
        let mut conn = self.conn.clone();
        let mut moved = 0;
        loop {
            let job: Option<String> = conn
                .rpoplpush(&processing, &target)
                .await
                .map_err(command_error)?;
            if job.is_none() {
                break;
            }
            moved += 1;
        }
        Ok(moved)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_follow_the_documented_layout() {
        assert_eq!(queue_key("agent_relay", "agents"), "agent_relay:queue:agents");
        assert_eq!(
            processing_key("agent_relay", "agents", "worker-a"),
            "agent_relay:queue:agents:processing:worker-a"
        );
    }

    #[test]
    fn consumers_get_separate_processing_lists() {
        let a = processing_key("agent_relay", "agents", "worker-a");
        let b = processing_key("agent_relay", "agents", "worker-b");
        assert_ne!(a, b);
        assert_ne!(a, queue_key("agent_relay", "agents"));
    }
}
