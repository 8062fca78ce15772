//! Job queue ports - enqueue on the gateway, consume on the worker.
//!
//! Semantics are those of a distributed task queue: at-least-once
//! execution, no ordering between distinct jobs, opaque JSON arguments.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;

use crate::domain::foundation::{JobId, Timestamp};

/// Errors raised by queue adapters.
#[derive(Debug, Clone, Error)]
pub enum QueueError {
    #[error("queue connection failed: {0}")]
    Connection(String),

    #[error("queue command failed: {0}")]
    Command(String),

    #[error("job payload is not valid: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for QueueError {
    fn from(err: serde_json::Error) -> Self {
        QueueError::Serialization(err.to_string())
    }
}

/// A unit of work: a named function plus positional arguments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub function: String,
    pub args: Vec<Value>,
    pub enqueued_at: Timestamp,
}

impl Job {
    pub fn new(function: impl Into<String>, args: Vec<Value>) -> Self {
        Self {
            id: JobId::new(),
            function: function.into(),
            args,
            enqueued_at: Timestamp::now(),
        }
    }

    /// Positional string argument, if present and a string.
    pub fn str_arg(&self, index: usize) -> Option<&str> {
        self.args.get(index).and_then(Value::as_str)
    }
}

/// A job taken off a queue but not yet acknowledged.
#[derive(Debug, Clone)]
pub struct ClaimedJob {
    pub job: Job,

    /// Adapter-specific handle used to acknowledge the job.
    pub receipt: String,
}

/// Producer side of the queue.
#[async_trait]
pub trait JobQueue: Send + Sync {
    async fn enqueue(&self, queue: &str, job: Job) -> Result<(), QueueError>;
}

/// Consumer side of the queue.
#[async_trait]
pub trait JobConsumer: Send + Sync {
    /// Waits up to `timeout` for the next job. `Ok(None)` on timeout.
    async fn next_job(&self, queue: &str, timeout: Duration) -> Result<Option<ClaimedJob>, QueueError>;

    /// Marks a claimed job as finished so it is not redelivered.
    async fn ack(&self, queue: &str, claimed: &ClaimedJob) -> Result<(), QueueError>;

    /// Puts jobs claimed by a previous run of this consumer back on the queue.
    ///
    /// Returns the number of jobs requeued.
    async fn recover(&self, queue: &str) -> Result<usize, QueueError>;
}
