//! In-memory job queue for tests and single-process runs.
//!
//! Handles made with [`InMemoryJobQueue::for_consumer`] share the waiting
//! queues but keep their own in-flight lists, the same way each Redis
//! consumer has its own processing list.

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::Notify;

use crate::ports::{ClaimedJob, Job, JobConsumer, JobQueue, QueueError};

const DEFAULT_CONSUMER: &str = "default";

#[derive(Default)]
struct Queues {
    waiting: HashMap<String, VecDeque<Job>>,
    /// Keyed by (queue, consumer).
    in_flight: HashMap<(String, String), Vec<Job>>,
}

/// FIFO queue per name, with claimed jobs held until acknowledged.
pub struct InMemoryJobQueue {
    queues: Arc<Mutex<Queues>>,
    notify: Arc<Notify>,
    consumer: String,
}

impl Default for InMemoryJobQueue {
    fn default() -> Self {
        Self {
            queues: Arc::default(),
            notify: Arc::default(),
            consumer: DEFAULT_CONSUMER.to_string(),
        }
    }
}

impl InMemoryJobQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// A handle on the same queues that claims as `consumer`.
    pub fn for_consumer(&self, consumer: impl Into<String>) -> Self {
        Self {
            queues: self.queues.clone(),
            notify: self.notify.clone(),
            consumer: consumer.into(),
        }
    }

    fn in_flight_key(&self, queue: &str) -> (String, String) {
        (queue.to_string(), self.consumer.clone())
    }

    fn claim(&self, queue: &str) -> Option<ClaimedJob> {
        let mut queues = self.queues.lock().unwrap_or_else(PoisonError::into_inner);
        let job = queues.waiting.get_mut(queue)?.pop_front()?;
        queues
            .in_flight
            .entry(self.in_flight_key(queue))
            .or_default()
            .push(job.clone());
        Some(ClaimedJob {
            receipt: job.id.to_string(),
            job,
        })
    }

    // === Test Helpers ===

    /// Jobs waiting on a queue, oldest first.
    pub fn pending(&self, queue: &str) -> Vec<Job> {
        self.queues
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .waiting
            .get(queue)
            .map(|q| q.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Jobs this consumer claimed but has not acknowledged.
    pub fn in_flight(&self, queue: &str) -> Vec<Job> {
        self.queues
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .in_flight
            .get(&self.in_flight_key(queue))
            .cloned()
            .unwrap_or_default()
    }
}

#[async_trait]
impl JobQueue for InMemoryJobQueue {
    async fn enqueue(&self, queue: &str, job: Job) -> Result<(), QueueError> {
        self.queues
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .waiting
            .entry(queue.to_string())
            .or_default()
            .push_back(job);
        self.notify.notify_waiters();
        Ok(())
    }
}

#[async_trait]
impl JobConsumer for InMemoryJobQueue {
    async fn next_job(&self, queue: &str, timeout: Duration) -> Result<Option<ClaimedJob>, QueueError> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Some(claimed) = self.claim(queue) {
                return Ok(Some(claimed));
            }
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return Ok(None);
            }
        }
    }

    async fn ack(&self, queue: &str, claimed: &ClaimedJob) -> Result<(), QueueError> {
        let mut queues = self.queues.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(jobs) = queues.in_flight.get_mut(&self.in_flight_key(queue)) {
            jobs.retain(|job| job.id != claimed.job.id);
        }
        Ok(())
    }

    async fn recover(&self, queue: &str) -> Result<usize, QueueError> {
        let mut queues = self.queues.lock().unwrap_or_else(PoisonError::into_inner);
        let orphaned = queues
            .in_flight
            .remove(&self.in_flight_key(queue))
            .unwrap_or_default();
        let count = orphaned.len();
        let waiting = queues.waiting.entry(queue.to_string()).or_default();
        waiting.extend(orphaned);
        drop(queues);
        if count > 0 {
            self.notify.notify_waiters();
        }
        Ok(count)
    }
}
