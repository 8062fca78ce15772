//! Worker loop: claims jobs from the queue and runs the matching function.
//!
//! ## Configuration
//!
//! | Setting | Default | Description |
//! |---------|---------|-------------|
//! | `max_jobs` | 10 | Jobs running at once |
//! | `poll_timeout` | 5s | How long one claim blocks waiting for a job |
//!
//! ## Delivery
//!
//! A job is acknowledged once its function returns, whether it succeeded or
//! not: a failed run has already told its client, and replaying it would
//! stream a second reply. Jobs claimed by a worker that died mid-run are
//! requeued by `recover` when a worker with the same consumer name starts.
//!
//! ## Graceful Shutdown
//!
//! On shutdown the worker stops claiming and waits for running jobs.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::{watch, Semaphore};

use crate::domain::foundation::DomainError;
use crate::ports::{AgentError, ClaimedJob, Job, JobConsumer};
use crate::shutdown;

const CLAIM_ERROR_BACKOFF: Duration = Duration::from_secs(1);

#[derive(Debug, Error)]
pub enum JobError {
    #[error("invalid job arguments: {0}")]
    InvalidArguments(String),

    #[error("session not found: {0}")]
    SessionNotFound(String),

    #[error(transparent)]
    Agent(#[from] AgentError),

    #[error(transparent)]
    Storage(#[from] DomainError),
}

/// A named function the worker can run.
#[async_trait]
pub trait JobFunction: Send + Sync {
    fn name(&self) -> &str;

    async fn run(&self, job: &Job) -> Result<(), JobError>;
}

#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub queue: String,
    pub max_jobs: usize,
    pub poll_timeout: Duration,
}

impl WorkerConfig {
    pub fn new(queue: impl Into<String>) -> Self {
        Self {
            queue: queue.into(),
            max_jobs: 10,
            poll_timeout: Duration::from_secs(5),
        }
    }

    pub fn with_max_jobs(mut self, max_jobs: usize) -> Self {
        self.max_jobs = max_jobs.max(1);
        self
    }

    pub fn with_poll_timeout(mut self, timeout: Duration) -> Self {
        self.poll_timeout = timeout;
        self
    }
}

/// Counters reported when the worker stops.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkerStats {
    pub completed: u64,
    pub failed: u64,
    pub unknown: u64,
}

#[derive(Default)]
struct Counters {
    completed: AtomicU64,
    failed: AtomicU64,
    unknown: AtomicU64,
}

impl Counters {
    fn snapshot(&self) -> WorkerStats {
        WorkerStats {
            completed: self.completed.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            unknown: self.unknown.load(Ordering::Relaxed),
        }
    }
}

pub struct Worker {
    consumer: Arc<dyn JobConsumer>,
    functions: HashMap<String, Arc<dyn JobFunction>>,
    config: WorkerConfig,
    counters: Arc<Counters>,
}

impl Worker {
    pub fn new(consumer: Arc<dyn JobConsumer>, config: WorkerConfig) -> Self {
        Self {
            consumer,
            functions: HashMap::new(),
            config,
            counters: Arc::new(Counters::default()),
        }
    }

    pub fn with_function(mut self, function: impl JobFunction + 'static) -> Self {
        self.register(function);
        self
    }

    pub fn register(&mut self, function: impl JobFunction + 'static) {
        self.functions
            .insert(function.name().to_string(), Arc::new(function));
    }

    pub fn stats(&self) -> WorkerStats {
        self.counters.snapshot()
    }

    /// Runs until shutdown is requested, then waits for in-flight jobs.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> WorkerStats {
        let queue = self.config.queue.as_str();

        match self.consumer.recover(queue).await {
            Ok(0) => {}
            Ok(n) => tracing::warn!(queue, requeued = n, "Requeued jobs left by a previous run"),
            Err(e) => tracing::error!(queue, error = %e, "Failed to recover in-flight jobs"),
        }

        tracing::info!(
            queue,
            max_jobs = self.config.max_jobs,
            functions = ?self.functions.keys().collect::<Vec<_>>(),
            "Worker started"
        );

        let slots = Arc::new(Semaphore::new(self.config.max_jobs));

        loop {
            let permit = tokio::select! {
                _ = shutdown::requested(&mut shutdown) => break,
                permit = slots.clone().acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
            };

            let claimed = tokio::select! {
                _ = shutdown::requested(&mut shutdown) => break,
                claimed = self.consumer.next_job(queue, self.config.poll_timeout) => claimed,
            };

            match claimed {
                Ok(Some(claimed)) => {
                    let consumer = self.consumer.clone();
                    let function = self.functions.get(&claimed.job.function).cloned();
                    let counters = self.counters.clone();
                    let queue = queue.to_string();
                    tokio::spawn(async move {
                        execute(consumer, function, counters, &queue, claimed).await;
                        drop(permit);
                    });
                }
                Ok(None) => {}
                Err(e) => {
                    tracing::error!(queue, error = %e, "Failed to claim job");
                    tokio::select! {
                        _ = shutdown::requested(&mut shutdown) => break,
                        _ = tokio::time::sleep(CLAIM_ERROR_BACKOFF) => {}
                    }
                }
            }
        }

        let in_flight = self.config.max_jobs - slots.available_permits();
        tracing::info!(queue, in_flight, "Worker stopping");
        // Every running job holds one permit until it has been acknowledged.
        if let Ok(all) = slots.acquire_many(self.config.max_jobs as u32).await {
            drop(all);
        }

        let stats = self.stats();
        tracing::info!(
            queue,
            completed = stats.completed,
            failed = stats.failed,
            unknown = stats.unknown,
            "Worker stopped"
        );
        stats
    }
}

async fn execute(
    consumer: Arc<dyn JobConsumer>,
    function: Option<Arc<dyn JobFunction>>,
    counters: Arc<Counters>,
    queue: &str,
    claimed: ClaimedJob,
) {
    let job = &claimed.job;

    match function {
        None => {
            tracing::error!(job_id = %job.id, function = %job.function, "No function registered for job");
            counters.unknown.fetch_add(1, Ordering::Relaxed);
        }
        Some(function) => {
            tracing::debug!(job_id = %job.id, function = %job.function, "Running job");
            match function.run(job).await {
                Ok(()) => {
                    counters.completed.fetch_add(1, Ordering::Relaxed);
                    tracing::info!(job_id = %job.id, function = %job.function, "Job completed");
                }
                Err(e) => {
                    counters.failed.fetch_add(1, Ordering::Relaxed);
                    tracing::warn!(job_id = %job.id, function = %job.function, error = %e, "Job failed");
                }
            }
        }
    }

    if let Err(e) = consumer.ack(queue, &claimed).await {
        tracing::error!(job_id = %job.id, queue, error = %e, "Failed to acknowledge job");
    }
}
