//! Worker configuration

use serde::Deserialize;
use std::time::Duration;

use super::error::ValidationError;

#[derive(Debug, Clone, Deserialize)]
pub struct WorkerConfig {
    /// Queue the worker consumes
    #[serde(default = "default_queue")]
    pub queue: String,

    /// Names this worker's processing list; restarting with the same name
    /// requeues jobs a crashed predecessor left behind. Must differ between
    /// live workers; the default is unique per process
    #[serde(default = "default_consumer_name")]
    pub consumer_name: String,

    /// Jobs running at once
    #[serde(default = "default_max_jobs")]
    pub max_jobs: usize,

    /// How long one claim blocks waiting for a job
    #[serde(default = "default_poll_timeout")]
    pub poll_timeout_secs: u64,

    /// Messages of history passed to the agent
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,
}

impl WorkerConfig {
    pub fn poll_timeout(&self) -> Duration {
        Duration::from_secs(self.poll_timeout_secs)
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.queue.trim().is_empty() {
            return Err(ValidationError::MissingRequired("WORKER__QUEUE"));
        }
        if self.consumer_name.trim().is_empty() {
            return Err(ValidationError::MissingRequired("WORKER__CONSUMER_NAME"));
        }
        if self.max_jobs == 0 {
            return Err(ValidationError::MustBePositive("worker.max_jobs"));
        }
        if self.poll_timeout_secs == 0 {
            return Err(ValidationError::MustBePositive("worker.poll_timeout_secs"));
        }
        if self.history_limit == 0 {
            return Err(ValidationError::MustBePositive("worker.history_limit"));
        }
        Ok(())
    }
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            queue: default_queue(),
            consumer_name: default_consumer_name(),
            max_jobs: default_max_jobs(),
            poll_timeout_secs: default_poll_timeout(),
            history_limit: default_history_limit(),
        }
    }
}

fn default_queue() -> String {
    "agents".to_string()
}

fn default_consumer_name() -> String {
    let host = std::env::var("HOSTNAME")
        .ok()
        .filter(|h| !h.trim().is_empty())
        .unwrap_or_else(|| uuid::Uuid::new_v4().simple().to_string()[..8].to_string());
    format!("worker-{}-{}", host, std::process::id())
}

fn default_max_jobs() -> usize {
    10
}

fn default_poll_timeout() -> u64 {
    5
}

fn default_history_limit() -> usize {
    100
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_worker_config_defaults() {
        let config = WorkerConfig::default();
        assert_eq!(config.queue, "agents");
        assert!(config.consumer_name.starts_with("worker-"));
        assert_eq!(config.max_jobs, 10);
        assert_eq!(config.poll_timeout(), Duration::from_secs(5));
        assert_eq!(config.history_limit, 100);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_default_consumer_name_is_per_process() {
        let name = default_consumer_name();
        assert!(name.ends_with(&format!("-{}", std::process::id())));
        assert_ne!(name, "worker");
    }

    #[test]
    fn test_validation_rejects_zero_concurrency() {
        let config = WorkerConfig {
            max_jobs: 0,
            ..Default::default()
        };
        assert_eq!(
            config.validate(),
            Err(ValidationError::MustBePositive("worker.max_jobs"))
        );
    }
}
