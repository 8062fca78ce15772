//! Work dispatcher: hands runs to the worker pool through the job queue.

use std::sync::Arc;

use serde_json::Value;

use crate::domain::foundation::{ConnectionId, JobId, SessionId};
use crate::ports::{Job, JobQueue, QueueError};

/// Job function that runs the agent for one session.
pub const PROCESS_SESSION: &str = "process_session";

/// Enqueues jobs on the shared task queue.
///
/// Delivery is whatever the queue provides: at-least-once, unordered across
/// jobs. The connection id travels as the first argument of run jobs so the
/// worker can address its events back to the socket that asked.
#[derive(Clone)]
pub struct WorkDispatcher {
    queue: Arc<dyn JobQueue>,
    queue_name: String,
}

impl WorkDispatcher {
    pub fn new(queue: Arc<dyn JobQueue>, queue_name: impl Into<String>) -> Self {
        Self {
            queue,
            queue_name: queue_name.into(),
        }
    }

    pub fn queue_name(&self) -> &str {
        &self.queue_name
    }

    pub async fn enqueue(
        &self,
        queue: &str,
        function: &str,
        args: Vec<Value>,
    ) -> Result<JobId, QueueError> {
        let job = Job::new(function, args);
        let id = job.id;
        self.queue.enqueue(queue, job).await?;

        tracing::debug!(job_id = %id, queue, function, "Job enqueued");
        Ok(id)
    }

    /// Enqueues `process_session(connection_id, session_id)` on the default queue.
    pub async fn dispatch_run(
        &self,
        connection_id: &ConnectionId,
        session_id: &SessionId,
    ) -> Result<JobId, QueueError> {
        let args = vec![
            Value::String(connection_id.to_string()),
            Value::String(session_id.to_string()),
        ];
        let id = self.enqueue(&self.queue_name, PROCESS_SESSION, args).await?;

        tracing::info!(
            job_id = %id,
            connection_id = %connection_id,
            session_id = %session_id,
            "Run dispatched"
        );
        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::queue::InMemoryJobQueue;

    #[tokio::test]
    async fn dispatch_run_passes_connection_id_first() {
        let queue = Arc::new(InMemoryJobQueue::new());
        let dispatcher = WorkDispatcher::new(queue.clone(), "agents");

        let conn = ConnectionId::parse("conn-1").unwrap();
        let session = SessionId::new("s-1").unwrap();
        let id = dispatcher.dispatch_run(&conn, &session).await.unwrap();

        let pending = queue.pending("agents");
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, id);
        assert_eq!(pending[0].function, PROCESS_SESSION);
        assert_eq!(pending[0].str_arg(0), Some("conn-1"));
        assert_eq!(pending[0].str_arg(1), Some("s-1"));
    }

    #[tokio::test]
    async fn enqueue_targets_the_named_queue() {
        let queue = Arc::new(InMemoryJobQueue::new());
        let dispatcher = WorkDispatcher::new(queue.clone(), "agents");

        dispatcher
            .enqueue("maintenance", "reindex", vec![Value::from(3)])
            .await
            .unwrap();

        assert!(queue.pending("agents").is_empty());
        assert_eq!(queue.pending("maintenance")[0].function, "reindex");
    }
}
