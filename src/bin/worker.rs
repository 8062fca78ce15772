//! Worker binary: consumes `process_session` jobs and publishes run events.

use std::sync::Arc;

use agent_relay::adapters::agent::EchoAgentRunner;
use agent_relay::adapters::events::{OutboundConfig, OutboundPublisher, RedisEventBus};
use agent_relay::adapters::queue::RedisJobQueue;
use agent_relay::adapters::storage::RedisDocumentStore;
use agent_relay::application::{ProcessSessionJob, Worker, WorkerConfig};
use agent_relay::config::AppConfig;
use agent_relay::{shutdown, telemetry};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load_validated()?;
    telemetry::init(&config.server);

    let timeout = config.redis.timeout();
    let bus = Arc::new(tokio::time::timeout(timeout, RedisEventBus::connect(&config.redis.url)).await??);
    let queue = Arc::new(
        tokio::time::timeout(
            timeout,
            RedisJobQueue::connect(
                &config.redis.url,
                config.redis.key_prefix.clone(),
                config.worker.consumer_name.clone(),
            ),
        )
        .await??,
    );
    let store = Arc::new(
        tokio::time::timeout(timeout, RedisDocumentStore::connect(&config.redis.url, config.redis.key_prefix.clone()))
            .await??,
    );

    let (publisher, publisher_task) = OutboundPublisher::spawn(
        bus,
        OutboundConfig::new(config.relay.channel.clone())
            .with_capacity(config.relay.outbound_capacity)
            .with_retries(config.relay.publish_retries),
    );

    let job = ProcessSessionJob::new(
        Arc::new(publisher),
        store.clone(),
        store,
        Arc::new(EchoAgentRunner::new()),
    )
    .with_history_limit(config.worker.history_limit);

    let worker = Worker::new(
        queue,
        WorkerConfig::new(config.worker.queue.clone())
            .with_max_jobs(config.worker.max_jobs)
            .with_poll_timeout(config.worker.poll_timeout()),
    )
    .with_function(job);

    let (shutdown_tx, shutdown_rx) = shutdown::channel();
    tokio::spawn(async move {
        shutdown::os_signal().await;
        let _ = shutdown_tx.send(true);
    });

    tracing::info!(
        queue = %config.worker.queue,
        consumer = %config.worker.consumer_name,
        channel = %config.relay.channel,
        "Worker starting"
    );
    let stats = worker.run(shutdown_rx).await;

    // The worker owned the last publisher handle; the sender loop drains
    // what is queued and exits.
    drop(worker);
    let outbound = publisher_task.await?;
    tracing::info!(
        jobs_completed = stats.completed,
        jobs_failed = stats.failed,
        envelopes_published = outbound.published,
        envelopes_failed = outbound.failed,
        "Worker stopped"
    );
    Ok(())
}
