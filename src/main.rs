//! Gateway binary: WebSocket ingress plus the relay listener.

use std::sync::Arc;

use agent_relay::adapters::auth::JwtTokenVerifier;
use agent_relay::adapters::events::{Backoff, RedisEventBus, ResilientSubscription};
use agent_relay::adapters::queue::RedisJobQueue;
use agent_relay::adapters::storage::RedisDocumentStore;
use agent_relay::adapters::websocket::{gateway_router, ConnectionRegistry, GatewayState, RelayListener, RunWatchdog};
use agent_relay::application::{build_registry, WorkDispatcher};
use agent_relay::config::AppConfig;
use agent_relay::{shutdown, telemetry};
use axum::http::HeaderValue;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

const GATEWAY_CONSUMER: &str = "gateway";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load_validated()?;
    telemetry::init(&config.server);

    let timeout = config.redis.timeout();
    let bus = Arc::new(tokio::time::timeout(timeout, RedisEventBus::connect(&config.redis.url)).await??);
    let queue = Arc::new(
        tokio::time::timeout(
            timeout,
            RedisJobQueue::connect(&config.redis.url, config.redis.key_prefix.clone(), GATEWAY_CONSUMER),
        )
        .await??,
    );
    let store = Arc::new(
        tokio::time::timeout(timeout, RedisDocumentStore::connect(&config.redis.url, config.redis.key_prefix.clone()))
            .await??,
    );
    let verifier = Arc::new(JwtTokenVerifier::from_config(&config.auth)?);

    let registry = Arc::new(ConnectionRegistry::new());
    let dispatcher = WorkDispatcher::new(queue, config.worker.queue.clone());
    let handlers = Arc::new(build_registry(
        store.clone(),
        store,
        dispatcher,
        config.relay.handler_timeout(),
    ));

    let (shutdown_tx, shutdown_rx) = shutdown::channel();

    let subscription = ResilientSubscription::new(
        bus,
        config.relay.channel.clone(),
        Backoff::new(
            config.relay.resubscribe_initial_backoff(),
            config.relay.resubscribe_max_backoff(),
        ),
        shutdown_rx.clone(),
    );
    let mut listener = RelayListener::new(registry.clone(), subscription);
    if !listener.connect().await {
        return Err("shutdown requested before the relay channel was subscribed".into());
    }
    let relay_task = tokio::spawn(listener.run());

    let watchdog_task = config.relay.run_idle_timeout().map(|timeout| {
        tokio::spawn(RunWatchdog::new(registry.clone(), timeout).run(shutdown_rx.clone()))
    });

    let state = GatewayState {
        registry: registry.clone(),
        handlers,
        verifier,
        client_buffer: config.relay.client_buffer,
    };
    let app = gateway_router(state, &config.server.ws_path)
        .layer(cors_layer(&config.server.cors_origins_list()))
        .layer(TraceLayer::new_for_http());

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(
        %addr,
        ws_path = %config.server.ws_path,
        channel = %config.relay.channel,
        environment = ?config.server.environment,
        "Gateway listening"
    );

    let shutdown_registry = registry.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown::os_signal().await;
            shutdown_registry.close_all();
            let _ = shutdown_tx.send(true);
        })
        .await?;

    let stats = relay_task.await?;
    if let Some(task) = watchdog_task {
        task.await?;
    }
    tracing::info!(
        delivered = stats.delivered,
        broadcasts = stats.broadcasts,
        not_local = stats.not_local,
        "Gateway stopped"
    );
    Ok(())
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(%origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    if allowed.is_empty() {
        CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any)
    } else {
        CorsLayer::new().allow_origin(allowed).allow_methods(Any).allow_headers(Any)
    }
}
