//! Ingress behavior against misbehaving clients and a busy registry.
//!
//! Each scenario opens real ingress sessions on one gateway and drives them
//! through an in-memory inbound stream:
//! - malformed and unknown frames are answered with `error` frames and the
//!   connection keeps working
//! - disconnects (clean, aborted, overflowing) unregister exactly once, even
//!   while broadcasts are being fanned out
//! - a run that never finishes is timed out by the watchdog

use std::sync::Arc;
use std::time::Duration;

use futures::channel::mpsc::{unbounded, UnboundedSender};
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use agent_relay::adapters::queue::InMemoryJobQueue;
use agent_relay::adapters::storage::InMemoryDocumentStore;
use agent_relay::adapters::websocket::{
    CloseReason, ConnectionRegistry, Inbound, IngressSession, RunWatchdog, RUN_TIMED_OUT,
};
use agent_relay::application::{build_registry, HandlerRegistry, WorkDispatcher, PROCESS_SESSION};
use agent_relay::domain::foundation::{AuthenticatedUser, ConnectionId, UserId};
use agent_relay::domain::relay::Frame;
use agent_relay::shutdown;

const QUEUE: &str = "agents";
const WAIT: Duration = Duration::from_secs(2);

// =============================================================================
// Test Infrastructure
// =============================================================================

struct Gateway {
    registry: Arc<ConnectionRegistry>,
    handlers: Arc<HandlerRegistry>,
    queue: Arc<InMemoryJobQueue>,
}

impl Gateway {
    fn new() -> Self {
        let store = InMemoryDocumentStore::new();
        let queue = Arc::new(InMemoryJobQueue::new());
        let handlers = Arc::new(build_registry(
            Arc::new(store.clone()),
            Arc::new(store),
            WorkDispatcher::new(queue.clone(), QUEUE),
            Duration::from_secs(5),
        ));
        Self {
            registry: Arc::new(ConnectionRegistry::new()),
            handlers,
            queue,
        }
    }

    async fn connect(&self, user: &str, buffer: usize) -> Client {
        let user = AuthenticatedUser::new(UserId::new(user).unwrap(), None);
        let (session, mut frames) =
            IngressSession::open(self.registry.clone(), self.handlers.clone(), user, buffer);
        let greeting = next_frame(&mut frames).await;
        assert_eq!(greeting.event, "connection_established");

        let id = session.connection_id().clone();
        let (inbound, stream) = unbounded();
        Client {
            id,
            inbound,
            frames,
            task: tokio::spawn(session.run(stream)),
        }
    }
}

struct Client {
    id: ConnectionId,
    inbound: UnboundedSender<Inbound>,
    frames: mpsc::Receiver<String>,
    task: JoinHandle<CloseReason>,
}

impl Client {
    fn send_raw(&self, text: &str) {
        self.inbound.unbounded_send(Inbound::Text(text.to_string())).unwrap();
    }

    fn send(&self, event: &str, data: Value) {
        self.send_raw(&json!({ "event": event, "data": data }).to_string());
    }

    async fn next(&mut self) -> Frame {
        next_frame(&mut self.frames).await
    }

    async fn expect_error(&mut self, message: &str) {
        let frame = self.next().await;
        assert!(frame.is_error(), "expected error frame, got {frame:?}");
        assert_eq!(frame.data["message"], message);
    }

    async fn assert_alive(&mut self) {
        self.send("ping", json!({}));
        assert_eq!(self.next().await.event, "pong");
    }

    async fn closed(self) -> CloseReason {
        tokio::time::timeout(WAIT, self.task)
            .await
            .expect("ingress loop did not end")
            .unwrap()
    }
}

async fn next_frame(frames: &mut mpsc::Receiver<String>) -> Frame {
    let text = tokio::time::timeout(WAIT, frames.recv())
        .await
        .expect("timed out waiting for a frame")
        .expect("connection closed");
    serde_json::from_str(&text).unwrap()
}

// =============================================================================
// Malformed Input
// =============================================================================

#[tokio::test]
async fn malformed_json_is_reported_and_connection_stays_open() {
    let gateway = Gateway::new();
    let mut client = gateway.connect("u-1", 16).await;

    client.send_raw("{not json");
    client.expect_error("Invalid JSON message").await;
    client.assert_alive().await;
}

#[tokio::test]
async fn frame_without_event_is_reported() {
    let gateway = Gateway::new();
    let mut client = gateway.connect("u-1", 16).await;

    client.send_raw(r#"{"data": {"content": "hi"}}"#);
    client.expect_error("Missing 'event' field in message").await;
    client.send_raw("[1, 2, 3]");
    client.expect_error("Missing 'event' field in message").await;
    client.assert_alive().await;
}

#[tokio::test]
async fn unknown_event_is_reported_and_connection_stays_usable() {
    let gateway = Gateway::new();
    let mut client = gateway.connect("u-1", 16).await;

    client.send("launch_rockets", json!({}));
    client.expect_error("Unknown event: launch_rockets").await;
    client.assert_alive().await;
}

#[tokio::test]
async fn binary_frames_are_rejected() {
    let gateway = Gateway::new();
    let mut client = gateway.connect("u-1", 16).await;

    client.inbound.unbounded_send(Inbound::Binary).unwrap();
    client.expect_error("Binary messages are not supported").await;
    client.assert_alive().await;
}

#[tokio::test]
async fn invalid_ingest_enqueues_nothing() {
    let gateway = Gateway::new();
    let mut client = gateway.connect("u-1", 16).await;

    client.send("ingest_message", json!({"content": "   "}));
    let frame = client.next().await;
    assert!(frame.is_error());
    assert!(frame.data["message"]
        .as_str()
        .unwrap()
        .starts_with("Error processing event:"));

    client.send("ingest_message", json!({"session_id": "nope", "content": "hi"}));
    client
        .expect_error("Error processing event: Session not found: nope")
        .await;

    assert!(gateway.queue.pending(QUEUE).is_empty());
    client.assert_alive().await;
}

#[tokio::test]
async fn valid_ingest_enqueues_one_job_for_the_connection() {
    let gateway = Gateway::new();
    let mut client = gateway.connect("u-1", 16).await;

    client.send("ingest_message", json!({"content": "hi"}));
    let ack = client.next().await;
    assert_eq!(ack.event, "message_ingested");

    let jobs = gateway.queue.pending(QUEUE);
    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0].function, PROCESS_SESSION);
    assert_eq!(jobs[0].args[0], client.id.as_str());
    assert_eq!(jobs[0].args[1], ack.data["session_id"]);
}

// =============================================================================
// Disconnects
// =============================================================================

#[tokio::test]
async fn disconnect_during_broadcast_storm_unregisters_once() {
    let gateway = Gateway::new();
    let mut stayers = Vec::new();
    for i in 0..4 {
        stayers.push(gateway.connect(&format!("stay-{i}"), 4096).await);
    }
    let leaver = gateway.connect("leaver", 4096).await;
    let leaver_id = leaver.id.clone();
    assert_eq!(gateway.registry.len(), 5);

    let storm = {
        let registry = gateway.registry.clone();
        tokio::spawn(async move {
            let mut fanned_out = 0;
            for n in 0..500 {
                fanned_out += registry.broadcast(&Frame::new("tick", json!({ "n": n })), &[]);
                tokio::task::yield_now().await;
            }
            fanned_out
        })
    };

    tokio::time::sleep(Duration::from_millis(1)).await;
    leaver.inbound.unbounded_send(Inbound::Close).unwrap();
    assert_eq!(leaver.closed().await, CloseReason::ClientClosed);

    let fanned_out = storm.await.unwrap();
    assert!(fanned_out >= 4 * 500);
    assert!(!gateway.registry.contains(&leaver_id));
    assert_eq!(gateway.registry.len(), 4);

    for stayer in &mut stayers {
        for n in 0..500 {
            let frame = stayer.next().await;
            assert_eq!(frame.data["n"], n);
        }
    }
}

#[tokio::test]
async fn aborted_ingress_task_still_unregisters() {
    let gateway = Gateway::new();
    let client = gateway.connect("u-1", 16).await;
    let id = client.id.clone();

    client.task.abort();
    let _ = client.task.await;
    assert!(!gateway.registry.contains(&id));
}

#[tokio::test]
async fn transport_error_ends_the_session() {
    let gateway = Gateway::new();
    let client = gateway.connect("u-1", 16).await;
    let id = client.id.clone();

    client
        .inbound
        .unbounded_send(Inbound::Error("connection reset".into()))
        .unwrap();
    assert_eq!(
        client.closed().await,
        CloseReason::TransportError("connection reset".into())
    );
    assert!(!gateway.registry.contains(&id));
}

#[tokio::test]
async fn slow_client_is_closed_when_its_buffer_overflows() {
    let gateway = Gateway::new();
    let slow = gateway.connect("slow", 2).await;
    let mut fast = gateway.connect("fast", 64).await;

    for n in 0..8 {
        gateway.registry.broadcast(&Frame::new("tick", json!({ "n": n })), &[]);
    }

    let slow_id = slow.id.clone();
    assert_eq!(slow.closed().await, CloseReason::ServerClosed);
    assert!(!gateway.registry.contains(&slow_id));

    for n in 0..8 {
        assert_eq!(fast.next().await.data["n"], n);
    }
}

#[tokio::test]
async fn close_all_ends_every_session() {
    let gateway = Gateway::new();
    let a = gateway.connect("u-1", 16).await;
    let b = gateway.connect("u-2", 16).await;

    gateway.registry.close_all();
    assert_eq!(a.closed().await, CloseReason::ServerClosed);
    assert_eq!(b.closed().await, CloseReason::ServerClosed);
    assert!(gateway.registry.is_empty());
}

// =============================================================================
// Abandoned Runs
// =============================================================================

#[tokio::test]
async fn run_without_worker_is_timed_out() {
    let gateway = Gateway::new();
    let (shutdown_tx, shutdown_rx) = shutdown::channel();
    let watchdog = tokio::spawn(
        RunWatchdog::new(gateway.registry.clone(), Duration::from_millis(40)).run(shutdown_rx),
    );

    let mut client = gateway.connect("u-1", 16).await;
    client.send("ingest_message", json!({"content": "anyone there?"}));
    assert_eq!(client.next().await.event, "message_ingested");

    client.expect_error(RUN_TIMED_OUT).await;
    client.assert_alive().await;

    shutdown_tx.send(true).unwrap();
    watchdog.await.unwrap();
}
