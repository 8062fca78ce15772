//! One live client connection.
//!
//! The socket itself is owned by the connection's writer task; everything
//! else (ingress loop, relay listener, watchdog) reaches the client through
//! the bounded `mpsc` sender held here. Sends never block: a client that
//! stops reading overflows its buffer and is closed instead of silently
//! losing frames.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use thiserror::Error;
use tokio::sync::{mpsc, Notify};

use crate::domain::foundation::{AuthenticatedUser, ConnectionId, Timestamp};
use crate::domain::relay::{events, Frame};

/// Why a frame could not be queued for a client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SendError {
    #[error("connection is closed")]
    Closed,

    #[error("client send buffer is full")]
    Overflow,
}

/// Unmatched `done` events kept for runs not yet marked.
const MAX_EARLY_DONES: usize = 16;

#[derive(Debug)]
struct RunTracker {
    /// Runs started and not yet finished.
    pending: usize,
    last_activity: Instant,
    /// `done` events that arrived while no run was pending, oldest first.
    early_dones: VecDeque<Instant>,
}

pub struct ClientConnection {
    id: ConnectionId,
    user: AuthenticatedUser,
    tx: mpsc::Sender<String>,
    connected_at: Timestamp,
    /// Frames that could not be queued.
    dropped: AtomicU64,
    closing: AtomicBool,
    close: Notify,
    run: Mutex<RunTracker>,
}

impl ClientConnection {
    /// Creates a connection and the receiver its writer task drains.
    pub fn new(
        id: ConnectionId,
        user: AuthenticatedUser,
        buffer: usize,
    ) -> (Arc<Self>, mpsc::Receiver<String>) {
        let (tx, rx) = mpsc::channel(buffer.max(1));
        let connection = Self {
            id,
            user,
            tx,
            connected_at: Timestamp::now(),
            dropped: AtomicU64::new(0),
            closing: AtomicBool::new(false),
            close: Notify::new(),
            run: Mutex::new(RunTracker {
                pending: 0,
                last_activity: Instant::now(),
                early_dones: VecDeque::new(),
            }),
        };
        (Arc::new(connection), rx)
    }

    pub fn id(&self) -> &ConnectionId {
        &self.id
    }

    pub fn user(&self) -> &AuthenticatedUser {
        &self.user
    }

    pub fn connected_at(&self) -> &Timestamp {
        &self.connected_at
    }

    /// Queues a frame for the client.
    pub fn send_frame(&self, frame: &Frame) -> Result<(), SendError> {
        if self.is_closing() {
            return Err(SendError::Closed);
        }
        match self.tx.try_send(frame.to_text()) {
            Ok(()) => Ok(()),
            Err(mpsc::error::TrySendError::Full(_)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(
                    connection_id = %self.id,
                    event = %frame.event,
                    "Client send buffer full, closing connection"
                );
                self.request_close();
                Err(SendError::Overflow)
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                Err(SendError::Closed)
            }
        }
    }

    /// Queues a frame that came from the bus, updating run tracking.
    pub fn deliver(&self, frame: &Frame) -> Result<(), SendError> {
        if frame.event == events::AGENT_RESPONSE {
            let done = frame.data.get("kind").and_then(|k| k.as_str()) == Some("done")
                || frame.data.get("type").and_then(|k| k.as_str()) == Some("done");
            let mut run = self.run.lock().unwrap_or_else(PoisonError::into_inner);
            run.last_activity = Instant::now();
            if done {
                if run.pending > 0 {
                    run.pending -= 1;
                } else {
                    if run.early_dones.len() == MAX_EARLY_DONES {
                        run.early_dones.pop_front();
                    }
                    let at = run.last_activity;
                    run.early_dones.push_back(at);
                }
            }
        }
        self.send_frame(frame)
    }

    /// Records that this connection started a run and awaits its events.
    pub fn mark_run_dispatched(&self) {
        self.mark_run_dispatched_since(Instant::now());
    }

    /// Like `mark_run_dispatched`, for a run enqueued at `since`.
    ///
    /// A worker can finish before the ingress loop gets here; an unmatched
    /// `done` delivered after `since` means the run already ended.
    pub fn mark_run_dispatched_since(&self, since: Instant) {
        let mut run = self.run.lock().unwrap_or_else(PoisonError::into_inner);
        while run.early_dones.front().is_some_and(|done| *done < since) {
            run.early_dones.pop_front();
        }
        if run.early_dones.pop_front().is_some() {
            return;
        }
        run.pending += 1;
        run.last_activity = Instant::now();
    }

    /// Time since the last sign of life from a pending run.
    pub fn run_idle_for(&self) -> Option<Duration> {
        let run = self.run.lock().unwrap_or_else(PoisonError::into_inner);
        (run.pending > 0).then(|| run.last_activity.elapsed())
    }

    /// Stops waiting for every pending run.
    pub fn clear_run(&self) {
        let mut run = self.run.lock().unwrap_or_else(PoisonError::into_inner);
        run.pending = 0;
        run.early_dones.clear();
    }

    /// Ends the connection: wakes every task waiting in `closed`.
    pub fn request_close(&self) {
        if !self.closing.swap(true, Ordering::SeqCst) {
            self.close.notify_waiters();
        }
    }

    pub fn is_closing(&self) -> bool {
        self.closing.load(Ordering::SeqCst)
    }

    /// Resolves once `request_close` has been called.
    pub async fn closed(&self) {
        let notified = self.close.notified();
        tokio::pin!(notified);
        notified.as_mut().enable();
        if self.is_closing() {
            return;
        }
        notified.await;
    }

    /// Total frames dropped for this connection.
    pub fn drop_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl std::fmt::Debug for ClientConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientConnection")
            .field("id", &self.id)
            .field("user", &self.user.id)
            .field("closing", &self.is_closing())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::foundation::UserId;
    use serde_json::json;

    fn user() -> AuthenticatedUser {
        AuthenticatedUser::new(UserId::new("u-1").unwrap(), None)
    }

    fn make_connection(buffer: usize) -> (Arc<ClientConnection>, mpsc::Receiver<String>) {
        ClientConnection::new(ConnectionId::new(), user(), buffer)
    }

    #[test]
    fn send_frame_queues_text() {
        let (conn, mut rx) = make_connection(4);
        conn.send_frame(&Frame::error("x")).unwrap();
        let text = rx.try_recv().unwrap();
        assert!(text.contains("\"error\""));
    }

    #[test]
    fn overflow_closes_the_connection() {
        let (conn, _rx) = make_connection(1);
        conn.send_frame(&Frame::new("a", json!({}))).unwrap();
        assert_eq!(conn.send_frame(&Frame::new("b", json!({}))), Err(SendError::Overflow));
        assert!(conn.is_closing());
        assert_eq!(conn.drop_count(), 1);
        assert_eq!(conn.send_frame(&Frame::new("c", json!({}))), Err(SendError::Closed));
    }

    #[test]
    fn send_after_writer_gone_is_closed() {
        let (conn, rx) = make_connection(4);
        drop(rx);
        assert_eq!(conn.send_frame(&Frame::error("x")), Err(SendError::Closed));
    }

    #[test]
    fn run_tracking_follows_agent_responses() {
        let (conn, _rx) = make_connection(8);
        assert!(conn.run_idle_for().is_none());

        conn.mark_run_dispatched();
        assert!(conn.run_idle_for().is_some());

        conn.deliver(&Frame::new("agent_response", json!({"type": "token", "kind": "token", "delta": "x"})))
            .unwrap();
        assert!(conn.run_idle_for().is_some());

        conn.deliver(&Frame::new("agent_response", json!({"type": "done", "kind": "done"})))
            .unwrap();
        assert!(conn.run_idle_for().is_none());
    }

    #[test]
    fn other_events_do_not_touch_run_state() {
        let (conn, _rx) = make_connection(8);
        conn.deliver(&Frame::new("agent_response", json!({"kind": "done"}))).unwrap();
        conn.mark_run_dispatched();
        conn.deliver(&Frame::new("processing_session", json!({"session_id": "s"}))).unwrap();
        assert!(conn.run_idle_for().is_some());
        conn.clear_run();
        assert!(conn.run_idle_for().is_none());
    }

    #[test]
    fn done_before_dispatch_mark_leaves_no_pending_run() {
        let (conn, _rx) = make_connection(8);
        let since = Instant::now();
        conn.deliver(&Frame::new("agent_response", json!({"type": "done", "kind": "done"})))
            .unwrap();
        conn.mark_run_dispatched_since(since);
        assert!(conn.run_idle_for().is_none());
    }

    #[tokio::test]
    async fn closed_resolves_after_request_close() {
        let (conn, _rx) = make_connection(1);
        let waiter = {
            let conn = conn.clone();
            tokio::spawn(async move { conn.closed().await })
        };
        conn.request_close();
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
        conn.closed().await;
    }

    #[tokio::test]
    async fn request_close_wakes_every_waiter() {
        let (conn, _rx) = make_connection(1);
        let waiters: Vec<_> = (0..2)
            .map(|_| {
                let conn = conn.clone();
                tokio::spawn(async move { conn.closed().await })
            })
            .collect();
        tokio::time::sleep(Duration::from_millis(10)).await;

        conn.request_close();
        for waiter in waiters {
            tokio::time::timeout(Duration::from_secs(1), waiter)
                .await
                .unwrap()
                .unwrap();
        }
    }

    #[test]
    fn concurrent_runs_stay_pending_until_each_is_done() {
        let (conn, _rx) = make_connection(8);
        let done = Frame::new("agent_response", json!({"type": "done", "kind": "done"}));
        conn.mark_run_dispatched();
        conn.mark_run_dispatched();

        conn.deliver(&done).unwrap();
        assert!(conn.run_idle_for().is_some());

        conn.deliver(&done).unwrap();
        assert!(conn.run_idle_for().is_none());
    }

    #[test]
    fn early_done_only_settles_one_run() {
        let (conn, _rx) = make_connection(8);
        let since = Instant::now();
        conn.deliver(&Frame::new("agent_response", json!({"type": "done", "kind": "done"})))
            .unwrap();
        conn.mark_run_dispatched_since(since);
        conn.mark_run_dispatched_since(since);
        assert!(conn.run_idle_for().is_some());
    }
}
