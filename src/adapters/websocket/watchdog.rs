//! Idle watchdog for dispatched runs.
//!
//! A worker that dies mid-run never publishes `done`, which would leave the
//! client waiting forever. Once a connection has dispatched a run, the
//! watchdog checks how long it has been since the last relayed
//! `agent_response`; past the timeout it sends the client an `error` frame
//! and stops waiting for that run.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;

use super::registry::ConnectionRegistry;
use crate::domain::relay::Frame;
use crate::shutdown;

pub const RUN_TIMED_OUT: &str = "Agent run timed out";

/// Fails every pending run idle for at least `timeout`. Returns how many.
pub fn sweep_idle_runs(registry: &ConnectionRegistry, timeout: Duration) -> usize {
    let mut expired = 0;
    registry.for_each_local(|connection| {
        let Some(idle) = connection.run_idle_for() else {
            return;
        };
        if idle < timeout {
            return;
        }

        connection.clear_run();
        expired += 1;
        tracing::warn!(
            connection_id = %connection.id(),
            idle_secs = idle.as_secs(),
            "No run events within timeout, giving up on run"
        );
        if let Err(e) = connection.send_frame(&Frame::error(RUN_TIMED_OUT)) {
            tracing::debug!(connection_id = %connection.id(), error = %e, "Failed to report run timeout");
        }
    });
    expired
}

pub struct RunWatchdog {
    registry: Arc<ConnectionRegistry>,
    timeout: Duration,
}

impl RunWatchdog {
    pub fn new(registry: Arc<ConnectionRegistry>, timeout: Duration) -> Self {
        Self { registry, timeout }
    }

    /// Sweeps periodically until shutdown.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        // Check a few times per timeout window, at least once a second.
        let period = (self.timeout / 4).clamp(Duration::from_millis(10), Duration::from_secs(1));
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown::requested(&mut shutdown) => return,
                _ = interval.tick() => {
                    sweep_idle_runs(&self.registry, self.timeout);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::websocket::connection::ClientConnection;
    use crate::domain::foundation::{AuthenticatedUser, ConnectionId, UserId};
    use serde_json::json;

    fn connection(registry: &ConnectionRegistry) -> (Arc<ClientConnection>, tokio::sync::mpsc::Receiver<String>) {
        let user = AuthenticatedUser::new(UserId::new("u").unwrap(), None);
        let (conn, rx) = ClientConnection::new(ConnectionId::new(), user, 8);
        registry.register(conn.clone());
        (conn, rx)
    }

    #[test]
    fn idle_run_gets_timeout_error_once() {
        let registry = ConnectionRegistry::new();
        let (conn, mut rx) = connection(&registry);
        conn.mark_run_dispatched();

        assert_eq!(sweep_idle_runs(&registry, Duration::ZERO), 1);
        let frame: Frame = serde_json::from_str(&rx.try_recv().unwrap()).unwrap();
        assert_eq!(frame, Frame::error(RUN_TIMED_OUT));

        assert_eq!(sweep_idle_runs(&registry, Duration::ZERO), 0);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn active_or_finished_runs_are_left_alone() {
        let registry = ConnectionRegistry::new();
        let (_never_ran, _rx1) = connection(&registry);
        let (finished, _rx2) = connection(&registry);
        let (active, _rx3) = connection(&registry);

        finished.mark_run_dispatched();
        finished
            .deliver(&Frame::new("agent_response", json!({"type": "done", "kind": "done"})))
            .unwrap();
        active.mark_run_dispatched();

        assert_eq!(sweep_idle_runs(&registry, Duration::from_secs(60)), 0);
        assert_eq!(sweep_idle_runs(&registry, Duration::ZERO), 1);
    }

    #[tokio::test]
    async fn watchdog_loop_stops_on_shutdown() {
        let registry = Arc::new(ConnectionRegistry::new());
        let (conn, mut rx) = connection(&registry);
        conn.mark_run_dispatched();

        let (tx, shutdown_rx) = shutdown::channel();
        let task = tokio::spawn(RunWatchdog::new(registry.clone(), Duration::from_millis(20)).run(shutdown_rx));

        let text = tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert!(text.contains(RUN_TIMED_OUT));

        tx.send(true).unwrap();
        task.await.unwrap();
    }
}
