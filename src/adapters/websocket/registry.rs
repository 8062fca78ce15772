//! Process-local connection registry.
//!
//! Maps connection ids to live connections owned by this process. Entries
//! are pure runtime state. The ingress loop, the relay listener and the
//! watchdog all touch the table concurrently, so every operation takes the
//! lock briefly and never holds it across a send or an await.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use super::connection::ClientConnection;
use crate::domain::foundation::ConnectionId;
use crate::domain::relay::Frame;

#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    connections: RwLock<HashMap<ConnectionId, Arc<ClientConnection>>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a connection. Returns false, leaving the table unchanged, if the
    /// id is already registered.
    pub fn register(&self, connection: Arc<ClientConnection>) -> bool {
        let mut connections = self
            .connections
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        if connections.contains_key(connection.id()) {
            return false;
        }
        connections.insert(connection.id().clone(), connection);
        true
    }

    /// Removes a connection, returning it if it was present.
    pub fn unregister(&self, id: &ConnectionId) -> Option<Arc<ClientConnection>> {
        self.connections
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(id)
    }

    pub fn get(&self, id: &ConnectionId) -> Option<Arc<ClientConnection>> {
        self.connections
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .cloned()
    }

    pub fn contains(&self, id: &ConnectionId) -> bool {
        self.connections
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(id)
    }

    /// Calls `f` for every connection registered at the time of the call.
    ///
    /// Works on a snapshot, so `f` may register or unregister connections.
    pub fn for_each_local(&self, mut f: impl FnMut(&Arc<ClientConnection>)) {
        for connection in self.snapshot() {
            f(&connection);
        }
    }

    /// Delivers a frame to every local connection not in `exclude`.
    ///
    /// Returns the number of connections the frame was queued for. A failed
    /// send only affects its own connection.
    pub fn broadcast(&self, frame: &Frame, exclude: &[ConnectionId]) -> usize {
        let mut delivered = 0;
        self.for_each_local(|connection| {
            if exclude.contains(connection.id()) {
                return;
            }
            match connection.deliver(frame) {
                Ok(()) => delivered += 1,
                Err(e) => tracing::debug!(
                    connection_id = %connection.id(),
                    event = %frame.event,
                    error = %e,
                    "Broadcast send failed"
                ),
            }
        });
        delivered
    }

    /// Asks every local connection to close.
    pub fn close_all(&self) {
        self.for_each_local(|connection| connection.request_close());
    }

    pub fn len(&self) -> usize {
        self.connections
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn snapshot(&self) -> Vec<Arc<ClientConnection>> {
        self.connections
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect()
    }
}
