//! Connection lifecycle tracking.
//!
//! # Responsibilities
//! - Generate unique connection IDs for tracing
//! - Keep the set of live connections, each with a handle to its task
//! - Count requests in flight, so a drain can finish while idle keep-alive
//!   sockets stay open
//! - Force-close every live connection on request ([`ConnectionTracker::kill`])
//! - Publish the open-connection gauge
//!
//! # Design Decisions
//! - An entry exists exactly as long as its [`ConnectionGuard`]; the guard is
//!   owned by the connection task, so the entry goes away however the task
//!   ends (clean close, error, panic, abort)
//! - The abort handle is attached after spawning; attaching to an entry that
//!   is already gone is a no-op
//! - A request stays in flight until its response body has been sent or
//!   dropped, not just until the handler returns

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::task::AbortHandle;

use crate::observability::metrics;

/// Global counter for connection IDs. Only uniqueness matters.
static CONNECTION_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Unique identifier for a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    pub fn new() -> Self {
        Self(CONNECTION_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

type Connections = DashMap<ConnectionId, Option<AbortHandle>>;

/// Set of live connections and the requests they are serving.
#[derive(Debug, Clone, Default)]
pub struct ConnectionTracker {
    connections: Arc<Connections>,
    in_flight: Arc<AtomicUsize>,
}

impl ConnectionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new connection. The entry is removed when the guard drops.
    pub fn track(&self) -> ConnectionGuard {
        let id = ConnectionId::new();
        self.connections.insert(id, None);
        metrics::set_active_connections(self.connections.len());
        tracing::trace!(connection_id = %id, "connection tracked");
        ConnectionGuard {
            id,
            connections: Arc::clone(&self.connections),
        }
    }

    /// Attach the task handle used by [`kill`](Self::kill).
    pub fn attach(&self, id: ConnectionId, handle: AbortHandle) {
        if let Some(mut entry) = self.connections.get_mut(&id) {
            *entry = Some(handle);
        }
    }

    /// Number of open connections, idle keep-alive sockets included.
    pub fn active_count(&self) -> usize {
        self.connections.len()
    }

    /// Mark a request as in flight until the guard drops.
    pub fn begin_request(&self) -> RequestGuard {
        self.in_flight.fetch_add(1, Ordering::AcqRel);
        RequestGuard {
            in_flight: Arc::clone(&self.in_flight),
        }
    }

    /// Number of requests currently being served.
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Abort every tracked connection task. Returns how many were aborted.
    pub fn kill(&self) -> usize {
        let handles: Vec<AbortHandle> = self
            .connections
            .iter()
            .filter_map(|entry| entry.value().clone())
            .collect();
        for handle in &handles {
            handle.abort();
        }
        tracing::warn!(connections = handles.len(), "Force-closing open connections");
        handles.len()
    }

    /// Wait until every tracked connection has closed.
    pub async fn wait_idle(&self) {
        while !self.connections.is_empty() {
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    }

    /// Wait until no request is in flight. Idle connections do not count.
    pub async fn wait_drained(&self) {
        while self.in_flight() > 0 {
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    }
}

/// Held for the lifetime of one request and its response body.
#[derive(Debug)]
pub struct RequestGuard {
    in_flight: Arc<AtomicUsize>,
}

impl Drop for RequestGuard {
    fn drop(&mut self) {
        self.in_flight.fetch_sub(1, Ordering::AcqRel);
    }
}

/// Owned by a connection task; unregisters the connection on drop.
#[derive(Debug)]
pub struct ConnectionGuard {
    id: ConnectionId,
    connections: Arc<Connections>,
}

impl ConnectionGuard {
    pub fn id(&self) -> ConnectionId {
        self.id
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.connections.remove(&self.id);
        metrics::set_active_connections(self.connections.len());
        tracing::trace!(connection_id = %self.id, "Connection closed");
    }
}
