pub mod actor;
pub mod broadcast;
pub mod handler;
pub mod protocol;

use axum::extract::ws::Message;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;

/// Type alias for the sender half of a WebSocket connection's channel.
/// Other parts of the system can clone this to push messages to a specific client.
pub type ConnectionSender = mpsc::Sender<Message>;

/// Per-connection outbound buffer. A client that lets this fill up is
/// treated like a dead socket by fanout.
pub const OUTBOUND_BUFFER: usize = 256;

/// Process-unique handle id, used to deregister one session without
/// touching the user's other sessions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

/// One live session of a user.
#[derive(Debug, Clone)]
pub struct Connection {
    pub id: ConnectionId,
    pub sender: ConnectionSender,
}

/// Connection registry: tracks all active WebSocket connections per user.
/// A user can have multiple concurrent connections (multiple devices/tabs).
#[derive(Clone, Default)]
pub struct ConnectionRegistry {
    inner: Arc<DashMap<String, Vec<Connection>>>,
    next_id: Arc<AtomicU64>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a session for `user_id`. Never rejects.
    pub fn register(&self, user_id: &str, sender: ConnectionSender) -> ConnectionId {
        let id = ConnectionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let mut entry = self.inner.entry(user_id.to_string()).or_default();
        entry.push(Connection { id, sender });

        tracing::debug!(
            user_id = %user_id,
            connections = entry.len(),
            "Connection registered"
        );
        id
    }

    /// Remove one session. Unknown ids are ignored. Returns true when the
    /// user has no sessions left afterwards.
    pub fn unregister(&self, user_id: &str, id: ConnectionId) -> bool {
        if let Some(mut connections) = self.inner.get_mut(user_id) {
            connections.retain(|c| c.id != id);
        }
        self.inner.remove_if(user_id, |_, v| v.is_empty());

        let now_offline = !self.is_online(user_id);
        tracing::debug!(
            user_id = %user_id,
            offline = now_offline,
            "Connection unregistered"
        );
        now_offline
    }

    pub fn is_online(&self, user_id: &str) -> bool {
        self.inner
            .get(user_id)
            .map(|v| !v.is_empty())
            .unwrap_or(false)
    }

    pub fn connection_count(&self, user_id: &str) -> usize {
        self.inner.get(user_id).map(|v| v.len()).unwrap_or(0)
    }

    pub fn online_users(&self) -> Vec<String> {
        self.inner
            .iter()
            .filter(|entry| !entry.value().is_empty())
            .map(|entry| entry.key().clone())
            .collect()
    }

    /// Invoke `deliver` once per live session of `user_id`. Sessions for
    /// which it returns false are evicted; the rest still get their call.
    /// Returns how many sessions accepted the delivery.
    pub fn for_each_connection<F>(&self, user_id: &str, mut deliver: F) -> usize
    where
        F: FnMut(&Connection) -> bool,
    {
        let mut delivered = 0;
        let mut evicted = 0;
        if let Some(mut connections) = self.inner.get_mut(user_id) {
            connections.retain(|conn| {
                if deliver(conn) {
                    delivered += 1;
                    true
                } else {
                    evicted += 1;
                    false
                }
            });
        }

        if evicted > 0 {
            self.inner.remove_if(user_id, |_, v| v.is_empty());
            tracing::warn!(
                user_id = %user_id,
                evicted,
                delivered,
                "Delivery degraded, dead connections evicted"
            );
        }
        delivered
    }
}
