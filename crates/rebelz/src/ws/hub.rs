//! In-memory connection registry.
//!
//! Tracks two kinds of live consumers: group chat WebSocket connections
//! (many per group, many per user) and agent event streams (at most one per
//! user key). All delivery goes through bounded per-connection queues; the
//! hub never blocks on a slow consumer.

use dashmap::DashMap;
use log::{debug, info, warn};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc;

use crate::protocol::Envelope;

/// Monotonic handle for a registered connection or stream. Identifies one
/// registration generation, so a stale unregister cannot evict a replacement.
pub type ConnectionId = u64;

const DEFAULT_QUEUE_SIZE: usize = 64;

struct GroupConnection {
    id: ConnectionId,
    user_id: String,
    tx: mpsc::Sender<Envelope>,
}

struct UserStream {
    id: ConnectionId,
    tx: mpsc::Sender<Envelope>,
}

/// Registry of live group connections and per-user agent streams.
///
/// Cheap to clone via `Arc`; all maps are sharded concurrent maps so
/// registration and broadcast do not serialize on a global lock.
pub struct ChatHub {
    groups: DashMap<i64, Vec<GroupConnection>>,
    user_streams: DashMap<String, UserStream>,
    next_id: AtomicU64,
    queue_size: usize,
}

impl ChatHub {
    pub fn new(queue_size: usize) -> Arc<Self> {
        Arc::new(Self {
            groups: DashMap::new(),
            user_streams: DashMap::new(),
            next_id: AtomicU64::new(1),
            queue_size: queue_size.max(1),
        })
    }

    pub fn with_defaults() -> Arc<Self> {
        Self::new(DEFAULT_QUEUE_SIZE)
    }

    fn allocate_id(&self) -> ConnectionId {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Register a group chat connection. The caller owns the receiver half
    /// and must pass the returned id back on teardown.
    pub fn register_group_connection(
        &self,
        group_id: i64,
        user_id: &str,
    ) -> (ConnectionId, mpsc::Receiver<Envelope>) {
        let (tx, rx) = mpsc::channel(self.queue_size);
        let id = self.allocate_id();
        self.groups.entry(group_id).or_default().push(GroupConnection {
            id,
            user_id: user_id.to_string(),
            tx,
        });
        info!("user {user_id} connected to group {group_id} (conn {id})");
        (id, rx)
    }

    /// Remove a group connection. Idempotent; unknown ids are ignored.
    pub fn unregister_group_connection(&self, group_id: i64, conn_id: ConnectionId) {
        let mut empty = false;
        if let Some(mut conns) = self.groups.get_mut(&group_id) {
            conns.retain(|c| c.id != conn_id);
            empty = conns.is_empty();
        }
        if empty {
            self.groups.remove_if(&group_id, |_, conns| conns.is_empty());
        }
        debug!("conn {conn_id} left group {group_id}");
    }

    /// Fan an envelope out to every live connection in a group.
    ///
    /// Delivery is `try_send`: a connection whose queue is full or whose
    /// receiver is gone gets dropped from the registry instead of stalling
    /// the rest of the group. Returns the number of queues that accepted the
    /// envelope.
    pub fn broadcast(&self, group_id: i64, envelope: &Envelope) -> usize {
        let Some(mut conns) = self.groups.get_mut(&group_id) else {
            return 0;
        };
        let mut delivered = 0;
        conns.retain(|conn| match conn.tx.try_send(envelope.clone()) {
            Ok(()) => {
                delivered += 1;
                true
            }
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!(
                    "dropping conn {} (user {}) in group {group_id}: send queue full",
                    conn.id, conn.user_id
                );
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                debug!("pruning closed conn {} in group {group_id}", conn.id);
                false
            }
        });
        delivered
    }

    /// Deliver an envelope to one specific group connection, for
    /// per-connection error replies that must not reach the whole group.
    pub fn send_to_connection(
        &self,
        group_id: i64,
        conn_id: ConnectionId,
        envelope: &Envelope,
    ) -> bool {
        let Some(conns) = self.groups.get(&group_id) else {
            return false;
        };
        conns
            .iter()
            .find(|c| c.id == conn_id)
            .is_some_and(|c| c.tx.try_send(envelope.clone()).is_ok())
    }

    /// Drop every connection of a group. Dropping the senders closes each
    /// connection's receiver, which ends its socket send task.
    pub fn drop_group(&self, group_id: i64) {
        if let Some((_, conns)) = self.groups.remove(&group_id) {
            info!("dropping {} connection(s) of deleted group {group_id}", conns.len());
        }
    }

    pub fn group_connection_count(&self, group_id: i64) -> usize {
        self.groups.get(&group_id).map_or(0, |c| c.len())
    }

    /// Register an agent stream for a user key, replacing any existing
    /// stream. The old stream's sender is dropped, which closes its receiver
    /// and ends the old SSE body.
    pub fn register_user_stream(&self, key: &str) -> (ConnectionId, mpsc::Receiver<Envelope>) {
        let (tx, rx) = mpsc::channel(self.queue_size);
        let id = self.allocate_id();
        if let Some(old) = self.user_streams.insert(key.to_string(), UserStream { id, tx }) {
            info!("replacing agent stream for {key} (old {}, new {id})", old.id);
        } else {
            info!("agent stream opened for {key} (stream {id})");
        }
        (id, rx)
    }

    /// Remove a user stream only if the generation still matches. A teardown
    /// racing a reconnect must not evict the fresh stream.
    pub fn unregister_user_stream(&self, key: &str, stream_id: ConnectionId) {
        let removed = self
            .user_streams
            .remove_if(key, |_, stream| stream.id == stream_id)
            .is_some();
        if removed {
            info!("agent stream closed for {key} (stream {stream_id})");
        }
    }

    /// Push an envelope to a user's agent stream. Returns false when the user
    /// has no live stream; offline users are not an error.
    pub fn send_to_user(&self, key: &str, envelope: &Envelope) -> bool {
        let Some(stream) = self.user_streams.get(key) else {
            return false;
        };
        match stream.tx.try_send(envelope.clone()) {
            Ok(()) => true,
            Err(e) => {
                debug!("agent stream for {key} rejected envelope: {e}");
                false
            }
        }
    }

    /// Clone the sender half of a user stream, generation checked. Lets the
    /// stream's own heartbeat task push without racing a replacement.
    pub fn user_stream_sender(
        &self,
        key: &str,
        stream_id: ConnectionId,
    ) -> Option<mpsc::Sender<Envelope>> {
        self.user_streams
            .get(key)
            .filter(|stream| stream.id == stream_id)
            .map(|stream| stream.tx.clone())
    }

    pub fn user_stream_online(&self, key: &str) -> bool {
        self.user_streams.contains_key(key)
    }
}
