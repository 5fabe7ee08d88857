use crate::metrics;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{mpsc::UnboundedSender, RwLock};
use uuid::Uuid;

pub mod hub;
pub mod message_types;
pub mod session;

pub use hub::{Delivery, PresenceScope, RealtimeHub};
pub use message_types::{WsInboundEvent, WsOutboundEvent};
pub use session::WsSession;

/// Identifies one socket. A user reconnecting gets a fresh id, which lets a
/// late close of the old socket be told apart from the live one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DeliveryError {
    #[error("user {0} has no active connection")]
    TransportUnavailable(Uuid),
}

struct Connection {
    id: ConnectionId,
    sender: UnboundedSender<String>,
}

#[derive(Default)]
struct PresenceState {
    connections: HashMap<Uuid, Connection>,
    last_seen: HashMap<Uuid, DateTime<Utc>>,
}

/// Process-wide map of user -> live connection, plus the last time each user
/// went offline.
///
/// One connection per user: registering again replaces the previous entry.
#[derive(Default, Clone)]
pub struct PresenceRegistry {
    inner: Arc<RwLock<PresenceState>>,
}

impl PresenceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the connection that was replaced, if any.
    pub async fn register(
        &self,
        user_id: Uuid,
        connection: ConnectionId,
        sender: UnboundedSender<String>,
    ) -> Option<ConnectionId> {
        let mut guard = self.inner.write().await;
        let replaced = guard
            .connections
            .insert(
                user_id,
                Connection {
                    id: connection,
                    sender,
                },
            )
            .map(|old| old.id);
        metrics::ONLINE_USERS.set(guard.connections.len() as i64);

        tracing::debug!(
            user_id = %user_id,
            connection = ?connection,
            replaced = ?replaced,
            online = guard.connections.len(),
            "registered connection"
        );
        replaced
    }

    /// Remove the user's entry only if it still belongs to `connection`, and
    /// record `at` as their last-seen time. Returns whether the user went
    /// offline.
    pub async fn unregister(
        &self,
        user_id: Uuid,
        connection: ConnectionId,
        at: DateTime<Utc>,
    ) -> bool {
        let mut guard = self.inner.write().await;
        let owned = guard
            .connections
            .get(&user_id)
            .is_some_and(|c| c.id == connection);
        if !owned {
            tracing::debug!(
                user_id = %user_id,
                connection = ?connection,
                "stale connection closed, newer one kept"
            );
            return false;
        }
        guard.connections.remove(&user_id);
        guard.last_seen.insert(user_id, at);
        metrics::ONLINE_USERS.set(guard.connections.len() as i64);
        true
    }

    /// Queue a frame on the user's connection. A closed channel counts as
    /// undeliverable; the entry stays until its own connection unregisters.
    pub async fn send_to(&self, user_id: Uuid, frame: String) -> Result<(), DeliveryError> {
        let guard = self.inner.read().await;
        match guard.connections.get(&user_id) {
            Some(conn) if conn.sender.send(frame).is_ok() => Ok(()),
            _ => Err(DeliveryError::TransportUnavailable(user_id)),
        }
    }

    /// Send to every connected user except `except`. Returns how many
    /// connections accepted the frame.
    pub async fn broadcast(&self, frame: &str, except: Uuid) -> usize {
        let guard = self.inner.read().await;
        guard
            .connections
            .iter()
            .filter(|(user, _)| **user != except)
            .filter(|(_, conn)| conn.sender.send(frame.to_string()).is_ok())
            .count()
    }

    pub async fn send_to_many(&self, users: &[Uuid], frame: &str) -> usize {
        let guard = self.inner.read().await;
        users
            .iter()
            .filter_map(|user| guard.connections.get(user))
            .filter(|conn| conn.sender.send(frame.to_string()).is_ok())
            .count()
    }

    pub async fn is_online(&self, user_id: Uuid) -> bool {
        self.inner.read().await.connections.contains_key(&user_id)
    }

    pub async fn last_seen(&self, user_id: Uuid) -> Option<DateTime<Utc>> {
        self.inner.read().await.last_seen.get(&user_id).copied()
    }

    pub async fn online_count(&self) -> usize {
        self.inner.read().await.connections.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc::unbounded_channel;

    #[tokio::test]
    async fn stale_close_keeps_newer_connection() {
        let registry = PresenceRegistry::new();
        let user = Uuid::new_v4();
        let (old_tx, _old_rx) = unbounded_channel();
        let (new_tx, mut new_rx) = unbounded_channel();
        let old = ConnectionId::new();
        let new = ConnectionId::new();

        registry.register(user, old, old_tx).await;
        assert_eq!(registry.register(user, new, new_tx).await, Some(old));

        assert!(!registry.unregister(user, old, Utc::now()).await);
        assert!(registry.is_online(user).await);
        assert_eq!(registry.last_seen(user).await, None);

        registry.send_to(user, "hi".into()).await.unwrap();
        assert_eq!(new_rx.recv().await.as_deref(), Some("hi"));

        let at = Utc::now();
        assert!(registry.unregister(user, new, at).await);
        assert!(!registry.is_online(user).await);
        assert_eq!(registry.last_seen(user).await, Some(at));
    }

    #[tokio::test]
    async fn sending_to_offline_user_is_transport_unavailable() {
        let registry = PresenceRegistry::new();
        let user = Uuid::new_v4();
        assert_eq!(
            registry.send_to(user, "x".into()).await,
            Err(DeliveryError::TransportUnavailable(user))
        );

        let (tx, rx) = unbounded_channel();
        registry.register(user, ConnectionId::new(), tx).await;
        drop(rx);
        assert!(registry.send_to(user, "x".into()).await.is_err());
        assert!(registry.is_online(user).await);
    }

    #[tokio::test]
    async fn broadcast_skips_the_origin() {
        let registry = PresenceRegistry::new();
        let origin = Uuid::new_v4();
        let (tx_a, mut rx_a) = unbounded_channel();
        let (tx_b, mut rx_b) = unbounded_channel();
        registry.register(origin, ConnectionId::new(), tx_a).await;
        registry.register(Uuid::new_v4(), ConnectionId::new(), tx_b).await;

        assert_eq!(registry.broadcast("ping", origin).await, 1);
        assert_eq!(rx_b.recv().await.as_deref(), Some("ping"));
        assert!(rx_a.try_recv().is_err());
    }
}
