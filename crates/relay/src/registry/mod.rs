// Live-connection registry: the only shared mutable state in the relay.
//
// Three index families over one set of connections, each behind its own
// lock, always acquired in the same order (by-connection, then by-user,
// then by-user-and-room). Cross-index atomicity only holds within a single
// register/unregister call; readers may transiently see a connection in one
// index but not yet another during a concurrent register and must treat
// that as a missed delivery for one cycle, never as an error.

use std::collections::HashMap;

use banter_common::protocol::ws::ServerEvent;
use tokio::sync::{mpsc, RwLock};
use uuid::Uuid;

/// Immutable per-connection metadata, created at connect time and discarded
/// at disconnect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionContext {
    pub user_id: String,
    pub room_id: String,
    pub connection_id: Uuid,
}

/// Cheap clonable handle to one live connection's outbound channel.
///
/// Sending fails fast once the socket task has dropped its receiver, which
/// is how a dead peer surfaces to the broadcast engine.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    id: Uuid,
    outbound: mpsc::UnboundedSender<ServerEvent>,
}

impl ConnectionHandle {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn send(&self, event: ServerEvent) -> Result<(), SendFailed> {
        self.outbound.send(event).map_err(|_| SendFailed { connection_id: self.id })
    }
}

/// The peer behind a connection handle is gone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("connection {connection_id} is closed")]
pub struct SendFailed {
    pub connection_id: Uuid,
}

/// Outcome of a successful registration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Registered {
    pub connection_id: Uuid,
    /// True when this is the user's first live connection anywhere; drives
    /// the presence-online transition.
    pub first_for_user: bool,
}

/// Outcome of unregistering a still-known connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Unregistered {
    pub user_id: String,
    pub room_id: String,
    /// True when the user has zero remaining connections; drives the
    /// presence-offline transition.
    pub last_for_user: bool,
}

#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    by_connection: RwLock<HashMap<Uuid, SessionContext>>,
    by_user: RwLock<HashMap<String, Vec<ConnectionHandle>>>,
    by_user_room: RwLock<HashMap<(String, String), Vec<ConnectionHandle>>>,
}

impl ConnectionRegistry {
    /// Register a connection under all three indexes and mint its id.
    ///
    /// The caller must have rejected connections missing a user or room
    /// before getting here; registration itself never fails.
    pub async fn register(
        &self,
        outbound: mpsc::UnboundedSender<ServerEvent>,
        user_id: &str,
        room_id: &str,
    ) -> Registered {
        let connection_id = Uuid::new_v4();
        let handle = ConnectionHandle { id: connection_id, outbound };

        {
            let mut guard = self.by_connection.write().await;
            guard.insert(
                connection_id,
                SessionContext {
                    user_id: user_id.to_string(),
                    room_id: room_id.to_string(),
                    connection_id,
                },
            );
        }

        let first_for_user = {
            let mut guard = self.by_user.write().await;
            let connections = guard.entry(user_id.to_string()).or_default();
            connections.push(handle.clone());
            connections.len() == 1
        };

        {
            let mut guard = self.by_user_room.write().await;
            guard
                .entry((user_id.to_string(), room_id.to_string()))
                .or_default()
                .push(handle);
        }

        Registered { connection_id, first_for_user }
    }

    /// Remove a connection from all three indexes, pruning empty entries.
    ///
    /// Idempotent: unregistering an unknown connection (double-close) is a
    /// no-op returning `None`.
    pub async fn unregister(&self, connection_id: Uuid) -> Option<Unregistered> {
        let context = {
            let mut guard = self.by_connection.write().await;
            guard.remove(&connection_id)?
        };

        let last_for_user = {
            let mut guard = self.by_user.write().await;
            if let Some(connections) = guard.get_mut(&context.user_id) {
                connections.retain(|handle| handle.id != connection_id);
                if connections.is_empty() {
                    guard.remove(&context.user_id);
                    true
                } else {
                    false
                }
            } else {
                true
            }
        };

        {
            let mut guard = self.by_user_room.write().await;
            let key = (context.user_id.clone(), context.room_id.clone());
            if let Some(connections) = guard.get_mut(&key) {
                connections.retain(|handle| handle.id != connection_id);
                if connections.is_empty() {
                    guard.remove(&key);
                }
            }
        }

        Some(Unregistered {
            user_id: context.user_id,
            room_id: context.room_id,
            last_for_user,
        })
    }

    /// Snapshot of a user's live connections scoped to one room, safe to
    /// iterate while registrations continue elsewhere.
    pub async fn connections_in_room(&self, user_id: &str, room_id: &str) -> Vec<ConnectionHandle> {
        self.by_user_room
            .read()
            .await
            .get(&(user_id.to_string(), room_id.to_string()))
            .cloned()
            .unwrap_or_default()
    }

    /// Snapshot of all of a user's live connections across rooms.
    pub async fn connections_for_user(&self, user_id: &str) -> Vec<ConnectionHandle> {
        self.by_user.read().await.get(user_id).cloned().unwrap_or_default()
    }

    /// Session context for the connection currently being processed.
    pub async fn context_for(&self, connection_id: Uuid) -> Option<SessionContext> {
        self.by_connection.read().await.get(&connection_id).cloned()
    }

    /// Drop a dead connection from the room-scoped index after a failed
    /// send. Full cleanup happens when its socket task unregisters.
    pub async fn prune(&self, user_id: &str, room_id: &str, connection_id: Uuid) {
        let mut guard = self.by_user_room.write().await;
        let key = (user_id.to_string(), room_id.to_string());
        if let Some(connections) = guard.get_mut(&key) {
            connections.retain(|handle| handle.id != connection_id);
            if connections.is_empty() {
                guard.remove(&key);
            }
        }
    }
}
