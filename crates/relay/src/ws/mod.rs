pub mod handler;

use std::sync::Arc;

use axum::routing::get;
use axum::Router;

use crate::broadcast::Broadcaster;
use crate::notify::NotificationDispatcher;
use crate::presence::TypingTracker;
use crate::registry::ConnectionRegistry;
use crate::store::{LeaveMarkerStore, MessageStore, RoomStore, UserStore};

pub(crate) const HEARTBEAT_INTERVAL_MS: u64 = 15_000;
pub(crate) const HEARTBEAT_TIMEOUT_MS: u64 = 45_000;
pub(crate) const MAX_FRAME_BYTES: u32 = 262_144;

#[derive(Clone)]
pub struct RelayState {
    pub registry: Arc<ConnectionRegistry>,
    pub typing: Arc<TypingTracker>,
    pub broadcaster: Broadcaster,
    pub notifier: NotificationDispatcher,
    pub messages: MessageStore,
    pub rooms: RoomStore,
    pub users: UserStore,
    pub leave_markers: LeaveMarkerStore,
}

impl RelayState {
    pub fn new(
        messages: MessageStore,
        rooms: RoomStore,
        users: UserStore,
        leave_markers: LeaveMarkerStore,
    ) -> Self {
        let registry = Arc::new(ConnectionRegistry::default());
        let broadcaster = Broadcaster::new(registry.clone(), rooms.clone());
        let notifier = NotificationDispatcher::new(registry.clone(), rooms.clone());
        Self {
            registry,
            typing: Arc::new(TypingTracker::default()),
            broadcaster,
            notifier,
            messages,
            rooms,
            users,
            leave_markers,
        }
    }
}

pub fn router(state: RelayState) -> Router {
    Router::new().route("/ws", get(handler::ws_upgrade)).with_state(state)
}
