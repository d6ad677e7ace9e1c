// Room broadcast engine.
//
// Delivery walks a snapshot of the registry taken outside any lock, so a
// slow socket never blocks registration. A failed send means the peer is
// gone; the dead handle is pruned and delivery continues to the rest.

use std::sync::Arc;

use banter_common::protocol::ws::ServerEvent;

use crate::registry::ConnectionRegistry;
use crate::store::RoomStore;

#[derive(Clone)]
pub struct Broadcaster {
    registry: Arc<ConnectionRegistry>,
    rooms: RoomStore,
}

impl Broadcaster {
    pub fn new(registry: Arc<ConnectionRegistry>, rooms: RoomStore) -> Self {
        Self { registry, rooms }
    }

    /// Deliver an event to every participant connection currently present
    /// in the room. Returns how many connections received it.
    pub async fn broadcast(&self, room_id: &str, event: &ServerEvent) -> usize {
        let participants = self.rooms.resolve_participants(room_id).await;

        let mut delivered = 0;
        for user_id in &participants {
            for handle in self.registry.connections_in_room(user_id, room_id).await {
                match handle.send(event.clone()) {
                    Ok(()) => delivered += 1,
                    Err(err) => {
                        tracing::warn!(
                            room_id,
                            user_id,
                            connection_id = %err.connection_id,
                            "dropping dead connection during broadcast"
                        );
                        self.registry.prune(user_id, room_id, err.connection_id).await;
                    }
                }
            }
        }

        delivered
    }
}
