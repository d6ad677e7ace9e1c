// Out-of-room notification dispatch.
//
// After a chat message lands, every participant other than the sender gets
// a room-list refresh on all of their connections, and participants who
// are connected somewhere but not present in the message's room also get a
// notification banner. Participants with no live connections get nothing;
// their unread state is pushed when they next connect.

use std::sync::Arc;

use banter_common::protocol::ws::ServerEvent;
use banter_common::types::ChatMessage;

use crate::registry::ConnectionRegistry;
use crate::store::RoomStore;

const ROOM_UPDATE_MESSAGE_RECEIVED: &str = "messageReceived";

#[derive(Clone)]
pub struct NotificationDispatcher {
    registry: Arc<ConnectionRegistry>,
    rooms: RoomStore,
}

impl NotificationDispatcher {
    pub fn new(registry: Arc<ConnectionRegistry>, rooms: RoomStore) -> Self {
        Self { registry, rooms }
    }

    pub async fn dispatch(&self, message: &ChatMessage) {
        let participants = self.rooms.resolve_participants(&message.room_id).await;
        let room_name = match self.rooms.find_by_room_id(&message.room_id).await {
            Ok(Some(room)) => room.room_name,
            Ok(None) => message.room_id.clone(),
            Err(err) => {
                tracing::warn!(room_id = message.room_id, error = %err, "failed to load room name for notification");
                message.room_id.clone()
            }
        };

        for user_id in &participants {
            if user_id == &message.sender_id {
                continue;
            }

            let connections = self.registry.connections_for_user(user_id).await;
            if connections.is_empty() {
                continue;
            }
            let room_present =
                !self.registry.connections_in_room(user_id, &message.room_id).await.is_empty();

            if !room_present {
                let notification = ServerEvent::Notification {
                    room_id: message.room_id.clone(),
                    room_name: room_name.clone(),
                    sender_name: message.sender_name.clone(),
                    content: message.content.clone(),
                    sent_at: message.sent_at,
                    unread_count: 1,
                };
                for handle in &connections {
                    if let Err(err) = handle.send(notification.clone()) {
                        tracing::warn!(
                            user_id,
                            connection_id = %err.connection_id,
                            "skipping dead connection during notification dispatch"
                        );
                    }
                }
            }

            let room_update = ServerEvent::RoomUpdate {
                action: ROOM_UPDATE_MESSAGE_RECEIVED.to_string(),
                room_id: message.room_id.clone(),
                room_name: room_name.clone(),
            };
            for handle in &connections {
                if let Err(err) = handle.send(room_update.clone()) {
                    tracing::warn!(
                        user_id,
                        connection_id = %err.connection_id,
                        "skipping dead connection during room-update dispatch"
                    );
                }
            }
        }
    }
}
