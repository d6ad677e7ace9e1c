// WebSocket envelope types for the banter chat protocol.
//
// Field names are camelCase on the wire for compatibility with the existing
// web client; variant tags are the literal `type` discriminators it sends.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Everything a client may send over an established connection.
///
/// One JSON object per text frame. An unrecognized or malformed frame is
/// dropped by the router without closing the connection.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum ClientEvent {
    /// Post a chat message to a room.
    Message {
        room_id: String,
        content: String,
        #[serde(default = "default_message_type")]
        message_type: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        file_url: Option<String>,
    },

    /// Announce entering a room; triggers a system message and a refreshed
    /// participant list for everyone in it.
    JoinRoom { room_id: String },

    /// Start or stop a typing indicator.
    Typing { room_id: String, is_typing: bool },

    /// Mark every unread message from other senders in the room as read.
    Read { room_id: String },

    /// Broadcast-only reaction; never persisted.
    Emoji { room_id: String, emoji: String },
}

fn default_message_type() -> String {
    "text".to_string()
}

/// Everything the server may push to a client.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum ServerEvent {
    /// A chat message, echoed with the store-assigned identifier.
    Message {
        message_id: i64,
        room_id: String,
        sender_id: String,
        sender_name: String,
        content: String,
        message_type: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        file_url: Option<String>,
        sent_at: DateTime<Utc>,
    },

    /// Refreshed participant list for a room.
    Participants {
        room_id: String,
        participants: Vec<String>,
    },

    /// Another user's typing indicator changed.
    Typing {
        user_id: String,
        username: String,
        is_typing: bool,
    },

    /// A user read everything in a room.
    Read { user_id: String, room_id: String },

    /// A reaction from another user.
    Emoji {
        sender_id: String,
        sender_name: String,
        emoji: String,
        sent_at: DateTime<Utc>,
    },

    /// New-message alert for a participant without a live connection in the
    /// message's room.
    Notification {
        room_id: String,
        room_name: String,
        sender_name: String,
        content: String,
        sent_at: DateTime<Utc>,
        unread_count: u32,
    },

    /// Room-list reordering hint, sent regardless of room presence.
    #[serde(rename = "roomUpdate")]
    RoomUpdate {
        action: String,
        room_id: String,
        room_name: String,
    },

    /// Per-room unread count, pushed right after a connection opens.
    #[serde(rename = "unreadCount")]
    UnreadCount { count: i64, room_id: String },

    /// Join/leave announcements.
    System {
        content: String,
        sent_at: DateTime<Utc>,
    },
}

pub fn decode_event(raw: &str) -> Result<ClientEvent, serde_json::Error> {
    serde_json::from_str::<ClientEvent>(raw)
}

pub fn encode_event(event: &ServerEvent) -> Result<String, serde_json::Error> {
    serde_json::to_string(event)
}
