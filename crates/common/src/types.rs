// Core domain records shared across all Banter crates.
//
// These mirror the durable store's rows; the relay reads and writes them
// through its persistence ports but never owns their lifecycle.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A persisted chat message. `id` is assigned by the message store on save.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChatMessage {
    pub id: i64,
    pub room_id: String,
    pub sender_id: String,
    pub sender_name: String,
    pub content: String,
    /// `text`, `image`, `emoji`, or `file`.
    pub message_type: String,
    pub file_url: Option<String>,
    pub sent_at: DateTime<Utc>,
    pub is_read: bool,
    pub read_at: Option<DateTime<Utc>>,
}

/// A chat message as submitted by a client, before the store assigns an id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewChatMessage {
    pub room_id: String,
    pub sender_id: String,
    pub sender_name: String,
    pub content: String,
    pub message_type: String,
    pub file_url: Option<String>,
    pub sent_at: DateTime<Utc>,
}

/// A chat room. Participants are resolved separately through the room store
/// because the membership collection can fail to materialize.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Room {
    pub room_id: String,
    pub room_name: String,
    pub last_message: Option<String>,
    pub last_message_time: Option<DateTime<Utc>>,
    pub last_message_sender: Option<String>,
}

/// A registered user as seen by the relay (identity is established upstream).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct User {
    pub user_id: String,
    pub username: String,
    pub status: PresenceStatus,
    pub last_seen: DateTime<Utc>,
}

/// Derived online/offline status: online while the user has at least one
/// live connection anywhere.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PresenceStatus {
    Online,
    Offline,
}

impl PresenceStatus {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Online => "online",
            Self::Offline => "offline",
        }
    }
}

impl fmt::Display for PresenceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown presence status '{0}'")]
pub struct ParsePresenceStatusError(String);

impl FromStr for PresenceStatus {
    type Err = ParsePresenceStatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "online" => Ok(Self::Online),
            "offline" => Ok(Self::Offline),
            other => Err(ParsePresenceStatusError(other.to_string())),
        }
    }
}

/// Marker recording that a user left a room; rooms with an active marker are
/// excluded from that user's unread-count push.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LeaveMarker {
    pub user_id: String,
    pub room_id: String,
    pub left_at: DateTime<Utc>,
}
