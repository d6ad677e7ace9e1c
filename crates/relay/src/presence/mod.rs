// Typing indicators and presence transitions.
//
// Typing state is ephemeral and lives only in memory; presence is a
// best-effort write-through to the user store. A typing entry is held
// until the user sends a chat message, explicitly stops typing, or
// disconnects.

use std::collections::{HashMap, HashSet};

use banter_common::types::PresenceStatus;
use chrono::Utc;
use tokio::sync::RwLock;

use crate::store::UserStore;

/// Per-room set of user ids currently typing.
#[derive(Debug, Default)]
pub struct TypingTracker {
    rooms: RwLock<HashMap<String, HashSet<String>>>,
}

impl TypingTracker {
    /// Record or clear a typing flag. Returns true when the call changed
    /// state, so callers can skip rebroadcasting no-op updates.
    pub async fn set_typing(&self, room_id: &str, user_id: &str, is_typing: bool) -> bool {
        let mut rooms = self.rooms.write().await;
        if is_typing {
            rooms
                .entry(room_id.to_string())
                .or_default()
                .insert(user_id.to_string())
        } else {
            let changed = match rooms.get_mut(room_id) {
                Some(users) => users.remove(user_id),
                None => false,
            };
            if let Some(users) = rooms.get(room_id) {
                if users.is_empty() {
                    rooms.remove(room_id);
                }
            }
            changed
        }
    }

    pub async fn typing_users(&self, room_id: &str) -> Vec<String> {
        self.rooms
            .read()
            .await
            .get(room_id)
            .map(|users| users.iter().cloned().collect())
            .unwrap_or_default()
    }
}

/// Best-effort presence write. A store failure must never tear down the
/// connection it was recorded for, so it is logged and swallowed.
pub async fn mark_online(users: &UserStore, user_id: &str) {
    if let Err(err) = users.set_status(user_id, PresenceStatus::Online, Utc::now()).await {
        tracing::warn!(user_id, error = %err, "failed to persist online status");
    }
}

pub async fn mark_offline(users: &UserStore, user_id: &str) {
    if let Err(err) = users.set_status(user_id, PresenceStatus::Offline, Utc::now()).await {
        tracing::warn!(user_id, error = %err, "failed to persist offline status");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn set_typing_reports_state_changes() {
        let tracker = TypingTracker::default();

        assert!(tracker.set_typing("r1", "alice", true).await);
        assert!(!tracker.set_typing("r1", "alice", true).await);
        assert!(tracker.set_typing("r1", "alice", false).await);
        assert!(!tracker.set_typing("r1", "alice", false).await);
    }

    #[tokio::test]
    async fn typing_users_are_scoped_per_room() {
        let tracker = TypingTracker::default();
        tracker.set_typing("r1", "alice", true).await;
        tracker.set_typing("r2", "alice", true).await;
        tracker.set_typing("r1", "bob", true).await;

        let mut r1 = tracker.typing_users("r1").await;
        r1.sort();
        assert_eq!(r1, vec!["alice", "bob"]);
        assert_eq!(tracker.typing_users("r2").await, vec!["alice"]);
        assert!(tracker.typing_users("r3").await.is_empty());
    }

    #[tokio::test]
    async fn clearing_one_room_leaves_other_rooms_untouched() {
        let tracker = TypingTracker::default();
        tracker.set_typing("r1", "alice", true).await;
        tracker.set_typing("r2", "alice", true).await;

        assert!(tracker.set_typing("r1", "alice", false).await);

        assert!(tracker.typing_users("r1").await.is_empty());
        assert_eq!(tracker.typing_users("r2").await, vec!["alice"]);
    }

    #[tokio::test]
    async fn presence_writes_reach_the_store() {
        let users = UserStore::memory_with_users(vec![banter_common::types::User {
            user_id: "alice".to_string(),
            username: "Alice".to_string(),
            status: PresenceStatus::Offline,
            last_seen: Utc::now(),
        }]);

        mark_online(&users, "alice").await;
        let user = users.find_by_user_id("alice").await.unwrap().unwrap();
        assert_eq!(user.status, PresenceStatus::Online);

        mark_offline(&users, "alice").await;
        let user = users.find_by_user_id("alice").await.unwrap().unwrap();
        assert_eq!(user.status, PresenceStatus::Offline);
    }
}
