use banter_common::protocol::ws::{decode_event, ClientEvent, ServerEvent};
use chrono::{TimeZone, Utc};
use serde_json::Value;

const RELAY_WS_SOURCE: &str = include_str!("../src/ws/mod.rs");

#[test]
fn websocket_contract_heartbeat_constants() {
    let heartbeat_interval_ms = parse_u64_const(RELAY_WS_SOURCE, "HEARTBEAT_INTERVAL_MS");
    let heartbeat_timeout_ms = parse_u64_const(RELAY_WS_SOURCE, "HEARTBEAT_TIMEOUT_MS");
    let max_frame_bytes = parse_u64_const(RELAY_WS_SOURCE, "MAX_FRAME_BYTES");

    assert_eq!(heartbeat_interval_ms, 15_000);
    assert_eq!(heartbeat_timeout_ms, 45_000);
    assert_eq!(max_frame_bytes, 262_144);
    assert!(
        heartbeat_timeout_ms > heartbeat_interval_ms,
        "pong timeout must allow at least one missed ping",
    );
}

#[test]
fn websocket_contract_server_frame_shapes() {
    let sent_at = Utc.with_ymd_and_hms(2026, 8, 1, 12, 0, 0).single().expect("fixed timestamp");

    let samples = [
        (
            ServerEvent::Message {
                message_id: 42,
                room_id: "r1".to_string(),
                sender_id: "alice".to_string(),
                sender_name: "Alice".to_string(),
                content: "hello".to_string(),
                message_type: "text".to_string(),
                file_url: Some("https://files.banter.im/a.png".to_string()),
                sent_at,
            },
            "message",
            &["type", "messageId", "roomId", "senderId", "senderName", "content", "messageType", "fileUrl", "sentAt"][..],
        ),
        (
            ServerEvent::Participants {
                room_id: "r1".to_string(),
                participants: vec!["alice".to_string(), "bob".to_string()],
            },
            "participants",
            &["type", "roomId", "participants"][..],
        ),
        (
            ServerEvent::Typing {
                user_id: "alice".to_string(),
                username: "Alice".to_string(),
                is_typing: true,
            },
            "typing",
            &["type", "userId", "username", "isTyping"][..],
        ),
        (
            ServerEvent::Read { user_id: "bob".to_string(), room_id: "r1".to_string() },
            "read",
            &["type", "userId", "roomId"][..],
        ),
        (
            ServerEvent::Emoji {
                sender_id: "alice".to_string(),
                sender_name: "Alice".to_string(),
                emoji: "🎉".to_string(),
                sent_at,
            },
            "emoji",
            &["type", "senderId", "senderName", "emoji", "sentAt"][..],
        ),
        (
            ServerEvent::Notification {
                room_id: "r1".to_string(),
                room_name: "alice & bob".to_string(),
                sender_name: "Alice".to_string(),
                content: "hello".to_string(),
                sent_at,
                unread_count: 1,
            },
            "notification",
            &["type", "roomId", "roomName", "senderName", "content", "sentAt", "unreadCount"][..],
        ),
        (
            ServerEvent::RoomUpdate {
                action: "messageReceived".to_string(),
                room_id: "r1".to_string(),
                room_name: "alice & bob".to_string(),
            },
            "roomUpdate",
            &["type", "action", "roomId", "roomName"][..],
        ),
        (
            ServerEvent::UnreadCount { count: 3, room_id: "r1".to_string() },
            "unreadCount",
            &["type", "count", "roomId"][..],
        ),
        (
            ServerEvent::System { content: "Alice joined the room".to_string(), sent_at },
            "system",
            &["type", "content", "sentAt"][..],
        ),
    ];

    for (event, expected_type, expected_keys) in samples {
        let value = serde_json::to_value(event).expect("server event should serialize");
        assert_eq!(value["type"], expected_type);
        for key in expected_keys {
            assert!(
                value.get(key).is_some(),
                "serialized `{expected_type}` frame must include `{key}`",
            );
        }
    }
}

#[test]
fn websocket_contract_client_frames_decode_from_camel_case() {
    let chat = decode_event(
        r#"{"type":"message","roomId":"r1","content":"hi","messageType":"text","fileUrl":null}"#,
    )
    .expect("chat frame should decode");
    assert!(matches!(
        chat,
        ClientEvent::Message { room_id, content, message_type, file_url: None }
            if room_id == "r1" && content == "hi" && message_type == "text"
    ));

    let typing = decode_event(r#"{"type":"typing","roomId":"r1","isTyping":true}"#)
        .expect("typing frame should decode");
    assert!(matches!(
        typing,
        ClientEvent::Typing { room_id, is_typing: true } if room_id == "r1"
    ));

    let join = decode_event(r#"{"type":"join_room","roomId":"r1"}"#)
        .expect("join frame should decode");
    assert!(matches!(join, ClientEvent::JoinRoom { room_id } if room_id == "r1"));

    let read =
        decode_event(r#"{"type":"read","roomId":"r1"}"#).expect("read frame should decode");
    assert!(matches!(read, ClientEvent::Read { room_id } if room_id == "r1"));

    let emoji = decode_event(r#"{"type":"emoji","roomId":"r1","emoji":"🔥"}"#)
        .expect("emoji frame should decode");
    assert!(matches!(
        emoji,
        ClientEvent::Emoji { room_id, emoji } if room_id == "r1" && emoji == "🔥"
    ));
}

#[test]
fn websocket_contract_message_type_defaults_to_text() {
    let chat = decode_event(r#"{"type":"message","roomId":"r1","content":"hi"}"#)
        .expect("minimal chat frame should decode");
    assert!(matches!(
        chat,
        ClientEvent::Message { message_type, file_url: None, .. } if message_type == "text"
    ));
}

#[test]
fn websocket_contract_unknown_frame_type_is_rejected() {
    assert!(decode_event(r#"{"type":"subscribe","roomId":"r1"}"#).is_err());
    assert!(decode_event("not json").is_err());
}

#[test]
fn websocket_contract_optional_fields_are_omitted_when_absent() {
    let sent_at = Utc.with_ymd_and_hms(2026, 8, 1, 12, 0, 0).single().expect("fixed timestamp");
    let message = ServerEvent::Message {
        message_id: 1,
        room_id: "r1".to_string(),
        sender_id: "alice".to_string(),
        sender_name: "Alice".to_string(),
        content: "hello".to_string(),
        message_type: "text".to_string(),
        file_url: None,
        sent_at,
    };

    let value = serde_json::to_value(message).expect("message should serialize");
    assert!(!object_keys(&value).contains(&"fileUrl".to_string()));
}

fn object_keys(value: &Value) -> Vec<String> {
    let mut keys =
        value.as_object().expect("value should be an object").keys().cloned().collect::<Vec<_>>();
    keys.sort();
    keys
}

fn parse_u64_const(source: &str, name: &str) -> u64 {
    let needle = format!("const {name}:");
    let index = source.find(&needle).expect("constant must be declared");
    let line = source[index..].lines().next().expect("constant declaration line must exist");
    let raw_value = line
        .split('=')
        .nth(1)
        .expect("constant must have assignment")
        .trim()
        .trim_end_matches(';')
        .replace('_', "");
    raw_value
        .parse::<u64>()
        .unwrap_or_else(|error| panic!("failed to parse `{name}` from `{line}`: {error}"))
}
