use std::collections::HashSet;

use axum::extract::ws::{close_code, CloseFrame, Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::http::HeaderMap;
use axum::response::IntoResponse;
use banter_common::protocol::ws::{decode_event, encode_event, ClientEvent, ServerEvent};
use banter_common::types::NewChatMessage;
use chrono::Utc;
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{error, info, warn};
use uuid::Uuid;

use super::{RelayState, HEARTBEAT_INTERVAL_MS, HEARTBEAT_TIMEOUT_MS, MAX_FRAME_BYTES};
use crate::error::{
    request_id_from_headers_or_generate, with_request_id_scope, ErrorCode, RelayError,
};
use crate::presence;

#[derive(Deserialize)]
pub struct ConnectQuery {
    #[serde(rename = "userId")]
    user_id: Option<String>,
    #[serde(rename = "roomId")]
    room_id: Option<String>,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

pub async fn ws_upgrade(
    State(state): State<RelayState>,
    Query(query): Query<ConnectQuery>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    let (Some(user_id), Some(room_id)) = (non_empty(query.user_id), non_empty(query.room_id))
    else {
        return RelayError::new(
            ErrorCode::ValidationFailed,
            "userId and roomId query parameters are required",
        )
        .into_response();
    };

    let request_id = request_id_from_headers_or_generate(&headers);
    ws.max_frame_size(MAX_FRAME_BYTES as usize)
        .on_upgrade(move |socket| async move {
            with_request_id_scope(request_id, handle_socket(state, user_id, room_id, socket))
                .await;
        })
        .into_response()
}

fn frame_size_exceeded_reason() -> String {
    format!("websocket frame exceeds maximum size of {MAX_FRAME_BYTES} bytes")
}

fn is_frame_size_violation(error: &axum::Error) -> bool {
    let message = error.to_string().to_ascii_lowercase();
    message.contains("message too long")
        || message.contains("frame too long")
        || message.contains("too large")
        || message.contains("too big")
        || message.contains("size limit")
}

async fn close_frame_too_large(socket: &mut WebSocket) {
    let _ = socket
        .send(Message::Close(Some(CloseFrame {
            code: close_code::SIZE,
            reason: frame_size_exceeded_reason().into(),
        })))
        .await;
}

async fn send_event(socket: &mut WebSocket, event: &ServerEvent) -> Result<(), axum::Error> {
    let encoded = match encode_event(event) {
        Ok(encoded) => encoded,
        Err(err) => {
            error!(error = %err, "failed to encode outbound event");
            return Ok(());
        }
    };
    socket.send(Message::Text(encoded.into())).await
}

async fn handle_socket(state: RelayState, user_id: String, room_id: String, mut socket: WebSocket) {
    let (outbound_sender, mut outbound_receiver) = mpsc::unbounded_channel::<ServerEvent>();
    let registered = state.registry.register(outbound_sender, &user_id, &room_id).await;
    let connection_id = registered.connection_id;
    info!(user_id, room_id, connection_id = %connection_id, "websocket connected");

    if registered.first_for_user {
        presence::mark_online(&state.users, &user_id).await;
    }
    push_unread_counts(&state, &user_id, connection_id).await;

    // Heartbeat: server pings every HEARTBEAT_INTERVAL_MS, disconnects if no
    // pong arrives within HEARTBEAT_TIMEOUT_MS.
    let mut heartbeat_interval =
        tokio::time::interval(std::time::Duration::from_millis(HEARTBEAT_INTERVAL_MS));
    heartbeat_interval.reset(); // skip immediate first tick
    let mut last_pong = Instant::now();
    let heartbeat_timeout = std::time::Duration::from_millis(HEARTBEAT_TIMEOUT_MS);

    loop {
        tokio::select! {
            _ = heartbeat_interval.tick() => {
                if last_pong.elapsed() > heartbeat_timeout {
                    warn!(
                        user_id,
                        connection_id = %connection_id,
                        "heartbeat timeout, disconnecting"
                    );
                    break;
                }
                if socket.send(Message::Ping(vec![].into())).await.is_err() {
                    break;
                }
            }
            maybe_outbound = outbound_receiver.recv() => {
                match maybe_outbound {
                    Some(event) => {
                        if send_event(&mut socket, &event).await.is_err() {
                            break;
                        }
                    }
                    None => break,
                }
            }
            maybe_message = socket.recv() => {
                let Some(message) = maybe_message else {
                    break;
                };

                match message {
                    Ok(Message::Text(raw)) => {
                        if raw.len() > MAX_FRAME_BYTES as usize {
                            close_frame_too_large(&mut socket).await;
                            break;
                        }

                        // A malformed frame is the client's problem, not a
                        // reason to drop the connection.
                        let event = match decode_event(raw.as_str()) {
                            Ok(event) => event,
                            Err(err) => {
                                warn!(
                                    user_id,
                                    connection_id = %connection_id,
                                    error = %err,
                                    "ignoring malformed client event"
                                );
                                continue;
                            }
                        };

                        if let Err(err) = dispatch_event(&state, &user_id, event).await {
                            error!(
                                user_id,
                                connection_id = %connection_id,
                                error = %err,
                                "failed to handle client event"
                            );
                        }
                    }
                    Ok(Message::Ping(payload)) => {
                        if socket.send(Message::Pong(payload)).await.is_err() {
                            break;
                        }
                    }
                    Ok(Message::Pong(_)) => {
                        last_pong = Instant::now();
                    }
                    Ok(Message::Close(_)) => break,
                    Ok(_) => {}
                    Err(error) => {
                        if is_frame_size_violation(&error) {
                            close_frame_too_large(&mut socket).await;
                        }
                        break;
                    }
                }
            }
        }
    }

    if let Some(closed) = state.registry.unregister(connection_id).await {
        if state.typing.set_typing(&closed.room_id, &closed.user_id, false).await {
            let username = state.users.display_name(&closed.user_id).await;
            let stopped = ServerEvent::Typing {
                user_id: closed.user_id.clone(),
                username,
                is_typing: false,
            };
            state.broadcaster.broadcast(&closed.room_id, &stopped).await;
        }
        if closed.last_for_user {
            presence::mark_offline(&state.users, &closed.user_id).await;
        }
        info!(
            user_id = closed.user_id,
            room_id = closed.room_id,
            connection_id = %connection_id,
            "websocket disconnected"
        );
    }
}

/// Push one unread-count event per room the user participates in and has
/// not left. Best effort; a store failure here only costs badge freshness.
async fn push_unread_counts(state: &RelayState, user_id: &str, connection_id: Uuid) {
    let left_rooms: HashSet<String> = match state.leave_markers.find_by_user(user_id).await {
        Ok(markers) => markers.into_iter().map(|marker| marker.room_id).collect(),
        Err(err) => {
            warn!(user_id, error = %err, "failed to load leave markers for unread push");
            return;
        }
    };
    let rooms = match state.rooms.find_all().await {
        Ok(rooms) => rooms,
        Err(err) => {
            warn!(user_id, error = %err, "failed to list rooms for unread push");
            return;
        }
    };

    let Some(context) = state.registry.context_for(connection_id).await else {
        return;
    };
    let handles = state.registry.connections_in_room(&context.user_id, &context.room_id).await;
    let Some(handle) = handles.iter().find(|h| h.id() == connection_id) else {
        return;
    };

    for room in rooms {
        if left_rooms.contains(&room.room_id) {
            continue;
        }
        let participants = state.rooms.resolve_participants(&room.room_id).await;
        if !participants.iter().any(|p| p == user_id) {
            continue;
        }
        let count = match state.messages.count_unread(&room.room_id, user_id).await {
            Ok(count) => count,
            Err(err) => {
                warn!(room_id = room.room_id, error = %err, "failed to count unread messages");
                continue;
            }
        };
        if handle.send(ServerEvent::UnreadCount { count, room_id: room.room_id }).is_err() {
            return;
        }
    }
}

async fn dispatch_event(
    state: &RelayState,
    sender_id: &str,
    event: ClientEvent,
) -> anyhow::Result<()> {
    match event {
        ClientEvent::Message { room_id, content, message_type, file_url } => {
            handle_chat_message(state, sender_id, room_id, content, message_type, file_url).await
        }
        ClientEvent::JoinRoom { room_id } => handle_join_room(state, sender_id, room_id).await,
        ClientEvent::Typing { room_id, is_typing } => {
            handle_typing(state, sender_id, room_id, is_typing).await
        }
        ClientEvent::Read { room_id } => handle_read(state, sender_id, room_id).await,
        ClientEvent::Emoji { room_id, emoji } => handle_emoji(state, sender_id, room_id, emoji).await,
    }
}

/// Persist a chat message, then fan it out. A failed save aborts the whole
/// flow so no client ever sees a message the history does not have.
async fn handle_chat_message(
    state: &RelayState,
    sender_id: &str,
    room_id: String,
    content: String,
    message_type: String,
    file_url: Option<String>,
) -> anyhow::Result<()> {
    let sender_name = state.users.display_name(sender_id).await;
    let saved = state
        .messages
        .save(NewChatMessage {
            room_id: room_id.clone(),
            sender_id: sender_id.to_string(),
            sender_name: sender_name.clone(),
            content,
            message_type,
            file_url,
            sent_at: Utc::now(),
        })
        .await?;

    // Room-list summary refresh is cosmetic; the message itself already
    // landed, so a failure here must not block delivery.
    if let Err(err) = state
        .rooms
        .update_last_message(&room_id, &saved.content, saved.sent_at, &saved.sender_name)
        .await
    {
        warn!(room_id, error = %err, "failed to update room last-message summary");
    }

    let outgoing = ServerEvent::Message {
        message_id: saved.id,
        room_id: saved.room_id.clone(),
        sender_id: saved.sender_id.clone(),
        sender_name: saved.sender_name.clone(),
        content: saved.content.clone(),
        message_type: saved.message_type.clone(),
        file_url: saved.file_url.clone(),
        sent_at: saved.sent_at,
    };
    state.broadcaster.broadcast(&room_id, &outgoing).await;

    state.notifier.dispatch(&saved).await;

    // Sending a message implies the sender stopped typing.
    if state.typing.set_typing(&room_id, sender_id, false).await {
        let stopped = ServerEvent::Typing {
            user_id: sender_id.to_string(),
            username: sender_name,
            is_typing: false,
        };
        state.broadcaster.broadcast(&room_id, &stopped).await;
    }

    Ok(())
}

async fn handle_join_room(
    state: &RelayState,
    sender_id: &str,
    room_id: String,
) -> anyhow::Result<()> {
    let username = state.users.display_name(sender_id).await;

    let joined = ServerEvent::System {
        content: format!("{username} joined the room"),
        sent_at: Utc::now(),
    };
    state.broadcaster.broadcast(&room_id, &joined).await;

    let participants = state.rooms.resolve_participants(&room_id).await;
    let roster = ServerEvent::Participants { room_id: room_id.clone(), participants };
    state.broadcaster.broadcast(&room_id, &roster).await;

    Ok(())
}

async fn handle_typing(
    state: &RelayState,
    sender_id: &str,
    room_id: String,
    is_typing: bool,
) -> anyhow::Result<()> {
    if !state.typing.set_typing(&room_id, sender_id, is_typing).await {
        return Ok(());
    }

    let username = state.users.display_name(sender_id).await;
    let event = ServerEvent::Typing { user_id: sender_id.to_string(), username, is_typing };
    state.broadcaster.broadcast(&room_id, &event).await;

    Ok(())
}

async fn handle_read(state: &RelayState, reader_id: &str, room_id: String) -> anyhow::Result<()> {
    let unread = state.messages.find_unread(&room_id, reader_id).await?;
    let read_at = Utc::now();
    for message in &unread {
        state.messages.mark_read(message.id, read_at).await?;
    }

    let receipt = ServerEvent::Read { user_id: reader_id.to_string(), room_id: room_id.clone() };
    state.broadcaster.broadcast(&room_id, &receipt).await;

    Ok(())
}

/// Emoji reactions are fire-and-forget; they never touch the message store.
async fn handle_emoji(
    state: &RelayState,
    sender_id: &str,
    room_id: String,
    emoji: String,
) -> anyhow::Result<()> {
    let sender_name = state.users.display_name(sender_id).await;
    let event = ServerEvent::Emoji {
        sender_id: sender_id.to_string(),
        sender_name,
        emoji,
        sent_at: Utc::now(),
    };
    state.broadcaster.broadcast(&room_id, &event).await;

    Ok(())
}
