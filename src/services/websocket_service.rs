use axum::extract::ws::{Message, WebSocket};
use futures::{SinkExt, StreamExt};
use serde::Serialize;
use tokio::{sync::mpsc, task::JoinHandle};
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    dto::{
        room::RoomSnapshot,
        ws::{ClientMessage, ServerMessage},
    },
    error::ServiceError,
    services::{events, game_service, room_service, turn_service},
    state::{Session, SharedState, room::Room},
};

/// Handle the full lifecycle of one client WebSocket connection.
///
/// The connection earns a session by creating or joining a room; until then
/// only discovery messages are served. How the connection ends decides the
/// teardown: a clean client close leaves the room immediately, a transport
/// drop leaves the seat to the heartbeat machinery.
pub async fn handle_socket(state: SharedState, socket: WebSocket) {
    let conn_id = Uuid::new_v4();
    let (mut sender, mut receiver) = socket.split();
    let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<Message>();

    // Dedicated writer task keeps outbound messages flowing even while we await inbound frames.
    let writer_task = tokio::spawn(async move {
        while let Some(message) = outbound_rx.recv().await {
            if sender.send(message).await.is_err() {
                break;
            }
        }
    });

    info!(conn_id = %conn_id, "websocket connected");
    let mut clean_close = false;

    while let Some(message) = receiver.next().await {
        match message {
            Ok(Message::Text(text)) => match ClientMessage::from_json_str(&text) {
                Ok(msg) => {
                    let request = msg.name();
                    if let Err(err) = dispatch(&state, conn_id, &outbound_tx, msg).await {
                        warn!(conn_id = %conn_id, request, error = %err, "request failed");
                        send_message_to_websocket(
                            &outbound_tx,
                            &ServerMessage::Error {
                                message: err.to_string(),
                                status: err.status(),
                            },
                        );
                    }
                }
                Err(err) => {
                    warn!(conn_id = %conn_id, error = %err, "unparseable message");
                    send_message_to_websocket(
                        &outbound_tx,
                        &ServerMessage::Error {
                            message: "malformed message".into(),
                            status: 400,
                        },
                    );
                }
            },
            Ok(Message::Ping(payload)) => {
                let _ = outbound_tx.send(Message::Pong(payload));
            }
            Ok(Message::Close(frame)) => {
                clean_close = true;
                let _ = outbound_tx.send(Message::Close(frame));
                break;
            }
            Ok(Message::Binary(_)) => {}
            Ok(Message::Pong(_)) => {}
            Err(err) => {
                warn!(conn_id = %conn_id, error = %err, "websocket error");
                break;
            }
        }
    }

    teardown(&state, conn_id, clean_close).await;
    finalize(writer_task, outbound_tx).await;
}

/// Route one parsed client message to its service.
async fn dispatch(
    state: &SharedState,
    conn_id: Uuid,
    tx: &mpsc::UnboundedSender<Message>,
    msg: ClientMessage,
) -> Result<(), ServiceError> {
    let request = msg.name();

    match msg {
        ClientMessage::CreateRoom {
            room_id,
            player_id,
            name,
            target_score,
        } => {
            ensure_no_session(state, conn_id)?;
            let room =
                room_service::create_room(state, &room_id, &player_id, &name, target_score).await?;
            open_session(state, conn_id, tx, &room.id, &player_id);
            ack(tx, request, Some(&room));
            room_service::refresh_lobby(state).await;
        }
        ClientMessage::JoinRoom {
            room_id,
            player_id,
            name,
            is_host,
        } => {
            ensure_no_session(state, conn_id)?;
            let room =
                room_service::join_room(state, &room_id, &player_id, &name, is_host).await?;
            open_session(state, conn_id, tx, &room.id, &player_id);
            ack(tx, request, Some(&room));
            events::broadcast_room_update(state, &room);
            room_service::refresh_lobby(state).await;
        }
        ClientMessage::GetAvailableRooms => {
            let rooms = room_service::available_rooms(state).await?;
            send_message_to_websocket(tx, &ServerMessage::AvailableRooms { rooms });
        }
        ClientMessage::UpdateLanguage { language } => {
            let (room_id, player_id) = require_session(state, conn_id)?;
            let room =
                game_service::update_language(state, &room_id, &player_id, &language).await?;
            ack(tx, request, Some(&room));
            events::broadcast_room_update(state, &room);
        }
        ClientMessage::UpdateHostLanguage { language } => {
            let (room_id, player_id) = require_session(state, conn_id)?;
            let room =
                game_service::update_host_language(state, &room_id, &player_id, &language).await?;
            ack(tx, request, Some(&room));
            events::broadcast_room_update(state, &room);
            room_service::refresh_lobby(state).await;
        }
        ClientMessage::ToggleReady => {
            let (room_id, player_id) = require_session(state, conn_id)?;
            let room = game_service::toggle_ready(state, &room_id, &player_id).await?;
            ack(tx, request, Some(&room));
            events::broadcast_room_update(state, &room);
        }
        ClientMessage::UpdateGameMode { game_mode } => {
            let (room_id, player_id) = require_session(state, conn_id)?;
            let room =
                game_service::update_game_mode(state, &room_id, &player_id, game_mode).await?;
            ack(tx, request, Some(&room));
            events::broadcast_room_update(state, &room);
            room_service::refresh_lobby(state).await;
        }
        ClientMessage::ChangeGameMode => {
            let (room_id, player_id) = require_session(state, conn_id)?;
            let room = game_service::change_game_mode(state, &room_id, &player_id).await?;
            ack(tx, request, Some(&room));
            events::broadcast_to_room(
                state,
                &room_id,
                &ServerMessage::GameModeChanged {
                    message: "The host is choosing a new game mode".into(),
                },
            );
            events::broadcast_room_update(state, &room);
            room_service::refresh_lobby(state).await;
        }
        ClientMessage::UpdateTargetScore { target_score } => {
            let (room_id, player_id) = require_session(state, conn_id)?;
            let room =
                game_service::update_target_score(state, &room_id, &player_id, target_score)
                    .await?;
            ack(tx, request, Some(&room));
            events::broadcast_room_update(state, &room);
            room_service::refresh_lobby(state).await;
        }
        ClientMessage::StartGame => {
            let (room_id, player_id) = require_session(state, conn_id)?;
            let room = game_service::start_game(state, &room_id, &player_id).await?;
            ack(tx, request, Some(&room));
            events::broadcast_room_update(state, &room);
            room_service::refresh_lobby(state).await;
        }
        ClientMessage::Answer {
            is_correct,
            time_left,
        } => {
            let (room_id, player_id) = require_session(state, conn_id)?;
            let (room, _outcome) =
                game_service::submit_answer(state, &room_id, &player_id, is_correct, time_left)
                    .await?;
            ack(tx, request, Some(&room));
            events::broadcast_room_update(state, &room);
        }
        ClientMessage::PracticeFirstAnswer => {
            let (room_id, _) = require_session(state, conn_id)?;
            game_service::practice_first_answer(state, &room_id).await?;
            ack(tx, request, None);
        }
        ClientMessage::PracticeTimeout => {
            let (room_id, _) = require_session(state, conn_id)?;
            game_service::finish_practice(state, &room_id).await?;
        }
        ClientMessage::CooperationAnswer {
            challenge_id,
            answer,
            word_id,
            is_correct,
            remaining_time: _,
        } => {
            let (room_id, player_id) = require_session(state, conn_id)?;
            let room = turn_service::resolve_answer(
                state,
                &room_id,
                &player_id,
                challenge_id,
                &answer,
                &word_id,
                is_correct,
            )
            .await?;
            ack(tx, request, Some(&room));
        }
        ClientMessage::CooperationTimeout { challenge_id } => {
            let (room_id, _) = require_session(state, conn_id)?;
            turn_service::resolve_timeout(state, &room_id, challenge_id).await?;
        }
        ClientMessage::DonateTime { amount } => {
            let (room_id, player_id) = require_session(state, conn_id)?;
            let room = turn_service::donate_time(state, &room_id, &player_id, amount).await?;
            ack(tx, request, Some(&room));
        }
        ClientMessage::CooperationTyping { text } => {
            let (room_id, player_id) = require_session(state, conn_id)?;
            turn_service::relay_typing(state, &room_id, &player_id, &text);
        }
        ClientMessage::ActivityPing => {
            let (room_id, player_id) = require_session(state, conn_id)?;
            state.with_room(&room_id, |_| Ok(())).await?;
            state.heartbeats().beat(&player_id, &room_id);
        }
        ClientMessage::LeaveRoom => {
            let (_, player_id) = require_session(state, conn_id)?;
            state.sessions().remove(&conn_id);
            room_service::leave_room(state, &player_id).await?;
            ack(tx, request, None);
            room_service::refresh_lobby(state).await;
        }
        ClientMessage::Restart => {
            let (room_id, player_id) = require_session(state, conn_id)?;
            let room = game_service::restart(state, &room_id, &player_id).await?;
            ack(tx, request, Some(&room));
            events::broadcast_room_update(state, &room);
            room_service::refresh_lobby(state).await;
        }
    }

    // Any successfully handled room-scoped message doubles as a heartbeat.
    if let Some(session) = state.sessions().get(&conn_id) {
        state
            .heartbeats()
            .beat(&session.player_id, &session.room_id);
    }

    Ok(())
}

/// Tear the connection's session down according to how the socket ended.
async fn teardown(state: &SharedState, conn_id: Uuid, clean_close: bool) {
    let Some((_, session)) = state.sessions().remove(&conn_id) else {
        info!(conn_id = %conn_id, "websocket disconnected");
        return;
    };

    if clean_close {
        info!(
            conn_id = %conn_id,
            player_id = %session.player_id,
            "clean close, leaving room"
        );
        if let Err(err) = room_service::leave_room(state, &session.player_id).await {
            warn!(player_id = %session.player_id, error = %err, "leave on close failed");
        }
        room_service::refresh_lobby(state).await;
    } else {
        // Transport drop: keep the seat, the player may reconnect before the
        // heartbeat threshold reaps them.
        info!(
            conn_id = %conn_id,
            player_id = %session.player_id,
            "transport dropped, seat kept for reconnection"
        );
    }
}

fn open_session(
    state: &SharedState,
    conn_id: Uuid,
    tx: &mpsc::UnboundedSender<Message>,
    room_id: &str,
    player_id: &str,
) {
    state.sessions().insert(
        conn_id,
        Session {
            room_id: room_id.to_string(),
            player_id: player_id.to_string(),
            tx: tx.clone(),
        },
    );
}

fn require_session(state: &SharedState, conn_id: Uuid) -> Result<(String, String), ServiceError> {
    state
        .sessions()
        .get(&conn_id)
        .map(|session| (session.room_id.clone(), session.player_id.clone()))
        .ok_or_else(|| ServiceError::Forbidden("join a room first".into()))
}

fn ensure_no_session(state: &SharedState, conn_id: Uuid) -> Result<(), ServiceError> {
    if state.sessions().contains_key(&conn_id) {
        return Err(ServiceError::Conflict("already in a room".into()));
    }
    Ok(())
}

fn ack(tx: &mpsc::UnboundedSender<Message>, request: &str, room: Option<&Room>) {
    send_message_to_websocket(
        tx,
        &ServerMessage::Ack {
            request: request.to_string(),
            room: room.map(RoomSnapshot::from),
        },
    );
}

/// Serialize a payload and push it onto the provided WebSocket sender.
///
/// A serialization failure is a bug and is only logged; a closed writer means
/// the connection is on its way out and the frame is silently dropped.
pub fn send_message_to_websocket<T>(tx: &mpsc::UnboundedSender<Message>, value: &T)
where
    T: ?Sized + Serialize,
{
    match serde_json::to_string(value) {
        Ok(payload) => {
            let _ = tx.send(Message::Text(payload.into()));
        }
        Err(err) => warn!(error = %err, "failed to serialize outbound message"),
    }
}

/// Ensure the writer task winds down before we return from the socket handler.
async fn finalize(writer_task: JoinHandle<()>, outbound_tx: mpsc::UnboundedSender<Message>) {
    drop(outbound_tx);
    let _ = writer_task.await;
}
