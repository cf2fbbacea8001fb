use serde::Serialize;
use tracing::warn;

use crate::{
    dto::{
        room::{AvailableRoom, RoomSnapshot},
        sse::{AvailableRoomsEvent, ServerEvent, SystemStatus},
        ws::ServerMessage,
    },
    services::websocket_service::send_message_to_websocket,
    state::{SharedState, room::Room},
};

const EVENT_AVAILABLE_ROOMS: &str = "rooms.available";
const EVENT_SYSTEM_STATUS: &str = "system.status";

/// Push a server message to every connection attached to a room.
pub fn broadcast_to_room(state: &SharedState, room_id: &str, message: &ServerMessage) {
    for session in state.sessions_in_room(room_id) {
        send_message_to_websocket(&session.tx, message);
    }
}

/// Push a server message to every room connection except `skip_player`.
pub fn broadcast_to_others(
    state: &SharedState,
    room_id: &str,
    skip_player: &str,
    message: &ServerMessage,
) {
    for session in state.sessions_in_room(room_id) {
        if session.player_id != skip_player {
            send_message_to_websocket(&session.tx, message);
        }
    }
}

/// Broadcast the authoritative snapshot of a room after a mutation.
pub fn broadcast_room_update(state: &SharedState, room: &Room) {
    broadcast_to_room(
        state,
        &room.id,
        &ServerMessage::RoomUpdate {
            room: RoomSnapshot::from(room),
        },
    );
}

/// Broadcast the available-rooms projection on the lobby SSE stream.
pub fn broadcast_available_rooms(state: &SharedState, rooms: Vec<AvailableRoom>) {
    let payload = AvailableRoomsEvent { rooms };
    send_lobby_event(state, EVENT_AVAILABLE_ROOMS, &payload);
}

/// Broadcast a degraded-mode flip on the lobby SSE stream.
pub fn broadcast_system_status(state: &SharedState, degraded: bool) {
    send_lobby_event(state, EVENT_SYSTEM_STATUS, &SystemStatus { degraded });
}

fn send_lobby_event<T>(state: &SharedState, event: &str, payload: &T)
where
    T: Serialize,
{
    match ServerEvent::json(event.to_string(), payload) {
        Ok(event) => state.lobby_sse().broadcast(event),
        Err(err) => warn!(event, error = %err, "failed to serialize SSE event"),
    }
}
