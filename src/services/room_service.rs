use tracing::{info, warn};

use crate::{
    dto::{
        room::AvailableRoom,
        validation::{normalize_room_code, validate_player_name, validate_room_code},
        ws::ServerMessage,
    },
    error::ServiceError,
    services::events,
    state::{
        SharedState,
        room::{Player, Room},
        state_machine::{GameMode, GameState},
    },
};

/// What happened when a player left their room.
#[derive(Debug)]
pub struct LeaveOutcome {
    /// Room the player was removed from.
    pub room_id: String,
    /// Whether the departing player held host privileges.
    pub was_host: bool,
    /// Whether the room was deleted as a consequence.
    pub room_deleted: bool,
}

/// Create a room under the given code and seat the caller as host.
///
/// The code is case-normalized before storage; an existing room under the
/// same code is a conflict, never silently reused.
pub async fn create_room(
    state: &SharedState,
    room_id: &str,
    player_id: &str,
    name: &str,
    target_score: Option<i64>,
) -> Result<Room, ServiceError> {
    validate_room_code(room_id).map_err(invalid)?;
    validate_player_name(name).map_err(invalid)?;
    let room_id = normalize_room_code(room_id);

    let store = state.require_room_store().await?;
    let lock = state.room_lock(&room_id);
    let _guard = lock.lock().await;

    if store.find_room(&room_id).await?.is_some() {
        return Err(ServiceError::Conflict(format!(
            "room {room_id} already exists"
        )));
    }

    let target = crate::config::AppConfig::normalize_target_score(target_score);
    let mut room = Room::new(room_id.clone(), target);
    room.players.insert(
        player_id.to_string(),
        Player::new(player_id.to_string(), name.trim().to_string(), true),
    );
    store.save_room(room.clone()).await?;

    state.activity().touch(&room_id);
    state.heartbeats().beat(player_id, &room_id);
    info!(room_id = %room_id, player_id, "room created");

    Ok(room)
}

/// Join an existing room, or reconnect to one the player already belongs to.
///
/// Joining a room mid-game is rejected unless the player id is already seated
/// there, which is treated as a reconnection and succeeds in any state.
pub async fn join_room(
    state: &SharedState,
    room_id: &str,
    player_id: &str,
    name: &str,
    claims_host: bool,
) -> Result<Room, ServiceError> {
    validate_room_code(room_id).map_err(invalid)?;
    validate_player_name(name).map_err(invalid)?;
    let room_id = normalize_room_code(room_id);

    let (room, reconnected) = state
        .with_room(&room_id, |room| {
            if let Some(player) = room.players.get_mut(player_id) {
                player.name = name.trim().to_string();
                return Ok(true);
            }

            if room.game_state != GameState::Lobby {
                return Err(ServiceError::Conflict(
                    "game already in progress".to_string(),
                ));
            }
            if room.is_full() {
                return Err(ServiceError::Conflict("room is full".to_string()));
            }

            // The host flag is only honored when the seat is actually vacant.
            let is_host = claims_host && room.host().is_none();
            room.players.insert(
                player_id.to_string(),
                Player::new(player_id.to_string(), name.trim().to_string(), is_host),
            );
            Ok(false)
        })
        .await?;

    state.heartbeats().beat(player_id, &room_id);
    if reconnected {
        info!(room_id = %room_id, player_id, "player reconnected");
    } else {
        info!(room_id = %room_id, player_id, "player joined");
    }

    Ok(room)
}

/// Remove a player from whichever room they are seated in.
///
/// Host departure broadcasts `host-left` and tears the room down; a room left
/// empty is deleted as well. Returns `None` when the player is in no room.
pub async fn leave_room(
    state: &SharedState,
    player_id: &str,
) -> Result<Option<LeaveOutcome>, ServiceError> {
    let store = state.require_room_store().await?;
    let Some(located) = store.find_room_by_player(player_id).await? else {
        state.heartbeats().forget(player_id);
        return Ok(None);
    };
    let room_id = located.id.clone();

    let lock = state.room_lock(&room_id);
    let _guard = lock.lock().await;

    let Some(mut room) = store.find_room(&room_id).await? else {
        state.heartbeats().forget(player_id);
        return Ok(None);
    };

    let was_host = room.is_host(player_id);
    room.players.shift_remove(player_id);
    state.heartbeats().forget(player_id);

    let room_deleted = was_host || room.players.is_empty();
    if room_deleted {
        if was_host {
            events::broadcast_to_room(state, &room_id, &ServerMessage::HostLeft);
        }
        store.delete_room(&room_id).await?;
        drop(_guard);
        state.forget_room(&room_id);
        info!(room_id = %room_id, player_id, was_host, "room deleted on departure");
    } else {
        // A cooperative game cannot continue with a single player.
        if room.game_mode == Some(GameMode::Cooperation)
            && room.game_state == GameState::Playing
            && room.players.len() < 2
        {
            room.game_state = GameState::Finished;
            room.cooperation_waiting = Some(false);
            room.current_challenge_id = None;
            room.current_category = None;
            state.timers().cancel(&room_id);
        }
        room.last_activity = std::time::SystemTime::now();
        state.activity().touch(&room_id);
        store.save_room(room.clone()).await?;
        events::broadcast_room_update(state, &room);
        info!(room_id = %room_id, player_id, "player left");
    }

    Ok(Some(LeaveOutcome {
        room_id,
        was_host,
        room_deleted,
    }))
}

/// Read-only projection of rooms a newcomer could join right now.
pub async fn available_rooms(state: &SharedState) -> Result<Vec<AvailableRoom>, ServiceError> {
    let store = state.require_room_store().await?;
    let rooms = store.list_rooms().await?;
    Ok(rooms
        .iter()
        .filter(|room| {
            room.game_state == GameState::Lobby && !room.players.is_empty() && !room.is_full()
        })
        .map(AvailableRoom::from)
        .collect())
}

/// Recompute the available-rooms projection and push it on the lobby stream.
///
/// Failures are logged; discovery staleness must never fail the action that
/// triggered the refresh.
pub async fn refresh_lobby(state: &SharedState) {
    match available_rooms(state).await {
        Ok(rooms) => events::broadcast_available_rooms(state, rooms),
        Err(err) => warn!(error = %err, "failed to refresh available rooms"),
    }
}

fn invalid(err: validator::ValidationError) -> ServiceError {
    ServiceError::InvalidInput(
        err.message
            .as_deref()
            .unwrap_or("invalid input")
            .to_string(),
    )
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::{config::AppConfig, dao::room_store::memory::MemoryRoomStore, state::AppState};

    async fn test_state() -> SharedState {
        let state = AppState::new(AppConfig::default());
        state
            .install_room_store(Arc::new(MemoryRoomStore::new()))
            .await;
        state
    }

    #[tokio::test]
    async fn create_then_join_round_trip() {
        let state = test_state().await;
        let room = create_room(&state, "abc123", "p1", "Alice", Some(250))
            .await
            .unwrap();
        assert_eq!(room.id, "ABC123");
        assert_eq!(room.target_score, 250);
        assert!(room.is_host("p1"));

        let room = join_room(&state, "ABC123", "p2", "Bob", false)
            .await
            .unwrap();
        assert_eq!(room.players.len(), 2);
        assert!(!room.is_host("p2"));
    }

    #[tokio::test]
    async fn duplicate_code_is_a_conflict() {
        let state = test_state().await;
        create_room(&state, "ABC123", "p1", "Alice", None)
            .await
            .unwrap();
        let err = create_room(&state, "abc123", "p2", "Bob", None)
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Conflict(_)));
    }

    #[tokio::test]
    async fn join_rejected_mid_game_except_for_reconnection() {
        let state = test_state().await;
        create_room(&state, "ABC123", "p1", "Alice", None)
            .await
            .unwrap();
        join_room(&state, "ABC123", "p2", "Bob", false)
            .await
            .unwrap();
        state
            .with_room("ABC123", |room| {
                room.game_state = GameState::Playing;
                Ok(())
            })
            .await
            .unwrap();

        let err = join_room(&state, "ABC123", "p3", "Mallory", false)
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Conflict(_)));

        // An already-seated player can rejoin while the game runs.
        let room = join_room(&state, "ABC123", "p2", "Bob", false)
            .await
            .unwrap();
        assert_eq!(room.players.len(), 2);
    }

    #[tokio::test]
    async fn host_departure_deletes_the_room() {
        let state = test_state().await;
        create_room(&state, "ABC123", "p1", "Alice", None)
            .await
            .unwrap();
        join_room(&state, "ABC123", "p2", "Bob", false)
            .await
            .unwrap();

        let outcome = leave_room(&state, "p1").await.unwrap().unwrap();
        assert!(outcome.was_host);
        assert!(outcome.room_deleted);

        let store = state.room_store().await.unwrap();
        assert!(store.find_room("ABC123").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn available_rooms_lists_joinable_lobbies_only() {
        let state = test_state().await;
        create_room(&state, "OPEN01", "p1", "Alice", None)
            .await
            .unwrap();
        create_room(&state, "BUSY01", "p2", "Bob", None)
            .await
            .unwrap();
        state
            .with_room("BUSY01", |room| {
                room.game_state = GameState::Playing;
                Ok(())
            })
            .await
            .unwrap();

        let rooms = available_rooms(&state).await.unwrap();
        assert_eq!(rooms.len(), 1);
        assert_eq!(rooms[0].id, "OPEN01");
    }
}
