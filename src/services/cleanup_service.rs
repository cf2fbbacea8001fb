//! Background sweep closing idle rooms and reaping ghost players.

use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::{
    dto::ws::ServerMessage,
    error::ServiceError,
    services::{events, room_service},
    state::{
        SharedState,
        state_machine::GameState,
        trackers::{SweepAction, classify_idle},
    },
};

/// Spawn the periodic cleanup loop.
pub fn spawn_sweep(state: SharedState) -> JoinHandle<()> {
    let interval = state.config().sweep_interval;
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // The first tick fires immediately; skip it so a fresh server does
        // not sweep before anything happened.
        ticker.tick().await;
        loop {
            ticker.tick().await;
            run_sweep(&state).await;
        }
    })
}

/// One sweep pass over every tracked room and heartbeat.
///
/// A failure in one room's processing is logged and never stops the pass.
pub async fn run_sweep(state: &SharedState) {
    let mut closed_any = false;

    for (room_id, activity) in state.activity().entries() {
        let idle = activity.last_activity.elapsed();
        match sweep_room(state, &room_id, idle, activity.warning_issued).await {
            Ok(closed) => closed_any |= closed,
            Err(err) => warn!(room_id = %room_id, error = %err, "sweep failed for room"),
        }
    }

    closed_any |= reap_ghosts(state).await;

    if closed_any {
        room_service::refresh_lobby(state).await;
    }
}

/// Apply the inactivity policy to one room. Returns whether it was closed.
async fn sweep_room(
    state: &SharedState,
    room_id: &str,
    idle: std::time::Duration,
    warning_issued: bool,
) -> Result<bool, ServiceError> {
    let store = state.require_room_store().await?;
    let Some(room) = store.find_room(room_id).await? else {
        // Deleted through another path; stop tracking it.
        state.forget_room(room_id);
        return Ok(false);
    };

    let playing = room.game_state == GameState::Playing;
    match classify_idle(idle, playing, warning_issued, state.config()) {
        Some(SweepAction::Warn) => {
            let countdown = state.config().warning_countdown_secs;
            events::broadcast_to_room(
                state,
                room_id,
                &ServerMessage::RoomWarning {
                    message: format!(
                        "Room closing in {countdown} seconds due to inactivity"
                    ),
                    countdown,
                },
            );
            state.activity().mark_warned(room_id);
            debug!(room_id, idle_secs = idle.as_secs(), "inactivity warning sent");
            Ok(false)
        }
        Some(SweepAction::Close) => {
            events::broadcast_to_room(
                state,
                room_id,
                &ServerMessage::RoomClosed {
                    message: "Room closed due to inactivity".into(),
                    reason: "inactivity".into(),
                },
            );
            store.delete_room(room_id).await?;
            for player_id in room.players.keys() {
                state.heartbeats().forget(player_id);
            }
            state.forget_room(room_id);
            info!(room_id, idle_secs = idle.as_secs(), "idle room closed");
            Ok(true)
        }
        None => Ok(false),
    }
}

/// Remove lobby players whose heartbeat went silent.
///
/// Players in a running or finished game are kept: mid-game removal would be
/// worse than a stale seat, so they are only logged.
async fn reap_ghosts(state: &SharedState) -> bool {
    let mut removed_any = false;

    for (player_id, heartbeat) in state.heartbeats().expired(state.config().heartbeat_timeout) {
        let room = match state.room_store().await {
            Some(store) => store.find_room(&heartbeat.room_id).await,
            None => return removed_any,
        };
        let room = match room {
            Ok(Some(room)) => room,
            Ok(None) => {
                state.heartbeats().forget(&player_id);
                continue;
            }
            Err(err) => {
                warn!(player_id = %player_id, error = %err, "ghost check failed");
                continue;
            }
        };

        if room.game_state != GameState::Lobby {
            debug!(
                player_id = %player_id,
                room_id = %room.id,
                "silent player kept, game in progress"
            );
            continue;
        }

        info!(player_id = %player_id, room_id = %room.id, "reaping ghost player");
        match room_service::leave_room(state, &player_id).await {
            Ok(Some(_)) => removed_any = true,
            Ok(None) => {}
            Err(err) => warn!(player_id = %player_id, error = %err, "ghost removal failed"),
        }
    }

    removed_any
}

#[cfg(test)]
mod tests {
    use std::{sync::Arc, time::Duration};

    use super::*;
    use crate::{
        config::AppConfig,
        dao::room_store::memory::MemoryRoomStore,
        services::room_service,
        state::AppState,
    };

    fn fast_config() -> AppConfig {
        AppConfig {
            lobby_inactivity: Duration::ZERO,
            warning_after: Duration::ZERO,
            heartbeat_timeout: Duration::ZERO,
            ..AppConfig::default()
        }
    }

    #[tokio::test]
    async fn sweep_closes_idle_rooms_and_drops_tracking() {
        let state = AppState::new(fast_config());
        state
            .install_room_store(Arc::new(MemoryRoomStore::new()))
            .await;
        room_service::create_room(&state, "ABC123", "p1", "Alice", None)
            .await
            .unwrap();
        state.activity().mark_warned("ABC123");

        run_sweep(&state).await;

        let store = state.room_store().await.unwrap();
        assert!(store.find_room("ABC123").await.unwrap().is_none());
        assert!(state.activity().entries().is_empty());
    }

    #[tokio::test]
    async fn ghosts_reaped_in_lobby_but_kept_mid_game() {
        let state = AppState::new(fast_config());
        state
            .install_room_store(Arc::new(MemoryRoomStore::new()))
            .await;
        room_service::create_room(&state, "PLAY01", "p1", "Alice", None)
            .await
            .unwrap();
        room_service::join_room(&state, "PLAY01", "p2", "Bob", false)
            .await
            .unwrap();
        state
            .with_room("PLAY01", |room| {
                room.game_state = GameState::Playing;
                Ok(())
            })
            .await
            .unwrap();

        assert!(!reap_ghosts(&state).await);
        let store = state.room_store().await.unwrap();
        assert_eq!(
            store.find_room("PLAY01").await.unwrap().unwrap().players.len(),
            2
        );

        state
            .with_room("PLAY01", |room| {
                room.game_state = GameState::Lobby;
                Ok(())
            })
            .await
            .unwrap();
        state.heartbeats().beat("p2", "PLAY01");
        tokio::time::sleep(Duration::from_millis(5)).await;

        assert!(reap_ghosts(&state).await);
    }
}
