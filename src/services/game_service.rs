use std::sync::{Arc, atomic::AtomicI64};

use rand::seq::IndexedRandom;
use tokio::time::{Duration, sleep};
use tracing::{info, warn};

use crate::{
    error::ServiceError,
    services::{events, turn_service},
    state::{
        SharedState,
        room::{AnswerOutcome, COOPERATION_PLAYERS, Room},
        state_machine::{GameMode, GameState, RoomEvent, next_state},
        timers::{RoomTimer, TimerKind},
    },
    dto::ws::ServerMessage,
};

/// Set the caller's practicing language.
///
/// Picking a first language does not count as readying up, so the ready flag
/// drops back when the player had no language before.
pub async fn update_language(
    state: &SharedState,
    room_id: &str,
    player_id: &str,
    language: &str,
) -> Result<Room, ServiceError> {
    let language = language.trim().to_lowercase();
    if language.is_empty() {
        return Err(ServiceError::InvalidInput("language must not be empty".into()));
    }

    let (room, _) = state
        .with_room(room_id, |room| {
            next_state(room.game_state, RoomEvent::LobbyUpdate)?;
            let player = room
                .players
                .get_mut(player_id)
                .ok_or_else(|| ServiceError::NotFound(format!("player {player_id} not in room")))?;
            if player.language.is_none() {
                player.ready = false;
            }
            player.language = Some(language);
            Ok(())
        })
        .await?;
    Ok(room)
}

/// Set the shared competition language. Host only.
pub async fn update_host_language(
    state: &SharedState,
    room_id: &str,
    player_id: &str,
    language: &str,
) -> Result<Room, ServiceError> {
    let language = language.trim().to_lowercase();
    if language.is_empty() {
        return Err(ServiceError::InvalidInput("language must not be empty".into()));
    }

    let (room, _) = state
        .with_room(room_id, |room| {
            next_state(room.game_state, RoomEvent::LobbyUpdate)?;
            require_host(room, player_id)?;
            room.host_language = Some(language);
            Ok(())
        })
        .await?;
    Ok(room)
}

/// Select the game mode. Host only, lobby only.
pub async fn update_game_mode(
    state: &SharedState,
    room_id: &str,
    player_id: &str,
    mode: GameMode,
) -> Result<Room, ServiceError> {
    let (room, _) = state
        .with_room(room_id, |room| {
            next_state(room.game_state, RoomEvent::Configure)?;
            require_host(room, player_id)?;

            if mode == GameMode::Cooperation && room.players.len() > COOPERATION_PLAYERS {
                return Err(ServiceError::Conflict(format!(
                    "cooperation mode seats exactly {COOPERATION_PLAYERS} players"
                )));
            }

            room.game_mode = Some(mode);
            if mode == GameMode::Cooperation {
                room.seed_cooperation();
            } else {
                room.cooperation_lives = None;
                room.cooperation_score = None;
                room.used_words = None;
                room.current_category = None;
                room.current_challenge_id = None;
                room.current_challenge_player = None;
                room.cooperation_waiting = None;
            }
            Ok(())
        })
        .await?;
    Ok(room)
}

/// Reset the mode selection and send everyone back to configuration. Host only.
pub async fn change_game_mode(
    state: &SharedState,
    room_id: &str,
    player_id: &str,
) -> Result<Room, ServiceError> {
    let (room, _) = state
        .with_room(room_id, |room| {
            next_state(room.game_state, RoomEvent::Configure)?;
            require_host(room, player_id)?;
            room.clear_mode();
            Ok(())
        })
        .await?;
    Ok(room)
}

/// Set the target score, clamped onto the allowed set. Host only, lobby only.
pub async fn update_target_score(
    state: &SharedState,
    room_id: &str,
    player_id: &str,
    target_score: i64,
) -> Result<Room, ServiceError> {
    let (room, _) = state
        .with_room(room_id, |room| {
            next_state(room.game_state, RoomEvent::Configure)?;
            require_host(room, player_id)?;
            room.target_score = crate::config::AppConfig::normalize_target_score(Some(target_score));
            Ok(())
        })
        .await?;
    Ok(room)
}

/// Toggle the caller's readiness.
///
/// Readying up requires a selected mode and the language the mode depends on:
/// the player's own in practice and cooperation, the host's in competition.
pub async fn toggle_ready(
    state: &SharedState,
    room_id: &str,
    player_id: &str,
) -> Result<Room, ServiceError> {
    let (room, _) = state
        .with_room(room_id, |room| {
            next_state(room.game_state, RoomEvent::LobbyUpdate)?;
            let mode = room
                .game_mode
                .ok_or_else(|| ServiceError::Conflict("no game mode selected".into()))?;

            let language_ok = match mode {
                GameMode::Competition => room.host_language.is_some(),
                GameMode::Practice | GameMode::Cooperation => room
                    .players
                    .get(player_id)
                    .is_some_and(|p| p.language.is_some()),
            };
            if !language_ok {
                return Err(ServiceError::Conflict(
                    "a language must be selected before readying up".into(),
                ));
            }

            let player = room
                .players
                .get_mut(player_id)
                .ok_or_else(|| ServiceError::NotFound(format!("player {player_id} not in room")))?;
            player.ready = !player.ready;
            Ok(())
        })
        .await?;
    Ok(room)
}

/// Start the game. Host only, every mode-specific precondition enforced.
pub async fn start_game(
    state: &SharedState,
    room_id: &str,
    player_id: &str,
) -> Result<Room, ServiceError> {
    let (room, _) = state
        .with_room(room_id, |room| {
            require_host(room, player_id)?;
            let mode = room
                .game_mode
                .ok_or_else(|| ServiceError::Conflict("no game mode selected".into()))?;

            if !room.players.values().all(|p| p.ready) {
                return Err(ServiceError::Conflict("not all players are ready".into()));
            }
            match mode {
                GameMode::Practice | GameMode::Cooperation => {
                    if room.players.values().any(|p| p.language.is_none()) {
                        return Err(ServiceError::Conflict(
                            "every player must select a language".into(),
                        ));
                    }
                }
                GameMode::Competition => {
                    if room.host_language.is_none() {
                        return Err(ServiceError::Conflict(
                            "the host must select a language".into(),
                        ));
                    }
                }
            }
            if mode == GameMode::Cooperation && room.players.len() != COOPERATION_PLAYERS {
                return Err(ServiceError::Conflict(format!(
                    "cooperation mode needs exactly {COOPERATION_PLAYERS} players"
                )));
            }

            room.game_state = next_state(room.game_state, RoomEvent::StartGame)?;
            room.question_count = 0;
            if mode == GameMode::Cooperation {
                room.cooperation_waiting = Some(true);
                let first = {
                    let ids: Vec<&String> = room.players.keys().collect();
                    ids.choose(&mut rand::rng()).map(|id| (*id).clone())
                };
                room.current_challenge_player = first;
            }
            Ok(mode)
        })
        .await
        .map(|(room, mode)| {
            if mode == GameMode::Cooperation {
                events::broadcast_to_room(
                    state,
                    &room.id,
                    &ServerMessage::CooperationWaiting { is_waiting: true },
                );
                turn_service::schedule_challenge(
                    state.clone(),
                    room.id.clone(),
                    state.config().first_challenge_delay,
                );
            }
            (room, mode)
        })?;

    info!(room_id, "game started");
    Ok(room)
}

/// Apply a practice or competition answer.
///
/// A finished room absorbs late answers without touching the recorded winner;
/// the caller gets the room back with no outcome.
pub async fn submit_answer(
    state: &SharedState,
    room_id: &str,
    player_id: &str,
    is_correct: bool,
    time_left: i64,
) -> Result<(Room, Option<AnswerOutcome>), ServiceError> {
    let (room, outcome) = state
        .with_room(room_id, |room| {
            if room.game_mode == Some(GameMode::Cooperation) {
                return Err(ServiceError::Conflict(
                    "use cooperation-answer in cooperation mode".into(),
                ));
            }
            if room.game_state == GameState::Lobby {
                next_state(room.game_state, RoomEvent::Answer)?;
            }
            if room.game_state == GameState::Playing {
                room.question_count += 1;
            }
            Ok(room.apply_answer(player_id, is_correct, time_left))
        })
        .await?;

    if outcome.as_ref().is_some_and(|o| o.won) {
        state.timers().cancel(room_id);
        info!(room_id, player_id, "target score reached");
    }

    Ok((room, outcome))
}

/// Start the shared practice clock on the first answered question.
///
/// Idempotent: once a timer is registered for the room every further
/// first-answer event is a no-op.
pub async fn practice_first_answer(state: &SharedState, room_id: &str) -> Result<(), ServiceError> {
    let (room, _) = state
        .with_room(room_id, |room| {
            if room.game_mode != Some(GameMode::Practice) {
                return Err(ServiceError::Conflict("not a practice room".into()));
            }
            if room.game_state != GameState::Playing {
                return Err(ServiceError::Conflict("game is not running".into()));
            }
            Ok(())
        })
        .await?;

    if state.timers().is_running(&room.id) {
        return Ok(());
    }
    start_practice_clock(state.clone(), room.id);
    Ok(())
}

/// Resolve the practice clock running out, from the server task or from a
/// client-reported expiry. Idempotent against a room that already finished.
pub async fn finish_practice(state: &SharedState, room_id: &str) -> Result<(), ServiceError> {
    let (room, finished_now) = state
        .with_room(room_id, |room| {
            if room.game_mode != Some(GameMode::Practice)
                || room.game_state != GameState::Playing
            {
                return Ok(false);
            }
            room.game_state = next_state(room.game_state, RoomEvent::FinishGame)?;
            Ok(true)
        })
        .await?;

    if finished_now {
        state.timers().cancel(room_id);
        events::broadcast_to_room(state, room_id, &ServerMessage::PracticeTimeout);
        events::broadcast_room_update(state, &room);
        info!(room_id, "practice session over");
    }
    Ok(())
}

/// Reset the room to a fresh lobby. Host only, allowed mid-game.
pub async fn restart(
    state: &SharedState,
    room_id: &str,
    player_id: &str,
) -> Result<Room, ServiceError> {
    // Cancel before mutating so no countdown fires against the reset room.
    state.timers().cancel(room_id);

    let (room, _) = state
        .with_room(room_id, |room| {
            require_host(room, player_id)?;
            room.game_state = next_state(room.game_state, RoomEvent::Restart)?;
            room.reset_for_restart();
            Ok(())
        })
        .await?;
    info!(room_id, "room restarted");
    Ok(room)
}

fn require_host(room: &Room, player_id: &str) -> Result<(), ServiceError> {
    if room.is_host(player_id) {
        Ok(())
    } else {
        Err(ServiceError::Forbidden(
            "only the host can perform this action".into(),
        ))
    }
}

/// Spawn the per-second practice countdown and register it for the room.
fn start_practice_clock(state: SharedState, room_id: String) {
    let remaining = Arc::new(AtomicI64::new(state.config().practice_duration_secs));
    let counter = remaining.clone();
    let task_state = state.clone();
    let task_room = room_id.clone();

    let handle = tokio::spawn(async move {
        loop {
            sleep(Duration::from_secs(1)).await;
            let left = counter.fetch_sub(1, std::sync::atomic::Ordering::SeqCst) - 1;
            if left <= 0 {
                break;
            }
            events::broadcast_to_room(
                &task_state,
                &task_room,
                &ServerMessage::PracticeTimerTick { time_left: left },
            );
        }

        task_state.timers().finish(&task_room, &counter);
        if let Err(err) = finish_practice(&task_state, &task_room).await {
            warn!(room_id = %task_room, error = %err, "practice clock resolution failed");
        }
    });

    state.timers().install(
        &room_id,
        RoomTimer {
            kind: TimerKind::Practice,
            remaining,
            handle,
        },
    );
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::{
        config::AppConfig,
        dao::room_store::memory::MemoryRoomStore,
        services::room_service,
        state::AppState,
    };

    async fn competition_state() -> SharedState {
        let state = AppState::new(AppConfig::default());
        state
            .install_room_store(Arc::new(MemoryRoomStore::new()))
            .await;
        room_service::create_room(&state, "ABC123", "p1", "Alice", Some(100))
            .await
            .unwrap();
        room_service::join_room(&state, "ABC123", "p2", "Bob", false)
            .await
            .unwrap();
        state
    }

    #[tokio::test]
    async fn start_requires_host_readiness_and_language() {
        let state = competition_state().await;

        let err = update_game_mode(&state, "ABC123", "p2", GameMode::Competition)
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Forbidden(_)));

        update_game_mode(&state, "ABC123", "p1", GameMode::Competition)
            .await
            .unwrap();

        // Competition readiness hinges on the shared host language.
        let err = toggle_ready(&state, "ABC123", "p1").await.unwrap_err();
        assert!(matches!(err, ServiceError::Conflict(_)));

        update_host_language(&state, "ABC123", "p1", "French").await.unwrap();
        toggle_ready(&state, "ABC123", "p1").await.unwrap();

        let err = start_game(&state, "ABC123", "p1").await.unwrap_err();
        assert!(matches!(err, ServiceError::Conflict(_)));

        toggle_ready(&state, "ABC123", "p2").await.unwrap();
        let room = start_game(&state, "ABC123", "p1").await.unwrap();
        assert_eq!(room.game_state, GameState::Playing);
        assert_eq!(room.host_language.as_deref(), Some("french"));
    }

    #[tokio::test]
    async fn competition_scoring_first_to_cross_wins() {
        let state = competition_state().await;
        update_game_mode(&state, "ABC123", "p1", GameMode::Competition)
            .await
            .unwrap();
        update_host_language(&state, "ABC123", "p1", "french").await.unwrap();
        toggle_ready(&state, "ABC123", "p1").await.unwrap();
        toggle_ready(&state, "ABC123", "p2").await.unwrap();
        start_game(&state, "ABC123", "p1").await.unwrap();

        state
            .with_room("ABC123", |room| {
                room.players.get_mut("p1").unwrap().score = 95;
                room.players.get_mut("p2").unwrap().score = 97;
                Ok(())
            })
            .await
            .unwrap();

        // Fast answer: max(1, 10 - 2) = 8 points, crossing the target.
        let (room, outcome) = submit_answer(&state, "ABC123", "p1", true, 2).await.unwrap();
        let outcome = outcome.unwrap();
        assert!(outcome.won);
        assert_eq!(outcome.new_score, 103);
        assert_eq!(room.winner_id.as_deref(), Some("p1"));
        assert_eq!(room.game_state, GameState::Finished);

        // A late crossing answer does not overwrite the winner.
        let (room, outcome) = submit_answer(&state, "ABC123", "p2", true, 1).await.unwrap();
        assert!(outcome.is_none());
        assert_eq!(room.winner_id.as_deref(), Some("p1"));
    }

    #[tokio::test]
    async fn wrong_answers_floor_at_zero() {
        let state = competition_state().await;
        update_game_mode(&state, "ABC123", "p1", GameMode::Competition)
            .await
            .unwrap();
        update_host_language(&state, "ABC123", "p1", "french").await.unwrap();
        toggle_ready(&state, "ABC123", "p1").await.unwrap();
        toggle_ready(&state, "ABC123", "p2").await.unwrap();
        start_game(&state, "ABC123", "p1").await.unwrap();

        let (_, outcome) = submit_answer(&state, "ABC123", "p1", false, 5).await.unwrap();
        let outcome = outcome.unwrap();
        assert_eq!(outcome.points, -5);
        assert_eq!(outcome.new_score, 0);
    }

    #[tokio::test]
    async fn restart_resets_scores_and_mode() {
        let state = competition_state().await;
        update_game_mode(&state, "ABC123", "p1", GameMode::Competition)
            .await
            .unwrap();
        update_host_language(&state, "ABC123", "p1", "french").await.unwrap();
        toggle_ready(&state, "ABC123", "p1").await.unwrap();
        toggle_ready(&state, "ABC123", "p2").await.unwrap();
        start_game(&state, "ABC123", "p1").await.unwrap();
        submit_answer(&state, "ABC123", "p1", true, 4).await.unwrap();

        let room = restart(&state, "ABC123", "p1").await.unwrap();
        assert_eq!(room.game_state, GameState::Lobby);
        assert_eq!(room.game_mode, None);
        assert!(room.players.values().all(|p| p.score == 0 && !p.ready));
    }

    #[tokio::test]
    async fn cooperative_start_announces_the_waiting_gap() {
        use axum::extract::ws::Message;
        use tokio::sync::mpsc;
        use uuid::Uuid;

        use crate::state::Session;

        let state = competition_state().await;
        update_game_mode(&state, "ABC123", "p1", GameMode::Cooperation)
            .await
            .unwrap();
        update_language(&state, "ABC123", "p1", "french").await.unwrap();
        update_language(&state, "ABC123", "p2", "spanish").await.unwrap();
        toggle_ready(&state, "ABC123", "p1").await.unwrap();
        toggle_ready(&state, "ABC123", "p2").await.unwrap();

        let (tx, mut rx) = mpsc::unbounded_channel();
        state.sessions().insert(
            Uuid::new_v4(),
            Session {
                room_id: "ABC123".into(),
                player_id: "p2".into(),
                tx,
            },
        );

        let room = start_game(&state, "ABC123", "p1").await.unwrap();
        assert_eq!(room.cooperation_waiting, Some(true));

        // Clients hear about the gap before the first challenge fires.
        let frame = rx.try_recv().expect("waiting frame pushed on start");
        let Message::Text(json) = frame else {
            panic!("expected a text frame");
        };
        assert!(json.contains(r#""type":"cooperation-waiting""#));
        assert!(json.contains(r#""isWaiting":true"#));
    }

    #[tokio::test]
    async fn cooperation_mode_rejects_a_third_player() {
        let state = competition_state().await;
        room_service::join_room(&state, "ABC123", "p3", "Carol", false)
            .await
            .unwrap();
        let err = update_game_mode(&state, "ABC123", "p1", GameMode::Cooperation)
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Conflict(_)));
    }
}
