//! Cooperative turn coordinator: challenge selection, the server-owned
//! countdown, donations, and turn resolution.

use std::{
    sync::{Arc, atomic::{AtomicI64, Ordering}},
    time::Duration,
};

use rand::seq::IndexedRandom;
use tokio::time::sleep;
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    dto::ws::{ChallengePayload, ServerMessage},
    error::ServiceError,
    services::events,
    state::{
        SharedState,
        room::{Room, TIME_BANK_CAP},
        state_machine::{GameMode, GameState},
        timers::{RoomTimer, TimerKind},
    },
};

/// Word categories a challenge can draw from.
const CATEGORIES: [&str; 7] = [
    "colors",
    "animals",
    "food",
    "vehicles",
    "clothing",
    "sports",
    "household",
];

/// Localized display name for a category, falling back to the category id
/// for languages without a translation (including English).
fn localized_category(category: &str, language: &str) -> String {
    let table: &[(&str, &str)] = match category {
        "colors" => &[
            ("french", "Couleurs"),
            ("spanish", "Colores"),
            ("german", "Farben"),
            ("japanese", "色"),
            ("russian", "Цвета"),
        ],
        "animals" => &[
            ("french", "Animaux"),
            ("spanish", "Animales"),
            ("german", "Tiere"),
            ("japanese", "動物"),
            ("russian", "Животные"),
        ],
        "food" => &[
            ("french", "Nourriture"),
            ("spanish", "Comida"),
            ("german", "Essen"),
            ("japanese", "食べ物"),
            ("russian", "Еда"),
        ],
        "vehicles" => &[
            ("french", "Véhicules"),
            ("spanish", "Vehículos"),
            ("german", "Fahrzeuge"),
            ("japanese", "乗り物"),
            ("russian", "Транспорт"),
        ],
        "clothing" => &[
            ("french", "Vêtements"),
            ("spanish", "Ropa"),
            ("german", "Kleidung"),
            ("japanese", "服"),
            ("russian", "Одежда"),
        ],
        "sports" => &[
            ("french", "Sports"),
            ("spanish", "Deportes"),
            ("german", "Sport"),
            ("japanese", "スポーツ"),
            ("russian", "Спорт"),
        ],
        "household" => &[
            ("french", "Objets ménagers"),
            ("spanish", "Artículos del hogar"),
            ("german", "Haushaltsgegenstände"),
            ("japanese", "家庭用品"),
            ("russian", "Предметы быта"),
        ],
        _ => &[],
    };

    table
        .iter()
        .find(|(lang, _)| *lang == language)
        .map(|(_, name)| (*name).to_string())
        .unwrap_or_else(|| category.to_string())
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Schedule the next cooperative turn for a room.
///
/// One task owns the whole turn: the handoff delay, opening the challenge,
/// the per-second countdown, and the timeout resolution. Registering it
/// replaces (and aborts) any previous task for the room, so a reset or
/// restart can never race a stale countdown.
pub fn schedule_challenge(state: SharedState, room_id: String, delay: Duration) {
    let remaining = Arc::new(AtomicI64::new(state.config().challenge_countdown_secs));
    let counter = remaining.clone();
    let task_state = state.clone();
    let task_room = room_id.clone();

    let handle = tokio::spawn(async move {
        sleep(delay).await;

        let challenge_id = match begin_challenge(&task_state, &task_room).await {
            Ok(Some(id)) => id,
            Ok(None) => {
                task_state.timers().finish(&task_room, &counter);
                return;
            }
            Err(err) => {
                warn!(room_id = %task_room, error = %err, "failed to open challenge");
                task_state.timers().finish(&task_room, &counter);
                return;
            }
        };

        // Donations bump the shared counter, stretching this loop.
        while counter.load(Ordering::SeqCst) > 0 {
            sleep(Duration::from_secs(1)).await;
            counter.fetch_sub(1, Ordering::SeqCst);
        }

        // Deregister before resolving so a successor installed by the
        // resolution is not clobbered.
        task_state.timers().finish(&task_room, &counter);
        if let Err(err) = resolve_timeout(&task_state, &task_room, challenge_id).await {
            warn!(room_id = %task_room, error = %err, "timeout resolution failed");
        }
    });

    state.timers().install(
        &room_id,
        RoomTimer {
            kind: TimerKind::Challenge,
            remaining,
            handle,
        },
    );
}

/// Open a challenge for the active player and broadcast it.
///
/// Returns `None` when the room is gone or no longer in a cooperative game,
/// which tells the owning task to wind down quietly.
async fn begin_challenge(
    state: &SharedState,
    room_id: &str,
) -> Result<Option<Uuid>, ServiceError> {
    let result = state
        .with_room(room_id, |room| {
            if room.game_mode != Some(GameMode::Cooperation)
                || room.game_state != GameState::Playing
            {
                return Ok(None);
            }
            let active = room
                .current_challenge_player
                .clone()
                .ok_or_else(|| ServiceError::Conflict("no active player".into()))?;
            let language = room
                .players
                .get(&active)
                .and_then(|p| p.language.clone())
                .ok_or_else(|| {
                    ServiceError::Conflict(format!("player {active} has no language"))
                })?;

            let category = CATEGORIES
                .choose(&mut rand::rng())
                .copied()
                .unwrap_or("colors");
            let challenge_id = Uuid::new_v4();

            room.current_category = Some(category.to_string());
            room.current_challenge_id = Some(challenge_id);
            room.cooperation_waiting = Some(false);
            room.question_count += 1;

            Ok(Some(ChallengePayload {
                category_id: category.to_string(),
                category_name: localized_category(category, &language),
                english_name: capitalize(category),
                language,
                challenge_id,
            }))
        })
        .await;

    let (room, payload) = match result {
        Ok(pair) => pair,
        Err(ServiceError::NotFound(_)) => return Ok(None),
        Err(err) => return Err(err),
    };
    let Some(challenge) = payload else {
        return Ok(None);
    };
    let challenge_id = challenge.challenge_id;

    events::broadcast_to_room(
        state,
        room_id,
        &ServerMessage::CooperationWaiting { is_waiting: false },
    );
    events::broadcast_to_room(state, room_id, &ServerMessage::CooperationChallenge { challenge });
    events::broadcast_room_update(state, &room);
    info!(room_id, challenge_id = %challenge_id, "challenge opened");

    Ok(Some(challenge_id))
}

/// Submit a cooperative answer for the open challenge.
///
/// Stale challenge ids are absorbed without effect: by the time a slow client
/// answers, the turn it refers to has already been resolved. Incorrect
/// answers leave the countdown running so the player can try again.
pub async fn resolve_answer(
    state: &SharedState,
    room_id: &str,
    player_id: &str,
    challenge_id: Uuid,
    answer: &str,
    word_id: &str,
    is_correct: bool,
) -> Result<Room, ServiceError> {
    // Read the authoritative clock before taking the room lock; the client's
    // own reading is not trusted.
    let seconds_left = state.timers().remaining(room_id).unwrap_or(0);

    let (room, resolution) = state
        .with_room(room_id, |room| {
            if room.game_mode != Some(GameMode::Cooperation)
                || room.game_state != GameState::Playing
            {
                return Err(ServiceError::Conflict("no cooperative game running".into()));
            }
            if room.current_challenge_id != Some(challenge_id) {
                return Ok(None);
            }
            if room.current_challenge_player.as_deref() != Some(player_id) {
                return Err(ServiceError::Forbidden("not your turn".into()));
            }
            if !is_correct {
                return Ok(None);
            }

            let language = room
                .players
                .get(player_id)
                .and_then(|p| p.language.clone())
                .unwrap_or_default();
            let word_key = format!("{language}:{word_id}");
            if room
                .used_words
                .as_ref()
                .is_some_and(|words| words.contains(&word_key))
            {
                return Err(ServiceError::Conflict("word already used".into()));
            }

            let outcome = room.resolve_cooperation_answer(player_id, word_key);
            room.credit_time_bank(player_id, seconds_left.clamp(0, TIME_BANK_CAP as i64) as u8);
            Ok(Some(outcome))
        })
        .await?;

    let Some(_outcome) = resolution else {
        // Stale id or incorrect answer.
        return Ok(room);
    };

    state.timers().cancel(room_id);
    events::broadcast_to_room(
        state,
        room_id,
        &ServerMessage::CooperationCorrectAnswer {
            player_id: player_id.to_string(),
            word: answer.to_string(),
        },
    );
    events::broadcast_to_room(
        state,
        room_id,
        &ServerMessage::CooperationWaiting { is_waiting: true },
    );
    events::broadcast_room_update(state, &room);

    schedule_challenge(
        state.clone(),
        room_id.to_string(),
        state.config().next_challenge_delay,
    );
    Ok(room)
}

/// Resolve a challenge countdown running out.
///
/// Reached from the server clock and from client-reported expiries; both go
/// through the same serialized path, and whichever loses the race observes a
/// changed challenge id and does nothing.
pub async fn resolve_timeout(
    state: &SharedState,
    room_id: &str,
    challenge_id: Uuid,
) -> Result<(), ServiceError> {
    let result = state
        .with_room(room_id, |room| {
            if room.game_mode != Some(GameMode::Cooperation)
                || room.game_state != GameState::Playing
                || room.current_challenge_id != Some(challenge_id)
            {
                return Ok(None);
            }
            let active = room
                .current_challenge_player
                .clone()
                .unwrap_or_default();
            Ok(Some(room.resolve_cooperation_timeout(&active)))
        })
        .await;

    let (room, resolution) = match result {
        Ok(pair) => pair,
        // The room can vanish between the countdown and its resolution.
        Err(ServiceError::NotFound(_)) => return Ok(()),
        Err(err) => return Err(err),
    };
    let Some(outcome) = resolution else {
        return Ok(());
    };

    state.timers().cancel(room_id);
    if outcome.finished {
        events::broadcast_room_update(state, &room);
        info!(room_id, "cooperative game over, no lives left");
        return Ok(());
    }

    events::broadcast_to_room(
        state,
        room_id,
        &ServerMessage::CooperationWaiting { is_waiting: true },
    );
    events::broadcast_room_update(state, &room);
    info!(room_id, lives = outcome.lives, "turn timed out");

    schedule_challenge(
        state.clone(),
        room_id.to_string(),
        state.config().next_challenge_delay,
    );
    Ok(())
}

/// Donate banked seconds to the active player's running countdown.
pub async fn donate_time(
    state: &SharedState,
    room_id: &str,
    donor_id: &str,
    amount: i64,
) -> Result<Room, ServiceError> {
    if !(1..=TIME_BANK_CAP as i64).contains(&amount) {
        return Err(ServiceError::InvalidInput(format!(
            "donation must be between 1 and {TIME_BANK_CAP} seconds"
        )));
    }

    let (room, donor_name) = state
        .with_room(room_id, |room| {
            if room.game_mode != Some(GameMode::Cooperation)
                || room.game_state != GameState::Playing
            {
                return Err(ServiceError::Conflict("no cooperative game running".into()));
            }
            // No challenge open between turns, nothing to extend.
            if room.cooperation_waiting != Some(false) || room.current_challenge_id.is_none() {
                return Err(ServiceError::Conflict("no challenge in progress".into()));
            }
            let active = room
                .current_challenge_player
                .clone()
                .unwrap_or_default();
            if active == donor_id {
                return Err(ServiceError::Forbidden(
                    "the active player cannot donate to themselves".into(),
                ));
            }

            let donor = room
                .players
                .get_mut(donor_id)
                .ok_or_else(|| ServiceError::NotFound(format!("player {donor_id} not in room")))?;
            if (donor.time_bank as i64) < amount {
                return Err(ServiceError::Conflict("not enough banked time".into()));
            }
            donor.time_bank -= amount as u8;
            let donor_name = donor.name.clone();

            if let Some(recipient) = room.players.get_mut(&active) {
                recipient.received_extra_time = true;
            }
            Ok(donor_name)
        })
        .await?;

    if !state.timers().extend(room_id, amount) {
        warn!(room_id, donor_id, "donation arrived after the countdown ended");
    }

    events::broadcast_to_room(
        state,
        room_id,
        &ServerMessage::TimeDonated {
            donor_name,
            amount,
        },
    );
    events::broadcast_room_update(state, &room);
    Ok(room)
}

/// Relay a typing preview to the other members of the room.
pub fn relay_typing(state: &SharedState, room_id: &str, player_id: &str, text: &str) {
    events::broadcast_to_others(
        state,
        room_id,
        player_id,
        &ServerMessage::CooperationTyping {
            player_id: player_id.to_string(),
            text: text.to_string(),
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
        services::{game_service, room_service},
        state::AppState,
    };

    async fn coop_state() -> SharedState {
        let state = AppState::new(AppConfig::default());
        state
            .install_room_store(Arc::new(MemoryRoomStore::new()))
            .await;
        room_service::create_room(&state, "COOP42", "p1", "Alice", None)
            .await
            .unwrap();
        room_service::join_room(&state, "COOP42", "p2", "Bob", false)
            .await
            .unwrap();
        game_service::update_game_mode(&state, "COOP42", "p1", GameMode::Cooperation)
            .await
            .unwrap();
        game_service::update_language(&state, "COOP42", "p1", "french")
            .await
            .unwrap();
        game_service::update_language(&state, "COOP42", "p2", "spanish")
            .await
            .unwrap();
        state
    }

    /// Put the room mid-challenge with `active` on the clock.
    async fn open_challenge(state: &SharedState, active: &str) -> Uuid {
        let id = Uuid::new_v4();
        state
            .with_room("COOP42", |room| {
                room.game_state = GameState::Playing;
                room.cooperation_waiting = Some(false);
                room.current_challenge_player = Some(active.to_string());
                room.current_challenge_id = Some(id);
                room.current_category = Some("colors".to_string());
                Ok(())
            })
            .await
            .unwrap();
        id
    }

    #[tokio::test]
    async fn correct_answer_flips_turn_and_consumes_word() {
        let state = coop_state().await;
        let challenge = open_challenge(&state, "p1").await;

        let room = resolve_answer(&state, "COOP42", "p1", challenge, "rouge", "red", true)
            .await
            .unwrap();
        assert_eq!(room.cooperation_score, Some(1));
        assert_eq!(room.current_challenge_player.as_deref(), Some("p2"));
        assert_eq!(room.cooperation_waiting, Some(true));
        assert!(room.used_words.as_ref().unwrap().contains("french:red"));
        state.timers().cancel("COOP42");
    }

    #[tokio::test]
    async fn stale_challenge_id_is_ignored() {
        let state = coop_state().await;
        open_challenge(&state, "p1").await;

        let room = resolve_answer(&state, "COOP42", "p1", Uuid::new_v4(), "rouge", "red", true)
            .await
            .unwrap();
        assert_eq!(room.cooperation_score, Some(0));
        assert_eq!(room.current_challenge_player.as_deref(), Some("p1"));
    }

    #[tokio::test]
    async fn answering_out_of_turn_is_forbidden() {
        let state = coop_state().await;
        let challenge = open_challenge(&state, "p1").await;

        let err = resolve_answer(&state, "COOP42", "p2", challenge, "rojo", "red", true)
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Forbidden(_)));
    }

    #[tokio::test]
    async fn third_timeout_finishes_the_game() {
        let state = coop_state().await;

        for expected_lives in [2u8, 1] {
            let challenge = open_challenge(&state, "p1").await;
            resolve_timeout(&state, "COOP42", challenge).await.unwrap();
            let store = state.room_store().await.unwrap();
            let room = store.find_room("COOP42").await.unwrap().unwrap();
            assert_eq!(room.cooperation_lives, Some(expected_lives));
            assert_eq!(room.game_state, GameState::Playing);
            state.timers().cancel("COOP42");
        }

        let challenge = open_challenge(&state, "p1").await;
        resolve_timeout(&state, "COOP42", challenge).await.unwrap();
        let store = state.room_store().await.unwrap();
        let room = store.find_room("COOP42").await.unwrap().unwrap();
        assert_eq!(room.cooperation_lives, Some(0));
        assert_eq!(room.game_state, GameState::Finished);
        assert!(!state.timers().is_running("COOP42"));
    }

    #[tokio::test]
    async fn donation_requires_bank_turn_and_open_challenge() {
        let state = coop_state().await;
        open_challenge(&state, "p1").await;

        // Empty bank.
        let err = donate_time(&state, "COOP42", "p2", 3).await.unwrap_err();
        assert!(matches!(err, ServiceError::Conflict(_)));

        state
            .with_room("COOP42", |room| {
                room.players.get_mut("p2").unwrap().time_bank = 5;
                Ok(())
            })
            .await
            .unwrap();

        // Active player cannot donate to themselves.
        let err = donate_time(&state, "COOP42", "p1", 3).await.unwrap_err();
        assert!(matches!(err, ServiceError::Forbidden(_)));

        // Out-of-range amounts rejected outright.
        let err = donate_time(&state, "COOP42", "p2", 0).await.unwrap_err();
        assert!(matches!(err, ServiceError::InvalidInput(_)));

        let room = donate_time(&state, "COOP42", "p2", 3).await.unwrap();
        assert_eq!(room.players.get("p2").unwrap().time_bank, 2);
        assert!(room.players.get("p1").unwrap().received_extra_time);
    }

    #[tokio::test]
    async fn donation_rejected_between_challenges() {
        let state = coop_state().await;
        open_challenge(&state, "p1").await;
        state
            .with_room("COOP42", |room| {
                room.players.get_mut("p2").unwrap().time_bank = 5;
                room.cooperation_waiting = Some(true);
                room.current_challenge_id = None;
                Ok(())
            })
            .await
            .unwrap();

        let err = donate_time(&state, "COOP42", "p2", 2).await.unwrap_err();
        assert!(matches!(err, ServiceError::Conflict(_)));
    }

    #[test]
    fn categories_localize_with_fallback() {
        assert_eq!(localized_category("colors", "french"), "Couleurs");
        assert_eq!(localized_category("sports", "japanese"), "スポーツ");
        assert_eq!(localized_category("colors", "english"), "colors");
        assert_eq!(capitalize("household"), "Household");
    }
}
