use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

/// Lifecycle state of a room, governing which operations are admissible.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum GameState {
    /// Players gather, pick a mode and languages, and ready up.
    Lobby,
    /// The game is running; joins are rejected except reconnections.
    Playing,
    /// A winner was declared or the session ran out; restart or leave.
    Finished,
}

/// The three selectable game modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum GameMode {
    /// Independent progress, flat scoring, one shared 60-second timer.
    Practice,
    /// Race to the target score in the host's language.
    Competition,
    /// Two players alternate turns sharing lives and a score.
    Cooperation,
}

/// Events that drive a room through its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoomEvent {
    /// Host selects or resets the game mode (lobby only).
    Configure,
    /// A player toggles readiness or updates a language (lobby only).
    LobbyUpdate,
    /// Host starts the game.
    StartGame,
    /// A gameplay answer arrives; win detection may finish the room.
    Answer,
    /// A server-side timer (practice clock, last cooperative life) ends play.
    FinishGame,
    /// Host sends everyone back to the lobby.
    Restart,
}

/// Error returned when an event is not admissible in the current state.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid transition: {event:?} cannot be applied while {from:?}")]
pub struct InvalidTransition {
    /// State the room was in when the event arrived.
    pub from: GameState,
    /// The rejected event.
    pub event: RoomEvent,
}

/// Compute the state a room moves to when `event` is applied in `from`.
///
/// Mode-specific guards (readiness, languages, player counts) live in the
/// service layer; this table only enforces the lifecycle skeleton.
pub fn next_state(from: GameState, event: RoomEvent) -> Result<GameState, InvalidTransition> {
    let next = match (from, event) {
        (GameState::Lobby, RoomEvent::Configure | RoomEvent::LobbyUpdate) => GameState::Lobby,
        (GameState::Lobby, RoomEvent::StartGame) => GameState::Playing,
        (GameState::Playing, RoomEvent::Answer) => GameState::Playing,
        (GameState::Playing, RoomEvent::FinishGame) => GameState::Finished,
        (GameState::Playing | GameState::Finished, RoomEvent::Restart) => GameState::Lobby,
        (from, event) => return Err(InvalidTransition { from, event }),
    };

    Ok(next)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lobby_flows_into_playing_and_back() {
        assert_eq!(
            next_state(GameState::Lobby, RoomEvent::StartGame).unwrap(),
            GameState::Playing
        );
        assert_eq!(
            next_state(GameState::Playing, RoomEvent::FinishGame).unwrap(),
            GameState::Finished
        );
        assert_eq!(
            next_state(GameState::Finished, RoomEvent::Restart).unwrap(),
            GameState::Lobby
        );
    }

    #[test]
    fn restart_allowed_mid_game() {
        assert_eq!(
            next_state(GameState::Playing, RoomEvent::Restart).unwrap(),
            GameState::Lobby
        );
    }

    #[test]
    fn configuration_is_lobby_only() {
        assert!(next_state(GameState::Lobby, RoomEvent::Configure).is_ok());
        let err = next_state(GameState::Playing, RoomEvent::Configure).unwrap_err();
        assert_eq!(err.from, GameState::Playing);
        assert_eq!(err.event, RoomEvent::Configure);
        assert!(next_state(GameState::Finished, RoomEvent::LobbyUpdate).is_err());
    }

    #[test]
    fn answers_rejected_outside_playing() {
        assert!(next_state(GameState::Lobby, RoomEvent::Answer).is_err());
        assert!(next_state(GameState::Finished, RoomEvent::Answer).is_err());
    }

    #[test]
    fn start_requires_lobby() {
        assert!(next_state(GameState::Playing, RoomEvent::StartGame).is_err());
        assert!(next_state(GameState::Finished, RoomEvent::StartGame).is_err());
    }
}
