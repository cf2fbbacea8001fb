use serde::Serialize;
use utoipa::ToSchema;

use crate::{
    dto::format_system_time,
    state::{
        room::{Player, Room},
        state_machine::{GameMode, GameState},
    },
};

/// Public projection of a player inside a room snapshot.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PlayerSummary {
    /// Caller-supplied identifier.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Language the player answers in, when selected.
    pub language: Option<String>,
    /// Lobby readiness flag.
    pub ready: bool,
    /// Individual score.
    pub score: i64,
    /// Whether this player created the room.
    pub is_host: bool,
    /// Banked countdown seconds available for donation.
    pub time_bank: u8,
    /// Whether the player already received donated time this turn.
    pub received_extra_time: bool,
}

impl From<&Player> for PlayerSummary {
    fn from(player: &Player) -> Self {
        Self {
            id: player.id.clone(),
            name: player.name.clone(),
            language: player.language.clone(),
            ready: player.ready,
            score: player.score,
            is_host: player.is_host,
            time_bank: player.time_bank,
            received_extra_time: player.received_extra_time,
        }
    }
}

/// Authoritative room snapshot broadcast to every room member after each
/// mutation.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RoomSnapshot {
    /// Room code.
    pub id: String,
    /// Players in join order.
    pub players: Vec<PlayerSummary>,
    /// Lifecycle state.
    pub game_state: GameState,
    /// Selected mode, if any.
    pub game_mode: Option<GameMode>,
    /// Shared competition language, if set.
    pub host_language: Option<String>,
    /// Score needed to win.
    pub target_score: i64,
    /// First player to cross the target, if the game has finished.
    pub winner_id: Option<String>,
    /// Remaining cooperative lives.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cooperation_lives: Option<u8>,
    /// Shared cooperative score.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cooperation_score: Option<u64>,
    /// Whose turn it is in cooperative mode.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_challenge_player: Option<String>,
    /// True between cooperative challenges.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cooperation_waiting: Option<bool>,
    /// Questions/challenges issued so far.
    pub question_count: u64,
    /// Creation timestamp (RFC 3339).
    pub created_at: String,
    /// Last activity timestamp (RFC 3339).
    pub last_activity: String,
}

impl From<&Room> for RoomSnapshot {
    fn from(room: &Room) -> Self {
        Self {
            id: room.id.clone(),
            players: room.players.values().map(PlayerSummary::from).collect(),
            game_state: room.game_state,
            game_mode: room.game_mode,
            host_language: room.host_language.clone(),
            target_score: room.target_score,
            winner_id: room.winner_id.clone(),
            cooperation_lives: room.cooperation_lives,
            cooperation_score: room.cooperation_score,
            current_challenge_player: room.current_challenge_player.clone(),
            cooperation_waiting: room.cooperation_waiting,
            question_count: room.question_count,
            created_at: format_system_time(room.created_at),
            last_activity: format_system_time(room.last_activity),
        }
    }
}

/// Discovery entry for a joinable lobby room.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AvailableRoom {
    /// Room code.
    pub id: String,
    /// Players currently in the room.
    pub player_count: usize,
    /// Capacity for the selected mode.
    pub max_players: usize,
    /// Discovery status, always `waiting` for listed rooms.
    pub status: String,
    /// Score needed to win.
    pub target_score: i64,
    /// Selected mode, if any.
    pub game_mode: Option<GameMode>,
    /// Shared competition language, if set.
    pub host_language: Option<String>,
}

impl From<&Room> for AvailableRoom {
    fn from(room: &Room) -> Self {
        Self {
            id: room.id.clone(),
            player_count: room.players.len(),
            max_players: room.capacity(),
            status: "waiting".into(),
            target_score: room.target_score,
            game_mode: room.game_mode,
            host_language: room.host_language.clone(),
        }
    }
}
