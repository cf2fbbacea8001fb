use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    dto::room::{AvailableRoom, RoomSnapshot},
    state::state_machine::GameMode,
};

/// Messages accepted from WebSocket clients.
///
/// Room and player identity come from the connection's session (established
/// by `create-room` / `join-room`), so room-scoped messages carry only their
/// own payload.
#[derive(Debug, Deserialize, Serialize, ToSchema)]
#[serde(tag = "type", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum ClientMessage {
    /// Create a room and join it as host.
    CreateRoom {
        /// Requested room code.
        room_id: String,
        /// Caller-chosen player id.
        player_id: String,
        /// Display name.
        name: String,
        /// Requested target score; invalid values fall back to the default.
        target_score: Option<i64>,
    },
    /// Join an existing room, or reconnect to one mid-game.
    JoinRoom {
        /// Room code.
        room_id: String,
        /// Caller-chosen player id.
        player_id: String,
        /// Display name.
        name: String,
        /// Whether the caller claims to be the creator.
        #[serde(default)]
        is_host: bool,
    },
    /// Request the current available-rooms projection.
    GetAvailableRooms,
    /// Set the caller's practicing language.
    UpdateLanguage {
        /// Language tag.
        language: String,
    },
    /// Set the shared competition language (host only).
    UpdateHostLanguage {
        /// Language tag.
        language: String,
    },
    /// Toggle the caller's readiness.
    ToggleReady,
    /// Select the game mode (host only).
    UpdateGameMode {
        /// Chosen mode.
        game_mode: GameMode,
    },
    /// Reset the mode selection and send everyone back to configuration
    /// (host only).
    ChangeGameMode,
    /// Set the target score (host only).
    UpdateTargetScore {
        /// Requested target score.
        target_score: i64,
    },
    /// Start the game (host only).
    StartGame,
    /// Submit a practice/competition answer.
    Answer {
        /// Whether the external word collaborator judged the answer correct.
        is_correct: bool,
        /// Seconds left on the client's per-question clock.
        time_left: i64,
    },
    /// First practice answer submitted; starts the shared session clock.
    PracticeFirstAnswer,
    /// Client-observed practice clock expiry; resolved idempotently.
    PracticeTimeout,
    /// Submit a cooperative answer for the open challenge.
    CooperationAnswer {
        /// Challenge this answer targets; stale ids are ignored.
        challenge_id: Uuid,
        /// The submitted word.
        answer: String,
        /// Canonical word id from the word collaborator.
        word_id: String,
        /// Whether the collaborator judged the answer correct and unused.
        is_correct: bool,
        /// Seconds left on the countdown at submission.
        remaining_time: i64,
    },
    /// Client-observed cooperative countdown expiry; the server clock is
    /// authoritative, stale ids are ignored.
    CooperationTimeout {
        /// Challenge the client saw expire.
        challenge_id: Uuid,
    },
    /// Donate banked seconds to the active player's countdown.
    DonateTime {
        /// Seconds to donate, 1..=10.
        amount: i64,
    },
    /// Live typing preview relayed to the other room members.
    CooperationTyping {
        /// Partially composed answer.
        text: String,
    },
    /// Keep-alive refreshing room activity and the caller's heartbeat.
    ActivityPing,
    /// Leave the current room.
    LeaveRoom,
    /// Reset the room to the lobby (host only).
    Restart,
}

impl ClientMessage {
    /// Parse a message from its JSON wire form.
    pub fn from_json_str(payload: &str) -> serde_json::Result<Self> {
        serde_json::from_str(payload)
    }

    /// Wire name of the message, used in acks and logs.
    pub fn name(&self) -> &'static str {
        match self {
            ClientMessage::CreateRoom { .. } => "create-room",
            ClientMessage::JoinRoom { .. } => "join-room",
            ClientMessage::GetAvailableRooms => "get-available-rooms",
            ClientMessage::UpdateLanguage { .. } => "update-language",
            ClientMessage::UpdateHostLanguage { .. } => "update-host-language",
            ClientMessage::ToggleReady => "toggle-ready",
            ClientMessage::UpdateGameMode { .. } => "update-game-mode",
            ClientMessage::ChangeGameMode => "change-game-mode",
            ClientMessage::UpdateTargetScore { .. } => "update-target-score",
            ClientMessage::StartGame => "start-game",
            ClientMessage::Answer { .. } => "answer",
            ClientMessage::PracticeFirstAnswer => "practice-first-answer",
            ClientMessage::PracticeTimeout => "practice-timeout",
            ClientMessage::CooperationAnswer { .. } => "cooperation-answer",
            ClientMessage::CooperationTimeout { .. } => "cooperation-timeout",
            ClientMessage::DonateTime { .. } => "donate-time",
            ClientMessage::CooperationTyping { .. } => "cooperation-typing",
            ClientMessage::ActivityPing => "activity-ping",
            ClientMessage::LeaveRoom => "leave-room",
            ClientMessage::Restart => "restart",
        }
    }
}

/// A cooperative challenge as broadcast to both players.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ChallengePayload {
    /// Canonical category identifier.
    pub category_id: String,
    /// Category name localized into the challenge language.
    pub category_name: String,
    /// Canonical (English) category name.
    pub english_name: String,
    /// Language the active player must answer in.
    pub language: String,
    /// Unique id answers must reference.
    pub challenge_id: Uuid,
}

/// Messages pushed to WebSocket clients.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(tag = "type", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum ServerMessage {
    /// Positive acknowledgement of a request/response action.
    Ack {
        /// Wire name of the acknowledged request.
        request: String,
        /// Resulting room snapshot, when the action touches a room.
        #[serde(skip_serializing_if = "Option::is_none")]
        room: Option<RoomSnapshot>,
    },
    /// Negative acknowledgement with a displayable reason.
    Error {
        /// Short reason string for inline display.
        message: String,
        /// HTTP-style status code.
        status: u16,
    },
    /// Authoritative room snapshot after a mutation.
    RoomUpdate {
        /// The updated room.
        room: RoomSnapshot,
    },
    /// Current available-rooms projection.
    AvailableRooms {
        /// Joinable lobby rooms.
        rooms: Vec<AvailableRoom>,
    },
    /// The host reset the mode selection.
    GameModeChanged {
        /// Displayable notice.
        message: String,
    },
    /// A new cooperative challenge is open.
    CooperationChallenge {
        /// The challenge.
        challenge: ChallengePayload,
    },
    /// Whether the server is preparing the next cooperative challenge.
    CooperationWaiting {
        /// True between challenges.
        is_waiting: bool,
    },
    /// Visual feedback for a correct cooperative answer.
    CooperationCorrectAnswer {
        /// Player who answered.
        player_id: String,
        /// The accepted word.
        word: String,
    },
    /// Relayed typing preview.
    CooperationTyping {
        /// Player who is typing.
        player_id: String,
        /// Partially composed answer.
        text: String,
    },
    /// A donation extended the active countdown.
    TimeDonated {
        /// Display name of the donor.
        donor_name: String,
        /// Seconds donated.
        amount: i64,
    },
    /// Per-second tick of the shared practice clock.
    PracticeTimerTick {
        /// Seconds left.
        time_left: i64,
    },
    /// The shared practice clock expired; the session is over.
    PracticeTimeout,
    /// One-time inactivity warning.
    RoomWarning {
        /// Displayable warning.
        message: String,
        /// Seconds until the room closes.
        countdown: u64,
    },
    /// The room was force-closed.
    RoomClosed {
        /// Displayable notice.
        message: String,
        /// Machine-readable reason.
        reason: String,
    },
    /// The host left; the room is defunct.
    HostLeft,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_kebab_case_tags_and_camel_case_fields() {
        let msg = ClientMessage::from_json_str(
            r#"{"type":"join-room","roomId":"ABC123","playerId":"p1","name":"Alice","isHost":true}"#,
        )
        .unwrap();
        match msg {
            ClientMessage::JoinRoom {
                room_id,
                player_id,
                is_host,
                ..
            } => {
                assert_eq!(room_id, "ABC123");
                assert_eq!(player_id, "p1");
                assert!(is_host);
            }
            other => panic!("unexpected message: {other:?}"),
        }
    }

    #[test]
    fn is_host_defaults_to_false() {
        let msg = ClientMessage::from_json_str(
            r#"{"type":"join-room","roomId":"ABC123","playerId":"p2","name":"Bob"}"#,
        )
        .unwrap();
        assert!(matches!(
            msg,
            ClientMessage::JoinRoom { is_host: false, .. }
        ));
    }

    #[test]
    fn serializes_server_messages_with_tags() {
        let json = serde_json::to_string(&ServerMessage::HostLeft).unwrap();
        assert_eq!(json, r#"{"type":"host-left"}"#);

        let json = serde_json::to_string(&ServerMessage::TimeDonated {
            donor_name: "Bob".into(),
            amount: 3,
        })
        .unwrap();
        assert!(json.contains(r#""type":"time-donated""#));
        assert!(json.contains(r#""donorName":"Bob""#));
    }
}
