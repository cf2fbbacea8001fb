use std::collections::HashSet;
use std::time::SystemTime;

use indexmap::IndexMap;
use uuid::Uuid;

use crate::state::state_machine::{GameMode, GameState};

/// Maximum players in practice and competition rooms.
pub const MAX_PLAYERS: usize = 8;
/// Maximum players in cooperation rooms.
pub const COOPERATION_PLAYERS: usize = 2;
/// Upper bound on a player's accumulated time bank, in seconds.
pub const TIME_BANK_CAP: u8 = 10;
/// Lives a cooperative session starts with.
pub const COOPERATION_LIVES: u8 = 3;

/// Player info tracked inside a room.
#[derive(Debug, Clone)]
pub struct Player {
    /// Caller-supplied unique identifier.
    pub id: String,
    /// Display name, length-bounded by DTO validation.
    pub name: String,
    /// Language this player answers in (practice/cooperation modes).
    pub language: Option<String>,
    /// Whether the player has readied up in the lobby.
    pub ready: bool,
    /// Individual score, never negative.
    pub score: i64,
    /// Whether this player created the room.
    pub is_host: bool,
    /// Unused countdown seconds banked during cooperative turns, 0..=10.
    pub time_bank: u8,
    /// Guards against double-crediting the time bank within one turn.
    pub received_extra_time: bool,
}

impl Player {
    /// Build a freshly joined player with zeroed gameplay state.
    pub fn new(id: String, name: String, is_host: bool) -> Self {
        Self {
            id,
            name,
            language: None,
            ready: false,
            score: 0,
            is_host,
            time_bank: 0,
            received_extra_time: false,
        }
    }
}

/// Outcome of applying a practice/competition answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnswerOutcome {
    /// Points awarded (or deducted, negative) by this answer.
    pub points: i64,
    /// The player's score after the update.
    pub new_score: i64,
    /// Whether this answer finished the game by crossing the target score.
    pub won: bool,
}

/// Outcome of resolving a cooperative turn (answer or timeout).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TurnOutcome {
    /// Lives remaining after the resolution.
    pub lives: u8,
    /// Whether the room transitioned to finished.
    pub finished: bool,
    /// The player who holds the next turn, when the game continues.
    pub next_player: Option<String>,
}

/// Aggregated state of a multiplayer room; one record per room code.
#[derive(Debug, Clone)]
pub struct Room {
    /// Short human-entered code, uppercase-normalized. Primary key.
    pub id: String,
    /// Players keyed by id; insertion order is join order.
    pub players: IndexMap<String, Player>,
    /// Lifecycle state governing admissible operations.
    pub game_state: GameState,
    /// Selected mode; none until the host picks one.
    pub game_mode: Option<GameMode>,
    /// Shared target language, meaningful in competition mode only.
    pub host_language: Option<String>,
    /// Score a player must reach to win (competition mode).
    pub target_score: i64,
    /// First player whose score crossed the target, if any.
    pub winner_id: Option<String>,
    /// Shared lives counter for cooperative sessions.
    pub cooperation_lives: Option<u8>,
    /// Shared score for cooperative sessions.
    pub cooperation_score: Option<u64>,
    /// Language-qualified word ids already consumed this session.
    pub used_words: Option<HashSet<String>>,
    /// Category bound to the currently open challenge.
    pub current_category: Option<String>,
    /// Identifier of the currently open challenge; stale events are matched
    /// against this and dropped.
    pub current_challenge_id: Option<Uuid>,
    /// Whose turn it is in cooperative mode.
    pub current_challenge_player: Option<String>,
    /// True while the server prepares the next cooperative challenge.
    pub cooperation_waiting: Option<bool>,
    /// Number of questions/challenges issued so far.
    pub question_count: u64,
    /// Creation timestamp.
    pub created_at: SystemTime,
    /// Updated by every room-scoped action; drives the inactivity sweep.
    pub last_activity: SystemTime,
}

impl Room {
    /// Create an empty lobby room with the given target score.
    pub fn new(id: String, target_score: i64) -> Self {
        let now = SystemTime::now();
        Self {
            id,
            players: IndexMap::new(),
            game_state: GameState::Lobby,
            game_mode: None,
            host_language: None,
            target_score,
            winner_id: None,
            cooperation_lives: None,
            cooperation_score: None,
            used_words: None,
            current_category: None,
            current_challenge_id: None,
            current_challenge_player: None,
            cooperation_waiting: None,
            question_count: 0,
            created_at: now,
            last_activity: now,
        }
    }

    /// Player capacity for the currently selected mode.
    pub fn capacity(&self) -> usize {
        match self.game_mode {
            Some(GameMode::Cooperation) => COOPERATION_PLAYERS,
            _ => MAX_PLAYERS,
        }
    }

    /// Whether the room cannot accept another player.
    pub fn is_full(&self) -> bool {
        self.players.len() >= self.capacity()
    }

    /// The host player, if one is present.
    pub fn host(&self) -> Option<&Player> {
        self.players.values().find(|p| p.is_host)
    }

    /// Whether the given player holds host privileges.
    pub fn is_host(&self, player_id: &str) -> bool {
        self.players.get(player_id).is_some_and(|p| p.is_host)
    }

    /// Id of the other player in a two-player room.
    pub fn other_player_id(&self, player_id: &str) -> Option<String> {
        self.players
            .keys()
            .find(|id| id.as_str() != player_id)
            .cloned()
    }

    /// Seed the cooperative counters when the host selects cooperation mode.
    pub fn seed_cooperation(&mut self) {
        self.cooperation_lives = Some(COOPERATION_LIVES);
        self.cooperation_score = Some(0);
        self.used_words = Some(HashSet::new());
        self.current_category = None;
        self.current_challenge_id = None;
        self.current_challenge_player = None;
        self.cooperation_waiting = Some(false);
    }

    /// Drop the selected mode and every mode-dependent field, sending all
    /// players back to an unconfigured lobby.
    pub fn clear_mode(&mut self) {
        self.game_mode = None;
        self.host_language = None;
        self.cooperation_lives = None;
        self.cooperation_score = None;
        self.used_words = None;
        self.current_category = None;
        self.current_challenge_id = None;
        self.current_challenge_player = None;
        self.cooperation_waiting = None;
        for player in self.players.values_mut() {
            player.ready = false;
            player.language = None;
        }
    }

    /// Reset the room to a fresh lobby while keeping the code and players.
    pub fn reset_for_restart(&mut self) {
        self.game_state = GameState::Lobby;
        self.winner_id = None;
        self.question_count = 0;
        self.clear_mode();
        for player in self.players.values_mut() {
            player.score = 0;
            player.time_bank = 0;
            player.received_extra_time = false;
        }
    }

    /// Apply a practice/competition answer, enforcing the score floor and the
    /// first-to-cross-wins rule. Returns `None` when the room has already
    /// finished: a later answer must not overwrite the winner.
    pub fn apply_answer(
        &mut self,
        player_id: &str,
        is_correct: bool,
        time_left: i64,
    ) -> Option<AnswerOutcome> {
        if self.game_state == GameState::Finished {
            return None;
        }

        let practice = self.game_mode == Some(GameMode::Practice);
        let player = self.players.get_mut(player_id)?;

        let points = if is_correct {
            if practice { 1 } else { (10 - time_left).max(1) }
        } else if practice {
            0
        } else {
            -5
        };

        player.score = (player.score + points).max(0);
        let new_score = player.score;

        let won = !matches!(self.game_mode, Some(GameMode::Cooperation))
            && new_score >= self.target_score
            && new_score > 0;
        if won {
            self.game_state = GameState::Finished;
            self.winner_id = Some(player_id.to_string());
        }

        Some(AnswerOutcome {
            points,
            new_score,
            won,
        })
    }

    /// Credit unused countdown seconds to a player's time bank, clamped to
    /// [`TIME_BANK_CAP`]. Skipped when the player already received donated
    /// time this turn; the gate resets for the next round either way.
    pub fn credit_time_bank(&mut self, player_id: &str, remaining: u8) {
        let Some(player) = self.players.get_mut(player_id) else {
            return;
        };
        if !player.received_extra_time {
            player.time_bank = (player.time_bank + remaining).min(TIME_BANK_CAP);
        }
        player.received_extra_time = false;
    }

    /// Resolve a correct cooperative answer: consume the word, bump the shared
    /// score, and hand the turn to the other player.
    pub fn resolve_cooperation_answer(&mut self, player_id: &str, word_key: String) -> TurnOutcome {
        self.used_words.get_or_insert_default().insert(word_key);
        self.cooperation_score = Some(self.cooperation_score.unwrap_or(0) + 1);
        self.pass_turn(player_id)
    }

    /// Resolve a cooperative timeout: burn a life, finishing the room when the
    /// last one is gone, otherwise hand the turn over. The donation gate only
    /// guards the turn it was opened in, so it closes here too.
    pub fn resolve_cooperation_timeout(&mut self, player_id: &str) -> TurnOutcome {
        if let Some(player) = self.players.get_mut(player_id) {
            player.received_extra_time = false;
        }

        let lives = self
            .cooperation_lives
            .unwrap_or(COOPERATION_LIVES)
            .saturating_sub(1);
        self.cooperation_lives = Some(lives);

        if lives == 0 {
            self.game_state = GameState::Finished;
            self.current_category = None;
            self.current_challenge_id = None;
            self.cooperation_waiting = Some(false);
            return TurnOutcome {
                lives,
                finished: true,
                next_player: None,
            };
        }

        self.pass_turn(player_id)
    }

    /// Flip the active player and enter the waiting gap between challenges.
    fn pass_turn(&mut self, player_id: &str) -> TurnOutcome {
        let next = self
            .other_player_id(player_id)
            .unwrap_or_else(|| player_id.to_string());
        self.current_challenge_player = Some(next.clone());
        self.current_category = None;
        self.current_challenge_id = None;
        self.cooperation_waiting = Some(true);
        TurnOutcome {
            lives: self.cooperation_lives.unwrap_or(COOPERATION_LIVES),
            finished: false,
            next_player: Some(next),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn competition_room() -> Room {
        let mut room = Room::new("ABC123".into(), 100);
        room.players
            .insert("p1".into(), Player::new("p1".into(), "Alice".into(), true));
        room.players
            .insert("p2".into(), Player::new("p2".into(), "Bob".into(), false));
        room.game_mode = Some(GameMode::Competition);
        room.game_state = GameState::Playing;
        room
    }

    fn cooperation_room() -> Room {
        let mut room = Room::new("COOP42".into(), 100);
        room.players
            .insert("p1".into(), Player::new("p1".into(), "Alice".into(), true));
        room.players
            .insert("p2".into(), Player::new("p2".into(), "Bob".into(), false));
        room.game_mode = Some(GameMode::Cooperation);
        room.seed_cooperation();
        room.game_state = GameState::Playing;
        room.current_challenge_player = Some("p1".into());
        room
    }

    #[test]
    fn competition_scoring_crosses_target() {
        let mut room = competition_room();
        room.players.get_mut("p1").unwrap().score = 95;

        let outcome = room.apply_answer("p1", true, 9).unwrap();
        assert_eq!(outcome.points, 1);
        assert_eq!(outcome.new_score, 96);
        assert!(!outcome.won);
        assert_eq!(room.game_state, GameState::Playing);

        let outcome = room.apply_answer("p1", true, 0).unwrap();
        assert_eq!(outcome.points, 10);
        assert_eq!(outcome.new_score, 106);
        assert!(outcome.won);
        assert_eq!(room.game_state, GameState::Finished);
        assert_eq!(room.winner_id.as_deref(), Some("p1"));
    }

    #[test]
    fn competition_penalty_floors_at_zero() {
        let mut room = competition_room();
        room.players.get_mut("p1").unwrap().score = 3;
        let outcome = room.apply_answer("p1", false, 4).unwrap();
        assert_eq!(outcome.new_score, 0);
    }

    #[test]
    fn practice_scoring_is_flat_and_lossless() {
        let mut room = competition_room();
        room.game_mode = Some(GameMode::Practice);
        let outcome = room.apply_answer("p1", true, 0).unwrap();
        assert_eq!(outcome.points, 1);
        let outcome = room.apply_answer("p1", false, 0).unwrap();
        assert_eq!(outcome.points, 0);
        assert_eq!(outcome.new_score, 1);
    }

    #[test]
    fn finished_room_never_changes_winner() {
        let mut room = competition_room();
        room.players.get_mut("p1").unwrap().score = 99;
        room.players.get_mut("p2").unwrap().score = 99;

        assert!(room.apply_answer("p1", true, 0).unwrap().won);
        assert!(room.apply_answer("p2", true, 0).is_none());
        assert_eq!(room.winner_id.as_deref(), Some("p1"));
    }

    #[test]
    fn cooperation_answer_flips_turn_and_scores() {
        let mut room = cooperation_room();
        let outcome = room.resolve_cooperation_answer("p1", "french:chat".into());
        assert_eq!(outcome.next_player.as_deref(), Some("p2"));
        assert_eq!(room.cooperation_score, Some(1));
        assert_eq!(room.cooperation_waiting, Some(true));
        assert!(room.used_words.as_ref().unwrap().contains("french:chat"));

        let outcome = room.resolve_cooperation_timeout("p2");
        assert_eq!(outcome.next_player.as_deref(), Some("p1"));
        assert_eq!(room.cooperation_lives, Some(2));
    }

    #[test]
    fn three_timeouts_finish_the_session() {
        let mut room = cooperation_room();
        assert!(!room.resolve_cooperation_timeout("p1").finished);
        assert_eq!(room.cooperation_lives, Some(2));
        assert!(!room.resolve_cooperation_timeout("p2").finished);
        let outcome = room.resolve_cooperation_timeout("p1");
        assert!(outcome.finished);
        assert_eq!(outcome.lives, 0);
        assert_eq!(room.game_state, GameState::Finished);
        assert!(room.winner_id.is_none());
    }

    #[test]
    fn time_bank_clamps_and_respects_gate() {
        let mut room = cooperation_room();
        room.credit_time_bank("p1", 7);
        assert_eq!(room.players["p1"].time_bank, 7);
        room.credit_time_bank("p1", 7);
        assert_eq!(room.players["p1"].time_bank, TIME_BANK_CAP);

        room.players.get_mut("p2").unwrap().received_extra_time = true;
        room.credit_time_bank("p2", 5);
        assert_eq!(room.players["p2"].time_bank, 0);
        // Gate resets so the next turn credits normally.
        assert!(!room.players["p2"].received_extra_time);
        room.credit_time_bank("p2", 5);
        assert_eq!(room.players["p2"].time_bank, 5);
    }

    #[test]
    fn timeout_closes_the_donation_gate() {
        let mut room = cooperation_room();
        room.players.get_mut("p1").unwrap().received_extra_time = true;

        room.resolve_cooperation_timeout("p1");
        assert!(!room.players["p1"].received_extra_time);

        // Next turn the player answers in time and banks the remainder again.
        room.credit_time_bank("p1", 6);
        assert_eq!(room.players["p1"].time_bank, 6);
    }

    #[test]
    fn capacity_depends_on_mode() {
        let mut room = Room::new("CAP".into(), 100);
        assert_eq!(room.capacity(), MAX_PLAYERS);
        room.game_mode = Some(GameMode::Cooperation);
        assert_eq!(room.capacity(), COOPERATION_PLAYERS);
    }

    #[test]
    fn restart_clears_gameplay_but_keeps_players() {
        let mut room = cooperation_room();
        room.players.get_mut("p1").unwrap().time_bank = 9;
        room.reset_for_restart();
        assert_eq!(room.game_state, GameState::Lobby);
        assert!(room.game_mode.is_none());
        assert!(room.cooperation_lives.is_none());
        assert_eq!(room.players.len(), 2);
        assert_eq!(room.players["p1"].time_bank, 0);
        assert!(!room.players["p1"].ready);
    }
}
