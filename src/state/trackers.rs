use std::time::{Duration, Instant};

use dashmap::DashMap;

use crate::config::AppConfig;

/// Process-local record of a room's recent activity.
#[derive(Debug, Clone)]
pub struct RoomActivity {
    /// Last time any room-scoped action touched the room.
    pub last_activity: Instant,
    /// Whether the one-time inactivity warning has already gone out.
    pub warning_issued: bool,
}

/// What the cleanup sweep should do with a room, if anything.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SweepAction {
    /// Broadcast the one-time inactivity warning.
    Warn,
    /// Force-close the room.
    Close,
}

/// Decide the sweep action for a room given its idle time.
///
/// `playing` rooms get the longer threshold; the warning fires once when the
/// idle time passes the warning mark but the close threshold has not been
/// crossed yet.
pub fn classify_idle(
    idle: Duration,
    playing: bool,
    warning_issued: bool,
    config: &AppConfig,
) -> Option<SweepAction> {
    let threshold = if playing {
        config.playing_inactivity
    } else {
        config.lobby_inactivity
    };

    if idle > threshold {
        Some(SweepAction::Close)
    } else if idle > config.warning_after && !warning_issued {
        Some(SweepAction::Warn)
    } else {
        None
    }
}

/// Process-local map tracking per-room activity, independent of the store.
///
/// Lost on process restart by design; the next room-scoped action re-seeds the
/// entry.
#[derive(Debug, Default)]
pub struct ActivityTracker {
    rooms: DashMap<String, RoomActivity>,
}

impl ActivityTracker {
    /// Create an empty tracker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record activity for a room, clearing any pending warning.
    pub fn touch(&self, room_id: &str) {
        self.rooms.insert(
            room_id.to_string(),
            RoomActivity {
                last_activity: Instant::now(),
                warning_issued: false,
            },
        );
    }

    /// Mark the warning as issued without refreshing the activity timestamp.
    pub fn mark_warned(&self, room_id: &str) {
        if let Some(mut entry) = self.rooms.get_mut(room_id) {
            entry.warning_issued = true;
        }
    }

    /// Stop tracking a room.
    pub fn forget(&self, room_id: &str) {
        self.rooms.remove(room_id);
    }

    /// Snapshot currently tracked rooms for a sweep pass.
    pub fn entries(&self) -> Vec<(String, RoomActivity)> {
        self.rooms
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect()
    }
}

/// Last-seen heartbeat for a player, keyed by player id.
#[derive(Debug, Clone)]
pub struct Heartbeat {
    /// Last time the player pinged or acted.
    pub last_seen: Instant,
    /// Room the player was in when last seen.
    pub room_id: String,
}

/// Process-local map used to spot ghost players whose connection vanished
/// without a clean leave.
#[derive(Debug, Default)]
pub struct HeartbeatTracker {
    players: DashMap<String, Heartbeat>,
}

impl HeartbeatTracker {
    /// Create an empty tracker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a heartbeat for a player.
    pub fn beat(&self, player_id: &str, room_id: &str) {
        self.players.insert(
            player_id.to_string(),
            Heartbeat {
                last_seen: Instant::now(),
                room_id: room_id.to_string(),
            },
        );
    }

    /// Stop tracking a player.
    pub fn forget(&self, player_id: &str) {
        self.players.remove(player_id);
    }

    /// Players whose last heartbeat is older than the configured threshold.
    pub fn expired(&self, timeout: Duration) -> Vec<(String, Heartbeat)> {
        let now = Instant::now();
        self.players
            .iter()
            .filter(|entry| now.duration_since(entry.value().last_seen) > timeout)
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> AppConfig {
        AppConfig::default()
    }

    #[test]
    fn quiet_room_is_left_alone() {
        let cfg = config();
        assert_eq!(
            classify_idle(Duration::from_secs(30), false, false, &cfg),
            None
        );
    }

    #[test]
    fn warning_fires_once_between_thresholds() {
        let cfg = config();
        let idle = Duration::from_secs(100);
        assert_eq!(
            classify_idle(idle, false, false, &cfg),
            Some(SweepAction::Warn)
        );
        assert_eq!(classify_idle(idle, false, true, &cfg), None);
    }

    #[test]
    fn lobby_rooms_close_sooner_than_playing_rooms() {
        let cfg = config();
        let idle = Duration::from_secs(150);
        assert_eq!(
            classify_idle(idle, false, true, &cfg),
            Some(SweepAction::Close)
        );
        // Same idle time is tolerated while a game is in progress.
        assert_eq!(classify_idle(idle, true, true, &cfg), None);
        assert_eq!(
            classify_idle(Duration::from_secs(301), true, true, &cfg),
            Some(SweepAction::Close)
        );
    }

    #[test]
    fn heartbeat_expiry_respects_threshold() {
        let tracker = HeartbeatTracker::new();
        tracker.beat("p1", "ABC123");
        assert!(tracker.expired(Duration::from_secs(90)).is_empty());
        assert_eq!(tracker.expired(Duration::ZERO).len(), 1);
        tracker.forget("p1");
        assert!(tracker.expired(Duration::ZERO).is_empty());
    }

    #[test]
    fn touch_resets_warning_flag() {
        let tracker = ActivityTracker::new();
        tracker.touch("ABC123");
        tracker.mark_warned("ABC123");
        assert!(tracker.entries()[0].1.warning_issued);
        tracker.touch("ABC123");
        assert!(!tracker.entries()[0].1.warning_issued);
    }
}
