use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};

use dashmap::DashMap;
use tokio::task::JoinHandle;

/// What a room's registered timer is counting down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerKind {
    /// Cooperative turn: challenge delay followed by the answer countdown.
    Challenge,
    /// Shared practice session clock.
    Practice,
}

/// A cancelable countdown task owned by a room.
#[derive(Debug)]
pub struct RoomTimer {
    /// What the timer drives.
    pub kind: TimerKind,
    /// Seconds left; the owning task decrements it, donations add to it.
    pub remaining: Arc<AtomicI64>,
    /// Handle used to abort the countdown task.
    pub handle: JoinHandle<()>,
}

/// Registry of in-process room timers, at most one per room.
///
/// Installing a timer for a room aborts any previous one, so a stale
/// countdown can never fire against a reset room.
#[derive(Debug, Default)]
pub struct TimerRegistry {
    timers: DashMap<String, RoomTimer>,
}

impl TimerRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a timer for a room, aborting any timer it replaces.
    pub fn install(&self, room_id: &str, timer: RoomTimer) {
        if let Some(previous) = self.timers.insert(room_id.to_string(), timer) {
            previous.handle.abort();
        }
    }

    /// Abort and remove a room's timer, reporting whether one was running.
    pub fn cancel(&self, room_id: &str) -> bool {
        match self.timers.remove(room_id) {
            Some((_, timer)) => {
                timer.handle.abort();
                true
            }
            None => false,
        }
    }

    /// Extend a running challenge countdown by `seconds`. No-op when the room
    /// has no challenge timer (e.g. a practice clock, or nothing at all).
    pub fn extend(&self, room_id: &str, seconds: i64) -> bool {
        match self.timers.get(room_id) {
            Some(timer) if timer.kind == TimerKind::Challenge => {
                timer.remaining.fetch_add(seconds, Ordering::SeqCst);
                true
            }
            _ => false,
        }
    }

    /// Deregister a timer from within its own task, identified by the shared
    /// countdown cell. Does not abort, and leaves any replacement untouched.
    pub fn finish(&self, room_id: &str, remaining: &Arc<AtomicI64>) {
        self.timers
            .remove_if(room_id, |_, timer| Arc::ptr_eq(&timer.remaining, remaining));
    }

    /// Seconds left on the room's challenge countdown, if one is running.
    pub fn remaining(&self, room_id: &str) -> Option<i64> {
        self.timers
            .get(room_id)
            .filter(|timer| timer.kind == TimerKind::Challenge)
            .map(|timer| timer.remaining.load(Ordering::SeqCst))
    }

    /// Whether a timer is currently registered for the room.
    pub fn is_running(&self, room_id: &str) -> bool {
        self.timers.contains_key(room_id)
    }
}
