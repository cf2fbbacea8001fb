/// Room and player domain model.
pub mod room;
mod sse;
/// Lifecycle state machine shared by every room.
pub mod state_machine;
/// Server-side countdown ownership.
pub mod timers;
/// Inactivity and heartbeat bookkeeping.
pub mod trackers;

use std::{sync::Arc, time::SystemTime};

use axum::extract::ws::Message;
use dashmap::DashMap;
use tokio::sync::{Mutex, RwLock, mpsc, watch};

use crate::{
    config::AppConfig,
    dao::room_store::RoomStore,
    error::ServiceError,
    state::{
        room::Room,
        timers::TimerRegistry,
        trackers::{ActivityTracker, HeartbeatTracker},
    },
};

pub use self::sse::SseHub;

pub type SharedState = Arc<AppState>;

#[derive(Clone)]
/// Handle describing one live WebSocket connection and the player behind it.
pub struct Session {
    /// Room the connection is attached to.
    pub room_id: String,
    /// Player identifier the connection authenticated as.
    pub player_id: String,
    /// Writer half used to push frames to the socket.
    pub tx: mpsc::UnboundedSender<Message>,
}

/// Central application state storing live connections, per-room locks, and
/// the storage handle.
pub struct AppState {
    config: AppConfig,
    room_store: RwLock<Option<Arc<dyn RoomStore>>>,
    lobby_sse: SseHub,
    sessions: DashMap<uuid::Uuid, Session>,
    room_locks: DashMap<String, Arc<Mutex<()>>>,
    activity: ActivityTracker,
    heartbeats: HeartbeatTracker,
    timers: TimerRegistry,
    degraded: watch::Sender<bool>,
}

impl AppState {
    /// Construct a new [`AppState`] wrapped in an [`Arc`] so it can be cloned cheaply.
    ///
    /// The application starts in degraded mode until a storage backend is installed.
    pub fn new(config: AppConfig) -> SharedState {
        let (degraded_tx, _rx) = watch::channel(true);
        Arc::new(Self {
            config,
            room_store: RwLock::new(None),
            lobby_sse: SseHub::new(16),
            sessions: DashMap::new(),
            room_locks: DashMap::new(),
            activity: ActivityTracker::new(),
            heartbeats: HeartbeatTracker::new(),
            timers: TimerRegistry::new(),
            degraded: degraded_tx,
        })
    }

    /// Runtime configuration the server was started with.
    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Obtain a handle to the current room store, if one is installed.
    pub async fn room_store(&self) -> Option<Arc<dyn RoomStore>> {
        let guard = self.room_store.read().await;
        guard.as_ref().cloned()
    }

    /// Room store handle, or [`ServiceError::Degraded`] when none is installed.
    pub async fn require_room_store(&self) -> Result<Arc<dyn RoomStore>, ServiceError> {
        self.room_store().await.ok_or(ServiceError::Degraded)
    }

    /// Install a new room store implementation and leave degraded mode.
    pub async fn install_room_store(&self, store: Arc<dyn RoomStore>) {
        {
            let mut guard = self.room_store.write().await;
            *guard = Some(store);
        }
        self.update_degraded(false);
    }

    /// Remove the current room store and enter degraded mode.
    pub async fn clear_room_store(&self) {
        {
            let mut guard = self.room_store.write().await;
            guard.take();
        }
        self.update_degraded(true);
    }

    /// Current degraded flag.
    pub async fn is_degraded(&self) -> bool {
        let guard = self.room_store.read().await;
        guard.is_none()
    }

    /// Subscribe to degraded mode updates.
    pub fn degraded_watcher(&self) -> watch::Receiver<bool> {
        self.degraded.subscribe()
    }

    /// Broadcast hub feeding the lobby SSE stream.
    pub fn lobby_sse(&self) -> &SseHub {
        &self.lobby_sse
    }

    /// Registry of active WebSocket sessions keyed by connection id.
    pub fn sessions(&self) -> &DashMap<uuid::Uuid, Session> {
        &self.sessions
    }

    /// Sessions currently attached to the given room.
    pub fn sessions_in_room(&self, room_id: &str) -> Vec<Session> {
        self.sessions
            .iter()
            .filter(|entry| entry.value().room_id == room_id)
            .map(|entry| entry.value().clone())
            .collect()
    }

    /// Sweep-side view of per-room activity.
    pub fn activity(&self) -> &ActivityTracker {
        &self.activity
    }

    /// Per-player heartbeat timestamps.
    pub fn heartbeats(&self) -> &HeartbeatTracker {
        &self.heartbeats
    }

    /// Per-room countdown tasks.
    pub fn timers(&self) -> &TimerRegistry {
        &self.timers
    }

    /// Mutex serialising mutations of a single room.
    pub fn room_lock(&self, room_id: &str) -> Arc<Mutex<()>> {
        self.room_locks
            .entry(room_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Drop every in-memory trace of a room after it has been deleted from
    /// the store.
    pub fn forget_room(&self, room_id: &str) {
        self.timers.cancel(room_id);
        self.activity.forget(room_id);
        self.room_locks.remove(room_id);
    }

    /// Load a room, apply `mutate` under the room lock, stamp its activity,
    /// and persist the result. Returns the saved room alongside the closure's
    /// value so callers can broadcast a consistent snapshot.
    pub async fn with_room<F, T>(&self, room_id: &str, mutate: F) -> Result<(Room, T), ServiceError>
    where
        F: FnOnce(&mut Room) -> Result<T, ServiceError>,
    {
        let store = self.require_room_store().await?;
        let lock = self.room_lock(room_id);
        let _guard = lock.lock().await;

        let Some(mut room) = store.find_room(room_id).await? else {
            // Lookups for unknown ids must not leave a lock entry behind.
            // Strong count 2 means nobody but the map and us holds the mutex.
            drop(_guard);
            self.room_locks
                .remove_if(room_id, |_, entry| Arc::strong_count(entry) == 2);
            return Err(ServiceError::NotFound(format!("room {room_id} not found")));
        };

        let value = mutate(&mut room)?;

        room.last_activity = SystemTime::now();
        self.activity.touch(room_id);
        store.save_room(room.clone()).await?;
        Ok((room, value))
    }

    /// Update and broadcast the degraded flag when the value changes.
    fn update_degraded(&self, value: bool) {
        self.degraded.send_if_modified(|current| {
            let changed = *current != value;
            *current = value;
            changed
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{config::AppConfig, dao::room_store::memory::MemoryRoomStore};

    #[tokio::test]
    async fn degraded_mode_tracks_store_installation() {
        let state = AppState::new(AppConfig::default());
        assert!(state.is_degraded().await);
        assert!(matches!(
            state.require_room_store().await,
            Err(ServiceError::Degraded)
        ));

        let mut watcher = state.degraded_watcher();
        state
            .install_room_store(Arc::new(MemoryRoomStore::new()))
            .await;
        assert!(!state.is_degraded().await);
        watcher.changed().await.unwrap();
        assert!(!*watcher.borrow());

        state.clear_room_store().await;
        assert!(state.is_degraded().await);
        watcher.changed().await.unwrap();
        assert!(*watcher.borrow());
    }

    #[tokio::test]
    async fn with_room_reports_missing_rooms() {
        let state = AppState::new(AppConfig::default());
        state
            .install_room_store(Arc::new(MemoryRoomStore::new()))
            .await;
        let err = state.with_room("NOPE", |_| Ok(())).await.unwrap_err();
        assert!(matches!(err, ServiceError::NotFound(_)));
    }

    #[tokio::test]
    async fn missing_room_lookups_leave_no_lock_behind() {
        let state = AppState::new(AppConfig::default());
        state
            .install_room_store(Arc::new(MemoryRoomStore::new()))
            .await;

        for _ in 0..3 {
            let _ = state.with_room("GHOST1", |_| Ok(())).await;
        }
        assert!(!state.room_locks.contains_key("GHOST1"));
    }
}
