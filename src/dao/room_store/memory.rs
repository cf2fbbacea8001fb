use std::sync::Arc;

use dashmap::DashMap;
use futures::future::BoxFuture;

use crate::dao::room_store::RoomStore;
use crate::dao::storage::StorageResult;
use crate::state::room::Room;

/// In-memory room store backed by a concurrent map.
///
/// The default backend: room state only needs to outlive individual
/// connections, not the process, so a shared map is sufficient. The trait
/// boundary keeps the door open for a database-backed store.
#[derive(Debug, Default)]
pub struct MemoryRoomStore {
    rooms: Arc<DashMap<String, Room>>,
}

impl MemoryRoomStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

impl RoomStore for MemoryRoomStore {
    fn save_room(&self, room: Room) -> BoxFuture<'static, StorageResult<()>> {
        let rooms = self.rooms.clone();
        Box::pin(async move {
            rooms.insert(room.id.clone(), room);
            Ok(())
        })
    }

    fn find_room(&self, id: &str) -> BoxFuture<'static, StorageResult<Option<Room>>> {
        let rooms = self.rooms.clone();
        let id = id.to_string();
        Box::pin(async move { Ok(rooms.get(&id).map(|entry| entry.value().clone())) })
    }

    fn find_room_by_player(
        &self,
        player_id: &str,
    ) -> BoxFuture<'static, StorageResult<Option<Room>>> {
        let rooms = self.rooms.clone();
        let player_id = player_id.to_string();
        Box::pin(async move {
            Ok(rooms
                .iter()
                .find(|entry| entry.value().players.contains_key(&player_id))
                .map(|entry| entry.value().clone()))
        })
    }

    fn delete_room(&self, id: &str) -> BoxFuture<'static, StorageResult<bool>> {
        let rooms = self.rooms.clone();
        let id = id.to_string();
        Box::pin(async move { Ok(rooms.remove(&id).is_some()) })
    }

    fn list_rooms(&self) -> BoxFuture<'static, StorageResult<Vec<Room>>> {
        let rooms = self.rooms.clone();
        Box::pin(async move { Ok(rooms.iter().map(|entry| entry.value().clone()).collect()) })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        Box::pin(async { Ok(()) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn round_trips_rooms_and_finds_by_player() {
        use crate::state::room::Player;

        let store = MemoryRoomStore::new();
        let mut room = Room::new("ABC123".into(), 100);
        room.players
            .insert("p1".into(), Player::new("p1".into(), "Alice".into(), true));
        store.save_room(room).await.unwrap();

        assert!(store.find_room("ABC123").await.unwrap().is_some());
        assert!(store.find_room("NOPE").await.unwrap().is_none());

        let by_player = store.find_room_by_player("p1").await.unwrap().unwrap();
        assert_eq!(by_player.id, "ABC123");
        assert!(store.find_room_by_player("p2").await.unwrap().is_none());

        assert!(store.delete_room("ABC123").await.unwrap());
        assert!(!store.delete_room("ABC123").await.unwrap());
    }
}
