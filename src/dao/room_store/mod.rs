pub mod memory;

use futures::future::BoxFuture;

use crate::dao::storage::StorageResult;
use crate::state::room::Room;

/// Abstraction over the persistence layer for room records.
///
/// Each room is stored as a single record, players included, so writes that
/// touch both room and player fields land atomically. Callers serialize
/// read-modify-write cycles per room through the state layer's room locks.
pub trait RoomStore: Send + Sync {
    /// Insert or replace a room record.
    fn save_room(&self, room: Room) -> BoxFuture<'static, StorageResult<()>>;
    /// Fetch a room by its code.
    fn find_room(&self, id: &str) -> BoxFuture<'static, StorageResult<Option<Room>>>;
    /// Fetch the room a player currently belongs to, if any.
    fn find_room_by_player(&self, player_id: &str)
    -> BoxFuture<'static, StorageResult<Option<Room>>>;
    /// Delete a room record, reporting whether it existed.
    fn delete_room(&self, id: &str) -> BoxFuture<'static, StorageResult<bool>>;
    /// List every stored room.
    fn list_rooms(&self) -> BoxFuture<'static, StorageResult<Vec<Room>>>;
    /// Ping the backend.
    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>>;
}
