/// Room persistence backends.
pub mod room_store;
/// Backend-agnostic storage errors.
pub mod storage;
