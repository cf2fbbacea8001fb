//! Library crate for word-rally-back, exposing modules for binaries and integration tests.

/// Runtime configuration loading.
pub mod config;
/// Persistence layer.
pub mod dao;
/// Wire-level data transfer objects.
pub mod dto;
/// Error types shared between services and routes.
pub mod error;
/// HTTP, WebSocket, and SSE route trees.
pub mod routes;
/// Application services.
pub mod services;
/// Shared application state and the room domain model.
pub mod state;
