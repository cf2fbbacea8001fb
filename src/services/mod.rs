/// Background sweep closing idle rooms and reaping ghosts.
pub mod cleanup_service;
/// OpenAPI documentation generation.
pub mod documentation;
/// Broadcast helpers for room WebSockets and the lobby SSE stream.
pub mod events;
/// Mode configuration, scoring, and the practice clock.
pub mod game_service;
/// Health check service.
pub mod health_service;
/// Room lifecycle: creation, seating, departure, discovery.
pub mod room_service;
/// Server-Sent Events broadcasting service.
pub mod sse_service;
/// Cooperative turn coordination and the challenge countdown.
pub mod turn_service;
/// WebSocket connection and message handling service.
pub mod websocket_service;
