use std::time::SystemTime;
use time::{OffsetDateTime, format_description::well_known::Rfc3339};

/// Health check payloads.
pub mod health;
/// Room and player projections shared by REST, SSE, and WebSocket surfaces.
pub mod room;
/// Server-sent event envelope and lobby stream payloads.
pub mod sse;
/// Validation helpers for client-supplied identifiers.
pub mod validation;
/// WebSocket message types.
pub mod ws;

fn format_system_time(time: SystemTime) -> String {
    OffsetDateTime::from(time)
        .format(&Rfc3339)
        .unwrap_or_else(|_| "invalid-timestamp".into())
}
