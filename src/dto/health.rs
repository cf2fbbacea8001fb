use serde::Serialize;
use utoipa::ToSchema;

/// Response payload of the healthcheck endpoint.
#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    /// Overall service status (`ok` or `degraded`).
    pub status: &'static str,
    /// Whether the storage backend answered its health probe.
    pub storage: bool,
    /// Number of rooms currently held by the store, when reachable.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rooms: Option<usize>,
}

impl HealthResponse {
    /// Healthy response with the current room count.
    pub fn ok(rooms: usize) -> Self {
        Self {
            status: "ok",
            storage: true,
            rooms: Some(rooms),
        }
    }

    /// Degraded response, storage unreachable or uninstalled.
    pub fn degraded() -> Self {
        Self {
            status: "degraded",
            storage: false,
            rooms: None,
        }
    }
}
