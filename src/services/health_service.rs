use tracing::warn;

use crate::{dto::health::HealthResponse, state::SharedState};

/// Probe the storage backend and report the service status.
pub async fn check(state: &SharedState) -> HealthResponse {
    let Some(store) = state.room_store().await else {
        return HealthResponse::degraded();
    };

    if let Err(err) = store.health_check().await {
        warn!(error = %err, "storage health probe failed");
        return HealthResponse::degraded();
    }

    match store.list_rooms().await {
        Ok(rooms) => HealthResponse::ok(rooms.len()),
        Err(err) => {
            warn!(error = %err, "failed to count rooms");
            HealthResponse::degraded()
        }
    }
}
