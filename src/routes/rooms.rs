use axum::{Json, Router, extract::State, routing::get};

use crate::{
    dto::room::AvailableRoom, error::AppError, services::room_service, state::SharedState,
};

#[utoipa::path(
    get,
    path = "/rooms",
    tag = "rooms",
    responses((status = 200, description = "Joinable lobby rooms", body = [AvailableRoom]))
)]
/// List rooms a newcomer can join right now.
pub async fn list_rooms(
    State(state): State<SharedState>,
) -> Result<Json<Vec<AvailableRoom>>, AppError> {
    let rooms = room_service::available_rooms(&state).await?;
    Ok(Json(rooms))
}

/// Configure the room discovery subtree.
pub fn router() -> Router<SharedState> {
    Router::<SharedState>::new().route("/rooms", get(list_rooms))
}
