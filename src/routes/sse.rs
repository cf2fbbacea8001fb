use std::convert::Infallible;

use axum::{Router, extract::State, response::sse::Sse, routing::get};
use futures::Stream;
use tracing::{info, warn};

use crate::{
    dto::sse::{Handshake, ServerEvent},
    services::sse_service,
    state::SharedState,
};

#[utoipa::path(
    get,
    path = "/sse/lobby",
    tag = "sse",
    responses((status = 200, description = "Lobby SSE stream", content_type = "text/event-stream", body = String))
)]
/// Stream available-rooms updates to connected frontends.
pub async fn lobby_stream(
    State(state): State<SharedState>,
) -> Sse<impl Stream<Item = Result<axum::response::sse::Event, Infallible>>> {
    let receiver = sse_service::subscribe_lobby(&state);
    info!("New lobby SSE connection");

    let handshake = Handshake {
        stream: "lobby".into(),
        message: "lobby stream connected".into(),
        degraded: state.is_degraded().await,
    };
    match ServerEvent::json("handshake".to_string(), &handshake) {
        Ok(event) => state.lobby_sse().broadcast(event),
        Err(err) => warn!(error = %err, "failed to serialize handshake"),
    }

    sse_service::to_sse_stream(receiver)
}

/// Configure the SSE endpoints.
pub fn router() -> Router<SharedState> {
    Router::<SharedState>::new().route("/sse/lobby", get(lobby_stream))
}
