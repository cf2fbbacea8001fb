use axum::Router;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::{services::documentation::ApiDoc, state::SharedState};

/// Path the generated OpenAPI document is served from. The Swagger UI at
/// `/docs` loads its schema from here.
const OPENAPI_JSON: &str = "/api-doc/openapi.json";

/// Serve the interactive API explorer for the room server.
pub fn router(state: SharedState) -> Router<SharedState> {
    let explorer: Router<SharedState> =
        SwaggerUi::new("/docs").url(OPENAPI_JSON, ApiDoc::openapi()).into();

    explorer.with_state(state)
}
