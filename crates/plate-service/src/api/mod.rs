pub mod routes;

use crate::state::PlateServiceState;
use axum::{routing::{get, post}, Router};
use tower_http::trace::TraceLayer;

/// Build the API router
pub fn router(state: PlateServiceState) -> Router {
    Router::new()
        // Health and metrics endpoints
        .route("/healthz", get(routes::healthz))
        .route("/readyz", get(routes::readyz))
        .route("/metrics", get(routes::metrics))
        // Pipeline configuration
        .route("/v1/config/schema", get(routes::config_schema))
        // Session endpoints
        .route(
            "/v1/sessions",
            get(routes::list_sessions).post(routes::create_session),
        )
        .route(
            "/v1/sessions/:id",
            get(routes::get_session).delete(routes::remove_session),
        )
        .route("/v1/sessions/:id/restart", post(routes::restart_session))
        .route("/v1/sessions/:id/frames", post(routes::submit_frame))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
