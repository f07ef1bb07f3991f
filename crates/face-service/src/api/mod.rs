pub mod error;
pub mod routes;

use crate::state::FaceServiceState;
use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use tower_http::trace::TraceLayer;

/// Largest accepted frame upload
pub const MAX_FRAME_BYTES: usize = 15 * 1024 * 1024;

/// Build the API router
pub fn router(state: FaceServiceState) -> Router {
    Router::new()
        // Health and metrics endpoints
        .route("/healthz", get(routes::healthz))
        .route("/readyz", get(routes::readyz))
        .route("/metrics", get(routes::metrics))
        // Source endpoints
        .route("/v1/sources", get(routes::list_sources))
        .route("/v1/sources/:id", get(routes::get_source))
        .route(
            "/v1/sources/:id/frames",
            post(routes::submit_frame).layer(DefaultBodyLimit::max(MAX_FRAME_BYTES)),
        )
        // Event history
        .route("/v1/events", get(routes::recent_events))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
