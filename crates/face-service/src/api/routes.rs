use super::error::ApiError;
use crate::error::RecognitionError;
use crate::state::{FaceServiceState, FrameError};
use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use common::faces::SourceListResponse;
use serde::Deserialize;
use serde_json::json;

const DEFAULT_EVENT_LIMIT: usize = 50;

/// Health check endpoint
pub async fn healthz() -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(json!({
            "status": "healthy",
            "service": "face-service"
        })),
    )
}

/// Readiness check endpoint
pub async fn readyz(State(state): State<FaceServiceState>) -> impl IntoResponse {
    let search_healthy = state.search_healthy().await;
    let sources = state.source_count().await;

    let status = if search_healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        status,
        Json(json!({
            "status": if search_healthy { "ready" } else { "not ready" },
            "node_id": state.node_id(),
            "provider": state.provider(),
            "sources": sources
        })),
    )
}

/// Metrics endpoint (Prometheus format)
pub async fn metrics() -> Result<String, ApiError> {
    telemetry::metrics::encode_metrics().map_err(|e| {
        tracing::error!("Failed to encode metrics: {}", e);
        ApiError::internal("Failed to encode metrics")
    })
}

/// List all sources with their current state
pub async fn list_sources(State(state): State<FaceServiceState>) -> impl IntoResponse {
    let sources = state.list_states().await;
    (StatusCode::OK, Json(SourceListResponse { sources }))
}

/// Get the state of one source
pub async fn get_source(
    State(state): State<FaceServiceState>,
    Path(source_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let processor = state
        .get(&source_id)
        .await
        .ok_or_else(|| ApiError::not_found(format!("Source '{}' not found", source_id)))?;

    Ok(Json(processor.state().await))
}

/// Run one recognition cycle on the raw image in the request body
pub async fn submit_frame(
    State(state): State<FaceServiceState>,
    Path(source_id): Path<String>,
    body: Bytes,
) -> Result<impl IntoResponse, ApiError> {
    match state.process_frame(&source_id, &body).await {
        Ok(report) => Ok(Json(report)),
        Err(FrameError::UnknownSource(id)) => {
            Err(ApiError::not_found(format!("Source '{}' not found", id)))
        }
        Err(FrameError::Rejected(e @ (RecognitionError::EmptyImage | RecognitionError::Decode(_)))) => {
            Err(ApiError::bad_request(format!("Failed to process frame: {}", e)))
        }
        Err(FrameError::Rejected(e)) => {
            tracing::error!("Failed to process frame for source {}: {}", source_id, e);
            Err(ApiError::internal(format!("Failed to process frame: {}", e)))
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct EventQuery {
    pub limit: Option<usize>,
}

/// Most recent face recognised events, oldest first
pub async fn recent_events(
    State(state): State<FaceServiceState>,
    Query(query): Query<EventQuery>,
) -> impl IntoResponse {
    let events = state.recent_events(query.limit.unwrap_or(DEFAULT_EVENT_LIMIT));
    (StatusCode::OK, Json(json!({ "events": events })))
}
