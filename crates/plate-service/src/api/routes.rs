use crate::error::{ApiError, SessionError};
use crate::plate::PipelineConfig;
use crate::state::{FrameResponse, PlateServiceState};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use common::sessions::{
    FrameSubmission, SessionCreateRequest, SessionCreateResponse, SessionInfo,
    SessionListResponse,
};
use serde_json::json;

/// Open a new camera session
pub async fn create_session(
    State(state): State<PlateServiceState>,
    Json(request): Json<SessionCreateRequest>,
) -> impl IntoResponse {
    match state.create_session(request).await {
        Ok(info) => {
            let response = SessionCreateResponse {
                accepted: true,
                session_id: Some(info.id.clone()),
                message: Some(format!("Session '{}' created", info.id)),
            };
            (StatusCode::CREATED, Json(response))
        }
        Err(e) => {
            tracing::warn!("Failed to create session: {}", e);
            let message = format!("Failed to create session: {}", e);
            let response = SessionCreateResponse {
                accepted: false,
                session_id: None,
                message: Some(message),
            };
            (ApiError::from(e).status(), Json(response))
        }
    }
}

/// Close a session
pub async fn remove_session(
    State(state): State<PlateServiceState>,
    Path(session_id): Path<String>,
) -> Result<StatusCode, ApiError> {
    state.remove_session(&session_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Get information about a specific session
pub async fn get_session(
    State(state): State<PlateServiceState>,
    Path(session_id): Path<String>,
) -> Result<Json<SessionInfo>, ApiError> {
    state
        .get_session(&session_id)
        .await
        .map(Json)
        .ok_or_else(|| SessionError::NotFound(session_id).into())
}

/// List all sessions
pub async fn list_sessions(State(state): State<PlateServiceState>) -> impl IntoResponse {
    let sessions = state.list_sessions().await;
    (StatusCode::OK, Json(SessionListResponse { sessions }))
}

/// Clear a session's detection memory and last accepted plate
pub async fn restart_session(
    State(state): State<PlateServiceState>,
    Path(session_id): Path<String>,
) -> Result<Json<SessionInfo>, ApiError> {
    Ok(Json(state.restart_session(&session_id).await?))
}

/// Submit one frame of OCR output to a session
pub async fn submit_frame(
    State(state): State<PlateServiceState>,
    Path(session_id): Path<String>,
    Json(submission): Json<FrameSubmission>,
) -> Result<Json<FrameResponse>, ApiError> {
    let response = state.submit_frame(&session_id, submission).await?;
    Ok(Json(response))
}

/// JSON schema of the per-session pipeline config
pub async fn config_schema() -> impl IntoResponse {
    (StatusCode::OK, Json(PipelineConfig::config_schema()))
}

/// Health check endpoint
pub async fn healthz() -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(json!({
            "status": "healthy",
            "service": "plate-service"
        })),
    )
}

/// Readiness check endpoint
pub async fn readyz(State(state): State<PlateServiceState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(json!({
            "status": "ready",
            "node_id": state.node_id(),
            "site_id": state.site_id(),
            "sessions": state.session_count().await,
            "transport": state.has_transport(),
        })),
    )
}

/// Metrics endpoint (Prometheus format)
pub async fn metrics() -> impl IntoResponse {
    match telemetry::metrics::encode_metrics() {
        Ok(body) => body.into_response(),
        Err(e) => {
            tracing::error!("Failed to encode metrics: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to encode metrics",
            )
                .into_response()
        }
    }
}
