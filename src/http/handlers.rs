use super::state::AppState;
use crate::service::ServiceStatus;
use crate::session::SessionRecord;
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json},
};
use serde::{Deserialize, Serialize};
use tracing::{error, info};

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Serialize, Deserialize)]
pub struct LifecycleResponse {
    /// "started", "stopped", "already_started" or "already_stopped"
    pub status: String,
    pub monitor: ServiceStatus,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

// ============================================================================
// Handlers
// ============================================================================

/// GET /health
/// Health check endpoint
pub async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

/// GET /status
pub async fn get_status(State(state): State<AppState>) -> Json<ServiceStatus> {
    Json(state.service.status())
}

/// GET /sessions
/// Session history, newest first
pub async fn list_sessions(State(state): State<AppState>) -> Json<Vec<SessionRecord>> {
    Json(state.service.log().snapshot())
}

/// DELETE /sessions
pub async fn clear_sessions(State(state): State<AppState>) -> StatusCode {
    state.service.log().clear();
    StatusCode::NO_CONTENT
}

/// POST /monitor/start
pub async fn start_monitoring(State(state): State<AppState>) -> impl IntoResponse {
    match state.service.start().await {
        Ok(started) => {
            let status = if started { "started" } else { "already_started" };
            info!("Start requested over HTTP: {}", status);
            (
                StatusCode::OK,
                Json(LifecycleResponse {
                    status: status.to_string(),
                    monitor: state.service.status(),
                }),
            )
                .into_response()
        }
        Err(e) => {
            error!("Failed to start monitoring: {:#}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse {
                    error: format!("Failed to start monitoring: {:#}", e),
                }),
            )
                .into_response()
        }
    }
}

/// POST /monitor/stop
pub async fn stop_monitoring(State(state): State<AppState>) -> impl IntoResponse {
    match state.service.stop().await {
        Ok(stopped) => {
            let status = if stopped { "stopped" } else { "already_stopped" };
            info!("Stop requested over HTTP: {}", status);
            (
                StatusCode::OK,
                Json(LifecycleResponse {
                    status: status.to_string(),
                    monitor: state.service.status(),
                }),
            )
                .into_response()
        }
        Err(e) => {
            error!("Failed to stop monitoring: {:#}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse {
                    error: format!("Failed to stop monitoring: {:#}", e),
                }),
            )
                .into_response()
        }
    }
}
