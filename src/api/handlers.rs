use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde::Serialize;
use std::sync::Arc;

use crate::daemon::{DaemonScheduler, JobSnapshot};
use crate::storage::{DiscrepancyFilter, MetricStore, StoreError};

/// Application state shared across handlers
pub struct AppState {
    pub scheduler: Arc<DaemonScheduler>,
    pub store: Arc<dyn MetricStore>,
}

// ============================================================================
// Health Check
// ============================================================================

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}

pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
    })
}

// ============================================================================
// Status
// ============================================================================

#[derive(Serialize)]
pub struct StatusResponse {
    pub running: bool,
    pub jobs: Vec<JobSnapshot>,
    pub open_discrepancies: usize,
    pub unsent_notifications: usize,
}

pub async fn status(State(state): State<Arc<AppState>>) -> Result<Json<StatusResponse>, ApiError> {
    let open_discrepancies = state.store.discrepancies(DiscrepancyFilter::Open).await?.len();
    let unsent_notifications = state.store.unsent_notifications().await?.len();

    Ok(Json(StatusResponse {
        running: state.scheduler.is_running(),
        jobs: state.scheduler.status(),
        open_discrepancies,
        unsent_notifications,
    }))
}

// ============================================================================
// Error Handling
// ============================================================================

#[derive(Debug)]
pub enum ApiError {
    Internal(String),
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        ApiError::Internal(e.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let (status, message) = match self {
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };

        let body = serde_json::json!({
            "error": message
        });

        (status, Json(body)).into_response()
    }
}
