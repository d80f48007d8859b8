//! Health, status and manual-trigger endpoints.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::json;

use crate::error::JobError;
use crate::jobs::JobRegistry;

#[derive(Clone)]
pub struct JobRouteState {
    pub registry: Arc<JobRegistry>,
}

/// GET /
async fn index() -> impl IntoResponse {
    Json(json!({
        "service": "vet-reactivation",
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": [
            "GET /health",
            "GET /status",
            "POST /jobs/{name}/run",
            "GET /api/dashboard/stats",
            "GET /api/dashboard/recent-messages",
            "GET /api/dashboard/stats-by-day",
            "GET /api/dashboard/top-customers"
        ]
    }))
}

/// GET /health
async fn health() -> impl IntoResponse {
    Json(json!({"status": "ok"}))
}

/// GET /status
///
/// Every job with its running flag, last run timestamps and last report.
async fn status(State(state): State<JobRouteState>) -> impl IntoResponse {
    Json(json!({
        "success": true,
        "data": { "jobs": state.registry.status() }
    }))
}

/// POST /jobs/{name}/run
///
/// Runs the job and answers with its report once it finishes.
async fn run_job(
    State(state): State<JobRouteState>,
    Path(name): Path<String>,
) -> impl IntoResponse {
    match state.registry.run_named(&name).await {
        Ok(report) => (
            StatusCode::OK,
            Json(json!({"success": true, "job": name, "data": report})),
        ),
        Err(e) => {
            let status = match e {
                JobError::Unknown(_) => StatusCode::NOT_FOUND,
                JobError::AlreadyRunning(_) => StatusCode::CONFLICT,
                JobError::InvalidSchedule { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            };
            (status, Json(json!({"success": false, "error": e.to_string()})))
        }
    }
}

pub fn job_routes(state: JobRouteState) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/health", get(health))
        .route("/status", get(status))
        .route("/jobs/{name}/run", post(run_job))
        .with_state(state)
}
