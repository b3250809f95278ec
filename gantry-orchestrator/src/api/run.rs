//! Run API Handlers
//!
//! HTTP endpoints for submitting, inspecting and cancelling runs.

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use gantry_core::domain::log::LogEntry;
use gantry_core::domain::run::{RunState, RunSummary};
use gantry_core::dto::run::{CancelRunResponse, SubmitRunRequest, SubmitRunResponse};
use uuid::Uuid;

use crate::api::AppState;
use crate::api::error::{ApiError, ApiResult};

/// POST /runs
/// Submit an event; starts a run when the trigger policy admits it
pub async fn submit_run(
    State(state): State<AppState>,
    Json(req): Json<SubmitRunRequest>,
) -> ApiResult<(StatusCode, Json<SubmitRunResponse>)> {
    tracing::info!(
        "Received {} event for branch {}",
        req.event.kind.as_deref().unwrap_or("<missing>"),
        req.event.branch.as_deref().unwrap_or("<missing>")
    );

    let response = state.manager.submit_run(req.event)?;

    Ok((StatusCode::CREATED, Json(response)))
}

/// GET /runs
/// List run summaries, newest first
pub async fn list_runs(State(state): State<AppState>) -> Json<Vec<RunSummary>> {
    tracing::debug!("Listing runs");
    Json(state.manager.list_runs())
}

/// GET /runs/{id}
/// Snapshot of a run's state
pub async fn get_run(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<RunState>> {
    tracing::debug!("Getting run: {}", id);

    state
        .manager
        .get_run_state(id)
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("Run {} not found", id)))
}

/// POST /runs/{id}/cancel
/// Request cooperative cancellation
pub async fn cancel_run(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<CancelRunResponse>> {
    tracing::info!("Cancelling run: {}", id);

    let response = state.manager.cancel_run(id)?;
    Ok(Json(response))
}

/// GET /runs/{id}/logs
/// Run event log
pub async fn get_run_logs(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Vec<LogEntry>>> {
    tracing::debug!("Getting logs for run: {}", id);

    let logs = state.manager.run_logs(id)?;
    Ok(Json(logs))
}
