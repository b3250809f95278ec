//! API Module
//!
//! HTTP API layer for the orchestrator.
//! Each submodule handles endpoints for a specific domain.

pub mod error;
pub mod health;
pub mod log;
pub mod pipeline;
pub mod run;

use std::sync::Arc;

use axum::{
    Router,
    routing::{get, post},
};
use gantry_runner::RunManager;
use tower_http::trace::TraceLayer;

/// Shared handler state
#[derive(Clone)]
pub struct AppState {
    pub manager: Arc<RunManager>,
}

impl AppState {
    pub fn new(manager: RunManager) -> Self {
        Self {
            manager: Arc::new(manager),
        }
    }
}

/// Create the main API router with all endpoints
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health check
        .route("/health", get(health::health_check))
        // Pipeline endpoints
        .route("/pipeline", get(pipeline::get_pipeline))
        // Run endpoints
        .route("/runs", post(run::submit_run))
        .route("/runs", get(run::list_runs))
        .route("/runs/{id}", get(run::get_run))
        .route("/runs/{id}/cancel", post(run::cancel_run))
        .route("/runs/{id}/logs", get(run::get_run_logs))
        // Captured output
        .route("/logs", get(log::get_output))
        // Add state and middleware
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}
