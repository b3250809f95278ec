//! Captured Output API Handler

use axum::extract::{Query, State};
use gantry_core::domain::log::LogRef;
use serde::Deserialize;

use crate::api::AppState;
use crate::api::error::{ApiError, ApiResult};

#[derive(Debug, Deserialize)]
pub struct OutputQuery {
    pub log_ref: String,
}

/// GET /logs?log_ref=...
/// Returns captured step or stage output as text
pub async fn get_output(
    State(state): State<AppState>,
    Query(query): Query<OutputQuery>,
) -> ApiResult<String> {
    let log_ref = LogRef::parse(&query.log_ref)
        .ok_or_else(|| ApiError::BadRequest(format!("Invalid log ref '{}'", query.log_ref)))?;

    tracing::debug!("Reading output {}", log_ref);

    let bytes = state.manager.read_output(&log_ref)?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}
