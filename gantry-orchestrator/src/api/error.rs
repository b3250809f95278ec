//! API Error Handling
//!
//! Unified error types and conversion for API responses.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use gantry_core::{AdmissionReason, DefinitionError};
use gantry_runner::{CacheError, LogStoreError, RunError, SubmitError};

/// API error type
#[derive(Debug)]
pub enum ApiError {
    NotFound(String),
    BadRequest(String),
    /// The trigger policy did not admit the event
    Rejected(AdmissionReason),
    /// The pipeline definition failed to load or validate
    Definition(DefinitionError),
    InternalError(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            ApiError::NotFound(msg) => {
                (StatusCode::NOT_FOUND, serde_json::json!({ "error": msg }))
            }
            ApiError::BadRequest(msg) => {
                (StatusCode::BAD_REQUEST, serde_json::json!({ "error": msg }))
            }
            ApiError::Rejected(reason) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                serde_json::json!({
                    "error": format!("event rejected: {}", reason),
                    "reason": reason,
                }),
            ),
            ApiError::Definition(err) => {
                tracing::warn!("Pipeline definition error: {}", err);
                (
                    StatusCode::UNPROCESSABLE_ENTITY,
                    serde_json::json!({
                        "error": err.to_string(),
                        "kind": err.kind(),
                    }),
                )
            }
            ApiError::InternalError(msg) => {
                tracing::error!("Internal error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    serde_json::json!({ "error": msg }),
                )
            }
        };

        (status, Json(body)).into_response()
    }
}

impl From<DefinitionError> for ApiError {
    fn from(err: DefinitionError) -> Self {
        ApiError::Definition(err)
    }
}

impl From<SubmitError> for ApiError {
    fn from(err: SubmitError) -> Self {
        match err {
            SubmitError::Rejected(decision) => ApiError::Rejected(decision.reason),
            SubmitError::Definition(err) => ApiError::Definition(err),
        }
    }
}

impl From<RunError> for ApiError {
    fn from(err: RunError) -> Self {
        match err {
            RunError::NotFound(id) => ApiError::NotFound(format!("Run {} not found", id)),
            RunError::Logs(LogStoreError::NotFound(log_ref)) => {
                ApiError::NotFound(format!("Output {} not found", log_ref))
            }
            RunError::Cache(CacheError::NotFound(content_ref)) => {
                ApiError::NotFound(format!("Cache object {} not found", content_ref))
            }
            other => ApiError::InternalError(other.to_string()),
        }
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_status_codes() {
        let cases = [
            (ApiError::NotFound("x".into()), StatusCode::NOT_FOUND),
            (ApiError::BadRequest("x".into()), StatusCode::BAD_REQUEST),
            (
                ApiError::Rejected(AdmissionReason::UntrackedBranch),
                StatusCode::UNPROCESSABLE_ENTITY,
            ),
            (
                ApiError::Definition(DefinitionError::invalid("x")),
                StatusCode::UNPROCESSABLE_ENTITY,
            ),
            (
                ApiError::InternalError("x".into()),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];

        for (err, expected) in cases {
            assert_eq!(err.into_response().status(), expected);
        }
    }

    #[test]
    fn test_unknown_run_maps_to_not_found() {
        let err: ApiError = RunError::NotFound(Uuid::nil()).into();
        assert!(matches!(err, ApiError::NotFound(_)));
    }
}
