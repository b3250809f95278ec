//! Runner error types

use gantry_core::domain::run::RunId;
use gantry_core::{AdmissionDecision, DefinitionError};
use thiserror::Error;

use crate::cache::CacheError;
use crate::logs::LogStoreError;

/// Why a submission did not start a run
#[derive(Debug, Error)]
pub enum SubmitError {
    /// The trigger policy did not admit the event
    #[error("event rejected: {}", .0.reason)]
    Rejected(AdmissionDecision),

    /// The pipeline definition could not be loaded or validated
    #[error(transparent)]
    Definition(#[from] DefinitionError),
}

/// Errors from run queries and setup
#[derive(Debug, Error)]
pub enum RunError {
    #[error("run {0} not found")]
    NotFound(RunId),

    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error(transparent)]
    Logs(#[from] LogStoreError),
}
