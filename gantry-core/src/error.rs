//! Structural errors raised while loading a pipeline definition
//!
//! Any of these rejects a submission before a single stage starts.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DefinitionError {
    /// The document could not be parsed, or violates a per-stage rule
    #[error("invalid pipeline definition: {0}")]
    Invalid(String),

    /// Gating edges form a cycle; `cycle` lists the stages in order, with the
    /// first stage repeated at the end
    #[error("cyclic stage dependency: {}", .cycle.join(" -> "))]
    CyclicDependency { cycle: Vec<String> },

    /// A stage names a prerequisite that does not exist
    #[error("stage '{stage}' depends on unknown stage '{prerequisite}'")]
    UnknownStage { stage: String, prerequisite: String },
}

impl DefinitionError {
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::Invalid(message.into())
    }

    /// Stable machine-readable name, used in API error bodies
    pub fn kind(&self) -> &'static str {
        match self {
            DefinitionError::Invalid(_) => "invalid_definition",
            DefinitionError::CyclicDependency { .. } => "cyclic_dependency",
            DefinitionError::UnknownStage { .. } => "unknown_stage",
        }
    }
}
