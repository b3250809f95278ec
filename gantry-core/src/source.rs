//! Pipeline definition sources
//!
//! A source is asked for a fresh definition on every run submission, so an
//! edited document takes effect on the next run while runs already in flight
//! keep the definition they were started with.

use crate::domain::pipeline::PipelineDefinition;
use crate::error::DefinitionError;

/// Provides the pipeline definition for new runs
pub trait PipelineSource: Send + Sync {
    /// Loads and parses the definition
    ///
    /// Parse failures are reported as [`DefinitionError::Invalid`]; graph
    /// validation happens after loading.
    fn load(&self) -> Result<PipelineDefinition, DefinitionError>;

    /// Human-readable description of where definitions come from
    fn describe(&self) -> String;
}

/// A source that always yields the same, already-built definition
#[derive(Debug, Clone)]
pub struct StaticSource {
    definition: PipelineDefinition,
}

impl StaticSource {
    pub fn new(definition: PipelineDefinition) -> Self {
        Self { definition }
    }
}

impl PipelineSource for StaticSource {
    fn load(&self) -> Result<PipelineDefinition, DefinitionError> {
        Ok(self.definition.clone())
    }

    fn describe(&self) -> String {
        format!("static definition '{}'", self.definition.name)
    }
}
