//! Pipeline DTOs

use serde::{Deserialize, Serialize};

use crate::domain::pipeline::{FailurePolicy, PipelineDefinition};
use crate::graph::PipelineGraph;
use crate::trigger::TriggerPolicy;

/// Read-only view of the active pipeline definition
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineView {
    pub name: String,
    pub description: Option<String>,
    pub triggers: TriggerPolicy,
    pub stages: Vec<StageView>,
    /// Stage names grouped into topological batches
    pub batches: Vec<Vec<String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageView {
    pub name: String,
    pub needs: Vec<String>,
    pub failure_policy: FailurePolicy,
    pub steps: Vec<String>,
}

impl PipelineView {
    pub fn new(definition: &PipelineDefinition, graph: &PipelineGraph) -> Self {
        Self {
            name: definition.name.clone(),
            description: definition.description.clone(),
            triggers: definition.triggers.clone(),
            stages: definition
                .stages
                .iter()
                .map(|stage| StageView {
                    name: stage.name.clone(),
                    needs: stage.needs.clone(),
                    failure_policy: stage.failure_policy,
                    steps: stage
                        .steps
                        .iter()
                        .map(|step| step.display_name().to_string())
                        .collect(),
                })
                .collect(),
            batches: graph
                .topological_batches()
                .map(|batch| batch.into_iter().map(str::to_string).collect())
                .collect(),
        }
    }
}
