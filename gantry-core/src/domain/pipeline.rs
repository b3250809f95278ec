//! Pipeline definition types
//!
//! A [`PipelineDefinition`] is loaded once per run and never changes while the
//! run executes. Definitions are assembled through [`PipelineBuilder`], which
//! checks everything that can be checked on a single stage; gating edges are
//! validated separately by [`crate::graph::PipelineGraph`].

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::{Component, Path};

use crate::error::DefinitionError;
use crate::trigger::TriggerPolicy;

/// Full pipeline definition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineDefinition {
    pub name: String,
    pub description: Option<String>,
    #[serde(default)]
    pub triggers: TriggerPolicy,
    pub stages: Vec<StageDefinition>,
}

impl PipelineDefinition {
    /// Starts building a definition with the given pipeline name
    pub fn builder(name: impl Into<String>) -> PipelineBuilder {
        PipelineBuilder {
            name: name.into(),
            description: None,
            triggers: TriggerPolicy::default(),
            stages: Vec::new(),
        }
    }

    /// Looks up a stage by name
    pub fn stage(&self, name: &str) -> Option<&StageDefinition> {
        self.stages.iter().find(|stage| stage.name == name)
    }
}

/// Builder for [`PipelineDefinition`]
#[derive(Debug, Clone)]
pub struct PipelineBuilder {
    name: String,
    description: Option<String>,
    triggers: TriggerPolicy,
    stages: Vec<StageDefinition>,
}

impl PipelineBuilder {
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn triggers(mut self, triggers: TriggerPolicy) -> Self {
        self.triggers = triggers;
        self
    }

    /// Appends a stage; declaration order is kept
    pub fn stage(mut self, stage: StageDefinition) -> Self {
        self.stages.push(stage);
        self
    }

    /// Validates and returns the definition
    ///
    /// # Errors
    /// Returns [`DefinitionError::Invalid`] if:
    /// - The pipeline name is empty
    /// - There are no stages
    /// - Two stages share a name
    /// - A stage has no steps, or a step has an empty command
    /// - A cache block has an empty key
    pub fn build(self) -> Result<PipelineDefinition, DefinitionError> {
        if self.name.trim().is_empty() {
            return Err(DefinitionError::invalid("pipeline name cannot be empty"));
        }

        if self.stages.is_empty() {
            return Err(DefinitionError::invalid(
                "pipeline must have at least one stage",
            ));
        }

        let mut seen = HashSet::new();
        for stage in &self.stages {
            if stage.name.trim().is_empty() {
                return Err(DefinitionError::invalid("stage name cannot be empty"));
            }
            if !seen.insert(stage.name.as_str()) {
                return Err(DefinitionError::invalid(format!(
                    "duplicate stage name '{}'",
                    stage.name
                )));
            }
            stage.validate()?;
        }

        Ok(PipelineDefinition {
            name: self.name,
            description: self.description,
            triggers: self.triggers,
            stages: self.stages,
        })
    }
}

/// How a stage's failure affects the rest of the pipeline
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Failure skips downstream stages and fails the run
    #[default]
    Blocking,
    /// Failure is recorded but never gates downstream stages or the run
    ContinueOnError,
}

impl FailurePolicy {
    pub fn is_blocking(&self) -> bool {
        matches!(self, FailurePolicy::Blocking)
    }
}

/// A named, ordered group of steps with a shared failure policy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageDefinition {
    pub name: String,
    /// Prerequisite stages that must reach a terminal result first
    #[serde(default)]
    pub needs: Vec<String>,
    #[serde(default)]
    pub failure_policy: FailurePolicy,
    #[serde(default)]
    pub environment: BTreeMap<String, String>,
    pub steps: Vec<StepDefinition>,
}

impl StageDefinition {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            needs: Vec::new(),
            failure_policy: FailurePolicy::Blocking,
            environment: BTreeMap::new(),
            steps: Vec::new(),
        }
    }

    /// Adds a prerequisite stage
    pub fn needs(mut self, stage: impl Into<String>) -> Self {
        self.needs.push(stage.into());
        self
    }

    pub fn continue_on_error(mut self) -> Self {
        self.failure_policy = FailurePolicy::ContinueOnError;
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.environment.insert(key.into(), value.into());
        self
    }

    pub fn step(mut self, step: StepDefinition) -> Self {
        self.steps.push(step);
        self
    }

    fn validate(&self) -> Result<(), DefinitionError> {
        if self.steps.is_empty() {
            return Err(DefinitionError::invalid(format!(
                "stage '{}' must have at least one step",
                self.name
            )));
        }

        for (idx, step) in self.steps.iter().enumerate() {
            if step.command.trim().is_empty() {
                return Err(DefinitionError::invalid(format!(
                    "step {} of stage '{}' has an empty command",
                    idx + 1,
                    self.name
                )));
            }
            if let Some(dir) = &step.working_directory {
                if !is_workspace_relative(dir) {
                    return Err(DefinitionError::invalid(format!(
                        "step {} of stage '{}' has working directory '{}' outside the workspace",
                        idx + 1,
                        self.name,
                        dir
                    )));
                }
            }
            if let Some(cache) = &step.cache {
                if cache.key.trim().is_empty() {
                    return Err(DefinitionError::invalid(format!(
                        "step {} of stage '{}' has an empty cache key",
                        idx + 1,
                        self.name
                    )));
                }
            }
        }

        Ok(())
    }
}

/// True for non-empty relative paths without `..` components
fn is_workspace_relative(dir: &str) -> bool {
    !dir.is_empty()
        && Path::new(dir)
            .components()
            .all(|c| matches!(c, Component::Normal(_) | Component::CurDir))
}

/// A single unit of work: one shell command
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepDefinition {
    /// Display name; defaults to the command when absent
    pub name: Option<String>,
    pub command: String,
    /// Directory relative to the workspace root
    pub working_directory: Option<String>,
    pub cache: Option<CacheSpec>,
}

impl StepDefinition {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            name: None,
            command: command.into(),
            working_directory: None,
            cache: None,
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn in_dir(mut self, dir: impl Into<String>) -> Self {
        self.working_directory = Some(dir.into());
        self
    }

    pub fn cached(mut self, cache: CacheSpec) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Name shown in logs and run reports
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.command)
    }
}

/// Cache declaration attached to a step
///
/// The effective cache key is `key` alone when `files` is empty, otherwise
/// `key` suffixed with a digest of the listed files' contents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheSpec {
    pub key: String,
    /// Manifest files (relative to the step directory) hashed into the key
    #[serde(default)]
    pub files: Vec<String>,
    /// Paths (relative to the step directory) saved on success, restored on hit
    #[serde(default)]
    pub paths: Vec<String>,
}

impl CacheSpec {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            files: Vec::new(),
            paths: Vec::new(),
        }
    }

    pub fn hash_file(mut self, file: impl Into<String>) -> Self {
        self.files.push(file.into());
        self
    }

    pub fn path(mut self, path: impl Into<String>) -> Self {
        self.paths.push(path.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stage(name: &str) -> StageDefinition {
        StageDefinition::new(name).step(StepDefinition::new("true"))
    }

    #[test]
    fn test_builder_keeps_declaration_order() {
        let definition = PipelineDefinition::builder("web")
            .stage(stage("backend"))
            .stage(stage("frontend"))
            .stage(stage("integration").needs("backend").needs("frontend"))
            .build()
            .unwrap();

        let names: Vec<_> = definition.stages.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["backend", "frontend", "integration"]);
        assert_eq!(
            definition.stage("integration").unwrap().needs,
            vec!["backend", "frontend"]
        );
    }

    #[test]
    fn test_builder_rejects_empty_pipeline() {
        let err = PipelineDefinition::builder("web").build().unwrap_err();
        assert!(matches!(err, DefinitionError::Invalid(_)));
        assert!(err.to_string().contains("at least one stage"));
    }

    #[test]
    fn test_builder_rejects_duplicate_stage() {
        let err = PipelineDefinition::builder("web")
            .stage(stage("lint"))
            .stage(stage("lint"))
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("duplicate stage name 'lint'"));
    }

    #[test]
    fn test_builder_rejects_stage_without_steps() {
        let err = PipelineDefinition::builder("web")
            .stage(StageDefinition::new("empty"))
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("at least one step"));
    }

    #[test]
    fn test_builder_rejects_blank_command() {
        let err = PipelineDefinition::builder("web")
            .stage(StageDefinition::new("lint").step(StepDefinition::new("   ")))
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("empty command"));
    }

    #[test]
    fn test_builder_rejects_working_directory_outside_workspace() {
        for dir in ["/", "../..", "frontend/../../etc", ""] {
            let err = PipelineDefinition::builder("web")
                .stage(StageDefinition::new("lint").step(StepDefinition::new("true").in_dir(dir)))
                .build()
                .unwrap_err();
            assert!(err.to_string().contains("outside the workspace"), "{dir}");
        }

        let ok = PipelineDefinition::builder("web")
            .stage(StageDefinition::new("lint").step(StepDefinition::new("true").in_dir("frontend/app")))
            .build();
        assert!(ok.is_ok());
    }

    #[test]
    fn test_stage_defaults_to_blocking() {
        assert!(stage("lint").failure_policy.is_blocking());
        assert!(!stage("lint").continue_on_error().failure_policy.is_blocking());
    }

    #[test]
    fn test_step_display_name_falls_back_to_command() {
        assert_eq!(StepDefinition::new("npm ci").display_name(), "npm ci");
        assert_eq!(
            StepDefinition::new("npm ci").named("install").display_name(),
            "install"
        );
    }
}
