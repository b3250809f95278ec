//! Run state types
//!
//! A [`RunState`] is created for every admitted event and mutated only by the
//! pipeline runner that owns it. Everyone else sees cloned snapshots.

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::event::Event;
use super::log::LogRef;

pub type RunId = Uuid;

/// Run lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
    Cancelled,
}

impl RunStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RunStatus::Succeeded | RunStatus::Failed | RunStatus::Cancelled
        )
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunStatus::Pending => write!(f, "Pending"),
            RunStatus::Running => write!(f, "Running"),
            RunStatus::Succeeded => write!(f, "Succeeded"),
            RunStatus::Failed => write!(f, "Failed"),
            RunStatus::Cancelled => write!(f, "Cancelled"),
        }
    }
}

/// Stage lifecycle status
///
/// Moves monotonically `Pending → Running → {Succeeded | Failed}`. `Skipped`
/// is terminal and only reachable from `Pending` (gating or cancellation).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
    Skipped,
}

impl StageStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            StageStatus::Succeeded | StageStatus::Failed | StageStatus::Skipped
        )
    }
}

impl std::fmt::Display for StageStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StageStatus::Pending => write!(f, "Pending"),
            StageStatus::Running => write!(f, "Running"),
            StageStatus::Succeeded => write!(f, "Succeeded"),
            StageStatus::Failed => write!(f, "Failed"),
            StageStatus::Skipped => write!(f, "Skipped"),
        }
    }
}

/// Why a stage was skipped
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum SkipReason {
    /// A blocking prerequisite failed or was itself skipped
    PrerequisiteFailed { stage: String },
    /// The run was cancelled before the stage could run to completion
    Cancelled,
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SkipReason::PrerequisiteFailed { stage } => {
                write!(f, "prerequisite '{}' did not succeed", stage)
            }
            SkipReason::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Outcome of a single step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepOutcome {
    Succeeded,
    /// The command exited non-zero
    Failed,
    /// Execution was skipped because the cache already held its output
    CacheHit,
    /// An earlier step failed, or the run was cancelled
    NotRun,
}

/// Record of one step inside a [`StageResult`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepRecord {
    pub name: String,
    pub outcome: StepOutcome,
    pub exit_code: Option<i32>,
    pub stdout_ref: Option<LogRef>,
    pub stderr_ref: Option<LogRef>,
    pub duration_ms: u64,
    /// Effective cache key, when the step declares a cache
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_key: Option<String>,
}

impl StepRecord {
    pub fn not_run(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            outcome: StepOutcome::NotRun,
            exit_code: None,
            stdout_ref: None,
            stderr_ref: None,
            duration_ms: 0,
            cache_key: None,
        }
    }
}

/// Result of a stage within a run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageResult {
    pub status: StageStatus,
    pub exit_code: Option<i32>,
    pub log_ref: Option<LogRef>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skip_reason: Option<SkipReason>,
    #[serde(default)]
    pub steps: Vec<StepRecord>,
}

impl StageResult {
    pub fn pending() -> Self {
        Self {
            status: StageStatus::Pending,
            exit_code: None,
            log_ref: None,
            started_at: None,
            finished_at: None,
            skip_reason: None,
            steps: Vec::new(),
        }
    }

    /// A stage that never started
    pub fn skipped(reason: SkipReason) -> Self {
        Self {
            status: StageStatus::Skipped,
            finished_at: Some(Utc::now()),
            skip_reason: Some(reason),
            ..Self::pending()
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    pub fn duration_ms(&self) -> Option<i64> {
        match (self.started_at, self.finished_at) {
            (Some(start), Some(end)) => Some(end.signed_duration_since(start).num_milliseconds()),
            _ => None,
        }
    }
}

/// State of one pipeline run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunState {
    pub id: RunId,
    pub pipeline: String,
    pub event: Event,
    pub status: RunStatus,
    /// Stage results in declaration order
    pub stages: IndexMap<String, StageResult>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub cancel_requested: bool,
}

impl RunState {
    /// Creates a pending run with every stage pending
    pub fn new<'a>(
        id: RunId,
        pipeline: impl Into<String>,
        event: Event,
        stages: impl IntoIterator<Item = &'a str>,
    ) -> Self {
        Self {
            id,
            pipeline: pipeline.into(),
            event,
            status: RunStatus::Pending,
            stages: stages
                .into_iter()
                .map(|name| (name.to_string(), StageResult::pending()))
                .collect(),
            created_at: Utc::now(),
            started_at: None,
            finished_at: None,
            cancel_requested: false,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    pub fn stage(&self, name: &str) -> Option<&StageResult> {
        self.stages.get(name)
    }

    /// Counts stages per status
    pub fn summary(&self) -> RunSummary {
        let mut summary = RunSummary {
            id: self.id,
            pipeline: self.pipeline.clone(),
            event: self.event.clone(),
            status: self.status,
            created_at: self.created_at,
            finished_at: self.finished_at,
            total: self.stages.len(),
            succeeded: 0,
            failed: 0,
            skipped: 0,
        };

        for result in self.stages.values() {
            match result.status {
                StageStatus::Succeeded => summary.succeeded += 1,
                StageStatus::Failed => summary.failed += 1,
                StageStatus::Skipped => summary.skipped += 1,
                StageStatus::Pending | StageStatus::Running => {}
            }
        }

        summary
    }
}

/// Compact view of a run, used by listings and final reports
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    pub id: RunId,
    pub pipeline: String,
    pub event: Event,
    pub status: RunStatus,
    pub created_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub skipped: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::event::EventKind;

    fn event() -> Event {
        Event {
            kind: EventKind::Push,
            branch: "main".to_string(),
            commit: "abc123".to_string(),
        }
    }

    #[test]
    fn test_new_run_keeps_stage_order() {
        let run = RunState::new(Uuid::new_v4(), "web", event(), ["b", "a", "c"]);
        let names: Vec<_> = run.stages.keys().cloned().collect();
        assert_eq!(names, vec!["b", "a", "c"]);
        assert!(run.stages.values().all(|s| s.status == StageStatus::Pending));
        assert_eq!(run.status, RunStatus::Pending);
    }

    #[test]
    fn test_summary_counts() {
        let mut run = RunState::new(Uuid::new_v4(), "web", event(), ["a", "b", "c", "d"]);
        run.stages["a"].status = StageStatus::Succeeded;
        run.stages["b"].status = StageStatus::Failed;
        run.stages["c"] = StageResult::skipped(SkipReason::Cancelled);

        let summary = run.summary();
        assert_eq!(summary.total, 4);
        assert_eq!(summary.succeeded, 1);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.skipped, 1);
    }

    #[test]
    fn test_skip_reason_wire_format() {
        let json = serde_json::to_value(SkipReason::PrerequisiteFailed {
            stage: "backend".to_string(),
        })
        .unwrap();
        assert_eq!(json["reason"], "prerequisite_failed");
        assert_eq!(json["stage"], "backend");

        let json = serde_json::to_value(SkipReason::Cancelled).unwrap();
        assert_eq!(json["reason"], "cancelled");
    }

    #[test]
    fn test_terminal_statuses() {
        assert!(!RunStatus::Running.is_terminal());
        assert!(RunStatus::Cancelled.is_terminal());
        assert!(!StageStatus::Running.is_terminal());
        assert!(StageStatus::Skipped.is_terminal());
    }
}
