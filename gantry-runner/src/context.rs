//! Per-run execution context
//!
//! Contains the state shared by every stage task of one run:
//! - Run identity and the admitted event
//! - The cancellation token
//! - The run's event log

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use gantry_core::domain::event::Event;
use gantry_core::domain::log::{LogEntry, LogLevel};
use gantry_core::domain::pipeline::StageDefinition;
use gantry_core::domain::run::RunId;

/// Execution context shared across one run
pub struct RunContext {
    pub run_id: RunId,
    pub pipeline: String,
    pub event: Event,

    cancel: CancellationToken,

    /// Event log, appended to on every transition
    events: Mutex<Vec<LogEntry>>,
}

impl RunContext {
    /// Creates a new run context
    ///
    /// # Arguments
    /// * `run_id` - The run ID
    /// * `pipeline` - Name of the pipeline being run
    /// * `event` - The admitted event that started the run
    pub fn new(run_id: RunId, pipeline: impl Into<String>, event: Event) -> Arc<Self> {
        Arc::new(Self {
            run_id,
            pipeline: pipeline.into(),
            event,
            cancel: CancellationToken::new(),
            events: Mutex::new(Vec::new()),
        })
    }

    /// Requests cooperative cancellation
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Adds an entry to the event log
    pub fn add_log(&self, entry: LogEntry) {
        self.events.lock().push(entry);
    }

    pub fn log_debug(&self, message: String) {
        self.add_log(LogEntry::now(LogLevel::Debug, message));
    }

    pub fn log_info(&self, message: String) {
        self.add_log(LogEntry::now(LogLevel::Info, message));
    }

    pub fn log_warning(&self, message: String) {
        self.add_log(LogEntry::now(LogLevel::Warning, message));
    }

    pub fn log_error(&self, message: String) {
        self.add_log(LogEntry::now(LogLevel::Error, message));
    }

    /// Snapshot of the event log so far
    pub fn events(&self) -> Vec<LogEntry> {
        self.events.lock().clone()
    }

    /// Variables added to every step of `stage`, on top of the inherited
    /// process environment
    ///
    /// Stage variables come first so the `GANTRY_*` ones cannot be shadowed.
    pub fn step_env(&self, stage: &StageDefinition) -> BTreeMap<String, String> {
        let mut env = stage.environment.clone();
        env.insert("GANTRY_RUN_ID".to_string(), self.run_id.to_string());
        env.insert("GANTRY_PIPELINE".to_string(), self.pipeline.clone());
        env.insert("GANTRY_STAGE".to_string(), stage.name.clone());
        env.insert("GANTRY_EVENT".to_string(), self.event.kind.as_str().to_string());
        env.insert("GANTRY_BRANCH".to_string(), self.event.branch.clone());
        env.insert("GANTRY_COMMIT".to_string(), self.event.commit.clone());
        env
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gantry_core::domain::event::EventKind;
    use uuid::Uuid;

    fn context() -> Arc<RunContext> {
        RunContext::new(
            Uuid::new_v4(),
            "web",
            Event {
                kind: EventKind::PullRequest,
                branch: "feature/x".to_string(),
                commit: "abc123".to_string(),
            },
        )
    }

    #[test]
    fn test_step_env_overrides_stage_values() {
        let ctx = context();
        let stage = StageDefinition::new("backend")
            .env("RUST_LOG", "debug")
            .env("GANTRY_BRANCH", "spoofed");

        let env = ctx.step_env(&stage);
        assert_eq!(env["RUST_LOG"], "debug");
        assert_eq!(env["GANTRY_BRANCH"], "feature/x");
        assert_eq!(env["GANTRY_EVENT"], "pull_request");
        assert_eq!(env["GANTRY_STAGE"], "backend");
        assert_eq!(env["GANTRY_RUN_ID"], ctx.run_id.to_string());
    }

    #[test]
    fn test_cancel_is_observed_by_clones() {
        let ctx = context();
        let token = ctx.cancellation_token();
        assert!(!token.is_cancelled());
        ctx.cancel();
        assert!(token.is_cancelled());
        assert!(ctx.is_cancelled());
    }

    #[test]
    fn test_event_log_keeps_order() {
        let ctx = context();
        ctx.log_info("first".to_string());
        ctx.log_error("second".to_string());

        let events = ctx.events();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].message, "first");
        assert_eq!(events[1].level, LogLevel::Error);
    }
}
