//! Run manager
//!
//! Entry point for submitting, observing and cancelling runs. Each submission
//! loads a fresh definition from the pipeline source, validates its graph,
//! evaluates the trigger policy, then hands the run to its own task.
//!
//! Runs are kept in memory for the lifetime of the manager.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::watch;
use tracing::{debug, info};

use gantry_core::domain::event::EventPayload;
use gantry_core::domain::log::{LogEntry, LogRef};
use gantry_core::domain::pipeline::PipelineDefinition;
use gantry_core::domain::run::{RunId, RunState, RunSummary};
use gantry_core::dto::run::{CancelRunResponse, SubmitRunResponse};
use gantry_core::{DefinitionError, PipelineGraph, PipelineSource};

use crate::cache::FsCacheStore;
use crate::config::RunnerConfig;
use crate::context::RunContext;
use crate::engine::PipelineRunner;
use crate::error::{RunError, SubmitError};
use crate::executor::StepExecutor;
use crate::logs::FsLogStore;
use crate::process::ShellCommandRunner;

struct RunHandle {
    state: watch::Receiver<RunState>,
    context: Arc<RunContext>,
}

/// Owns every run started by this process
pub struct RunManager {
    source: Arc<dyn PipelineSource>,
    runner: Arc<PipelineRunner>,
    runs: RwLock<HashMap<RunId, RunHandle>>,
}

impl RunManager {
    pub fn new(source: Arc<dyn PipelineSource>, runner: Arc<PipelineRunner>) -> Self {
        Self {
            source,
            runner,
            runs: RwLock::new(HashMap::new()),
        }
    }

    /// Builds a manager backed by the filesystem stores and a shell runner
    pub fn from_config(
        source: Arc<dyn PipelineSource>,
        config: &RunnerConfig,
    ) -> Result<Self, RunError> {
        let cache = FsCacheStore::new(&config.cache_dir)?;
        let logs = FsLogStore::new(&config.log_dir)?;

        let executor = StepExecutor::new(
            Arc::new(ShellCommandRunner::new(config.shell.clone())),
            Arc::new(cache),
            Arc::new(logs),
            config.workspace_dir.clone(),
        )
        .with_timeout(config.step_timeout);

        let runner = PipelineRunner::new(Arc::new(executor), config.max_parallel_stages);
        Ok(Self::new(source, Arc::new(runner)))
    }

    pub fn source(&self) -> &Arc<dyn PipelineSource> {
        &self.source
    }

    /// Loads the current definition and validates its graph
    pub fn load_pipeline(&self) -> Result<(PipelineDefinition, PipelineGraph), DefinitionError> {
        let definition = self.source.load()?;
        let graph = PipelineGraph::new(&definition)?;
        Ok((definition, graph))
    }

    /// Submits an event
    ///
    /// Must be called from within a Tokio runtime; the run executes on its
    /// own task and this returns as soon as it is registered.
    ///
    /// # Errors
    /// - [`SubmitError::Definition`] when the definition fails to load or
    ///   validate; no stage is started
    /// - [`SubmitError::Rejected`] when the trigger policy does not admit
    ///   the event
    pub fn submit_run(&self, payload: EventPayload) -> Result<SubmitRunResponse, SubmitError> {
        let (definition, graph) = self.load_pipeline()?;

        let (event, reason) = definition
            .triggers
            .evaluate(&payload)
            .map_err(SubmitError::Rejected)?;

        let run_id = RunId::new_v4();
        let initial = RunState::new(run_id, definition.name.clone(), event.clone(), graph.stages());
        let (tx, rx) = watch::channel(initial);
        let context = RunContext::new(run_id, definition.name.clone(), event);

        info!(
            "Admitted run {} of '{}' ({}: {} at {})",
            run_id, definition.name, reason, context.event.branch, context.event.commit
        );

        self.runs.write().insert(
            run_id,
            RunHandle {
                state: rx,
                context: Arc::clone(&context),
            },
        );

        let runner = Arc::clone(&self.runner);
        let definition = Arc::new(definition);
        tokio::spawn(async move {
            runner.run(context, definition, &graph, &tx).await;
        });

        Ok(SubmitRunResponse { run_id, reason })
    }

    /// Snapshot of a run's current state
    pub fn get_run_state(&self, run_id: RunId) -> Option<RunState> {
        self.runs
            .read()
            .get(&run_id)
            .map(|handle| handle.state.borrow().clone())
    }

    /// Requests cancellation
    ///
    /// Cancelling a terminal run is acknowledged with `accepted: false`.
    pub fn cancel_run(&self, run_id: RunId) -> Result<CancelRunResponse, RunError> {
        let runs = self.runs.read();
        let handle = runs.get(&run_id).ok_or(RunError::NotFound(run_id))?;

        let status = handle.state.borrow().status;
        let accepted = !status.is_terminal();
        if accepted {
            info!("Cancelling run {}", run_id);
            handle.context.cancel();
        } else {
            debug!("Run {} already {}, cancel ignored", run_id, status);
        }

        Ok(CancelRunResponse {
            run_id,
            accepted,
            status,
        })
    }

    /// Summaries of all runs, newest first
    pub fn list_runs(&self) -> Vec<RunSummary> {
        let mut summaries: Vec<_> = self
            .runs
            .read()
            .values()
            .map(|handle| handle.state.borrow().summary())
            .collect();
        summaries.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        summaries
    }

    /// The run's event log
    pub fn run_logs(&self, run_id: RunId) -> Result<Vec<LogEntry>, RunError> {
        self.runs
            .read()
            .get(&run_id)
            .map(|handle| handle.context.events())
            .ok_or(RunError::NotFound(run_id))
    }

    /// Captured output of a step or stage
    pub fn read_output(&self, log_ref: &LogRef) -> Result<Vec<u8>, RunError> {
        Ok(self.runner.executor().logs().read(log_ref)?)
    }

    /// Waits until the run is terminal and returns its final state
    pub async fn wait_for_completion(&self, run_id: RunId) -> Result<RunState, RunError> {
        let mut rx = self
            .runs
            .read()
            .get(&run_id)
            .map(|handle| handle.state.clone())
            .ok_or(RunError::NotFound(run_id))?;

        let finished = rx
            .wait_for(|state| state.is_terminal())
            .await
            .map(|state| state.clone());

        // Runner task is gone; report what it last published
        Ok(finished.unwrap_or_else(|_| rx.borrow().clone()))
    }
}
