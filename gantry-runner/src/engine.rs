//! Pipeline runner
//!
//! Drives one run through its topological batches. Stages of a batch run as
//! parallel tasks (bounded by a semaphore); the next batch starts only when
//! every stage of the current one is terminal.
//!
//! The coordinating task is the only writer of the run's [`RunState`]. It
//! publishes every transition through a `watch` channel, so readers always
//! see a consistent snapshot.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::{Semaphore, mpsc, watch};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use gantry_core::PipelineGraph;
use gantry_core::domain::pipeline::PipelineDefinition;
use gantry_core::domain::run::{RunState, RunStatus, SkipReason, StageResult, StageStatus};

use crate::context::RunContext;
use crate::executor::StepExecutor;
use crate::stage::execute_stage;

/// Executes runs against a shared step executor
pub struct PipelineRunner {
    executor: Arc<StepExecutor>,
    max_parallel_stages: usize,
}

impl PipelineRunner {
    pub fn new(executor: Arc<StepExecutor>, max_parallel_stages: usize) -> Self {
        Self {
            executor,
            max_parallel_stages: max_parallel_stages.max(1),
        }
    }

    pub fn executor(&self) -> &Arc<StepExecutor> {
        &self.executor
    }

    /// Runs the pipeline to a terminal status
    ///
    /// # Arguments
    /// * `ctx` - Run context carrying the cancellation token and event log
    /// * `definition` - The definition loaded for this run
    /// * `graph` - Validated graph of `definition`
    /// * `state` - Sender side of the run's state channel
    ///
    /// # Returns
    /// The terminal run status, also published on `state`
    pub async fn run(
        &self,
        ctx: Arc<RunContext>,
        definition: Arc<PipelineDefinition>,
        graph: &PipelineGraph,
        state: &watch::Sender<RunState>,
    ) -> RunStatus {
        info!(
            "Starting run {} of pipeline '{}' ({} stages)",
            ctx.run_id,
            definition.name,
            graph.len()
        );
        ctx.log_info(format!(
            "Run started: {} to {} at {}",
            ctx.event.kind, ctx.event.branch, ctx.event.commit
        ));
        state.send_modify(|s| {
            s.status = RunStatus::Running;
            s.started_at = Some(Utc::now());
        });

        let semaphore = Arc::new(Semaphore::new(self.max_parallel_stages));
        let cancel = ctx.cancellation_token();
        let mut cancel_seen = false;

        for (batch_idx, batch) in graph.topological_batches().enumerate() {
            if cancel.is_cancelled() {
                break;
            }

            debug!("Dispatching batch {}: {:?}", batch_idx + 1, batch);

            let (started_tx, mut started_rx) = mpsc::unbounded_channel::<String>();
            let mut tasks = JoinSet::new();
            let mut in_flight = HashSet::new();

            for name in batch {
                let Some(stage) = definition.stage(name) else {
                    continue;
                };

                if let Some(blocker) = failed_prerequisite(&definition, graph, state, name) {
                    info!(
                        "Skipping stage '{}': prerequisite '{}' did not succeed",
                        name, blocker
                    );
                    ctx.log_warning(format!(
                        "Stage '{}' skipped: prerequisite '{}' did not succeed",
                        name, blocker
                    ));
                    state.send_modify(|s| {
                        s.stages.insert(
                            name.to_string(),
                            StageResult::skipped(SkipReason::PrerequisiteFailed { stage: blocker }),
                        );
                    });
                    continue;
                }

                let stage = stage.clone();
                let ctx = Arc::clone(&ctx);
                let executor = Arc::clone(&self.executor);
                let semaphore = Arc::clone(&semaphore);
                let started_tx = started_tx.clone();

                in_flight.insert(name.to_string());
                tasks.spawn(async move {
                    // Permit is released when the stage finishes
                    let _permit = semaphore.acquire_owned().await.ok();
                    if ctx.is_cancelled() {
                        return (stage.name, StageResult::skipped(SkipReason::Cancelled));
                    }
                    let _ = started_tx.send(stage.name.clone());
                    let result = execute_stage(&ctx, &stage, &executor).await;
                    (stage.name, result)
                });
            }
            drop(started_tx);

            loop {
                tokio::select! {
                    biased;

                    Some(name) = started_rx.recv() => {
                        info!("Executing stage '{}'", name);
                        ctx.log_info(format!("Stage '{}' started", name));
                        state.send_modify(|s| {
                            if let Some(result) = s.stages.get_mut(&name) {
                                if result.status == StageStatus::Pending {
                                    result.status = StageStatus::Running;
                                    result.started_at = Some(Utc::now());
                                }
                            }
                        });
                    }

                    _ = cancel.cancelled(), if !cancel_seen => {
                        cancel_seen = true;
                        warn!("Run {} cancelled", ctx.run_id);
                        ctx.log_warning("Cancellation requested".to_string());
                        skip_unstarted(&ctx, state);
                    }

                    joined = tasks.join_next() => {
                        let Some(joined) = joined else {
                            break;
                        };

                        match joined {
                            Ok((name, result)) => {
                                in_flight.remove(&name);
                                record_result(&ctx, state, &name, result);
                            }
                            Err(e) => error!("Stage task panicked: {}", e),
                        }
                    }
                }
            }

            // Whatever is left never reported back
            for name in in_flight {
                record_result(&ctx, state, &name, panicked());
            }
        }

        let cancelled = cancel.is_cancelled();
        if cancelled {
            skip_unstarted(&ctx, state);
        }

        state.send_modify(|s| {
            let blocking_failed = definition.stages.iter().any(|stage| {
                stage.failure_policy.is_blocking()
                    && s
                        .stages
                        .get(&stage.name)
                        .is_some_and(|r| r.status == StageStatus::Failed)
            });

            s.status = if cancelled {
                RunStatus::Cancelled
            } else if blocking_failed {
                RunStatus::Failed
            } else {
                RunStatus::Succeeded
            };
            s.cancel_requested = cancelled;
            s.finished_at = Some(Utc::now());
        });

        let status = state.borrow().status;
        info!("Run {} finished: {}", ctx.run_id, status);
        ctx.log_info(format!("Run finished: {}", status));
        status
    }
}

/// First blocking prerequisite of `stage` that failed or was skipped
///
/// A `continue_on_error` prerequisite never gates, whatever its result.
fn failed_prerequisite(
    definition: &PipelineDefinition,
    graph: &PipelineGraph,
    state: &watch::Sender<RunState>,
    stage: &str,
) -> Option<String> {
    let current = state.borrow();
    graph
        .prerequisites(stage)
        .into_iter()
        .find(|prerequisite| {
            let blocking = definition
                .stage(prerequisite)
                .is_some_and(|d| d.failure_policy.is_blocking());
            let status = current.stages.get(*prerequisite).map(|r| r.status);
            blocking && matches!(status, Some(StageStatus::Failed | StageStatus::Skipped))
        })
        .map(str::to_string)
}

/// Marks every stage that has not started as skipped by cancellation
fn skip_unstarted(ctx: &RunContext, state: &watch::Sender<RunState>) {
    state.send_modify(|s| {
        s.cancel_requested = true;
        for (name, result) in s.stages.iter_mut() {
            if result.status == StageStatus::Pending {
                debug!("Stage '{}' skipped by cancellation", name);
                ctx.log_info(format!("Stage '{}' skipped: run cancelled", name));
                *result = StageResult::skipped(SkipReason::Cancelled);
            }
        }
    });
}

/// Publishes a finished stage; results already terminal are kept
fn record_result(
    ctx: &RunContext,
    state: &watch::Sender<RunState>,
    name: &str,
    result: StageResult,
) {
    match result.status {
        StageStatus::Failed => ctx.log_error(format!("Stage '{}' failed", name)),
        status => ctx.log_info(format!("Stage '{}' finished: {}", name, status)),
    }
    info!("Stage '{}' finished: {}", name, result.status);

    state.send_modify(|s| {
        if let Some(current) = s.stages.get_mut(name) {
            if !current.is_terminal() {
                *current = result;
            }
        }
    });
}

fn panicked() -> StageResult {
    StageResult {
        status: StageStatus::Failed,
        finished_at: Some(Utc::now()),
        ..StageResult::pending()
    }
}
