//! Stage execution
//!
//! Steps of a stage run strictly in order and stop at the first failure.
//! A stage always reaches its natural result once started: run cancellation
//! is observed by the runner before dispatch, never between the steps of a
//! running stage.

use chrono::Utc;
use tracing::{info, warn};

use gantry_core::domain::log::LogRef;
use gantry_core::domain::pipeline::StageDefinition;
use gantry_core::domain::run::{StageResult, StageStatus, StepOutcome, StepRecord};

use crate::context::RunContext;
use crate::executor::StepExecutor;

/// Runs every step of `stage` and aggregates the result
pub async fn execute_stage(
    ctx: &RunContext,
    stage: &StageDefinition,
    executor: &StepExecutor,
) -> StageResult {
    let started_at = Utc::now();
    let env = ctx.step_env(stage);
    let total = stage.steps.len();

    let mut steps = Vec::with_capacity(total);
    let mut combined = Vec::new();
    let mut failed_exit: Option<i32> = None;

    for (idx, step) in stage.steps.iter().enumerate() {
        if failed_exit.is_some() {
            steps.push(StepRecord::not_run(step.display_name()));
            continue;
        }

        info!(
            "Executing step {}/{} of stage '{}': {}",
            idx + 1,
            total,
            stage.name,
            step.display_name()
        );

        let result = executor.run(ctx, &stage.name, idx + 1, step, &env).await;

        combined.extend_from_slice(format!("$ {}\n", step.command).as_bytes());
        combined.extend_from_slice(&result.output.stdout);
        combined.extend_from_slice(&result.output.stderr);
        combined.extend_from_slice(
            format!("[{:?}, exit {}]\n", result.record.outcome, result.output.exit_code).as_bytes(),
        );

        if result.record.outcome == StepOutcome::Failed {
            warn!(
                "Step '{}' of stage '{}' failed with exit code {}",
                step.display_name(),
                stage.name,
                result.output.exit_code
            );
            ctx.log_error(format!(
                "Stage '{}': step '{}' failed with exit code {}",
                stage.name,
                step.display_name(),
                result.output.exit_code
            ));
            failed_exit = Some(result.output.exit_code);
        }

        steps.push(result.record);
    }

    let log_ref = LogRef::for_stage(ctx.run_id, &stage.name);
    let log_ref = match executor.logs().write(&log_ref, &combined) {
        Ok(()) => Some(log_ref),
        Err(e) => {
            warn!("Failed to store log for stage '{}': {}", stage.name, e);
            None
        }
    };

    let (status, exit_code) = match failed_exit {
        Some(code) => (StageStatus::Failed, Some(code)),
        None => (StageStatus::Succeeded, Some(0)),
    };

    StageResult {
        status,
        exit_code,
        log_ref,
        started_at: Some(started_at),
        finished_at: Some(Utc::now()),
        skip_reason: None,
        steps,
    }
}
