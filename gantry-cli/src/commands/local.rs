//! Local execution
//!
//! Runs a pipeline document in-process with the same engine the orchestrator
//! uses, then prints the final report. Ctrl-C requests cancellation.

use anyhow::{Context, Result, bail};
use clap::Args;
use colored::*;
use gantry_core::domain::event::EventPayload;
use gantry_core::domain::run::{RunState, RunStatus, StageStatus};
use gantry_lua::LuaFileSource;
use gantry_runner::{RunManager, RunnerConfig, SubmitError};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::display::print_run_details;

#[derive(Args, Debug, Clone)]
pub struct LocalArgs {
    /// Path to the Lua pipeline document
    pub file: PathBuf,

    /// Event type (push or pull_request)
    #[arg(short, long, default_value = "push")]
    pub event: String,

    /// Branch to report to the trigger policy and steps
    #[arg(short, long, default_value = "main")]
    pub branch: String,

    /// Commit to report to the trigger policy and steps
    #[arg(short, long, default_value = "local")]
    pub commit: String,

    /// Directory steps run in; cache and logs go under <workspace>/.gantry
    #[arg(short, long)]
    pub workspace: Option<PathBuf>,

    /// Per-step timeout in seconds
    #[arg(long)]
    pub timeout: Option<u64>,

    /// Maximum number of stages running at once
    #[arg(short, long)]
    pub jobs: Option<usize>,
}

impl LocalArgs {
    fn runner_config(&self) -> Result<RunnerConfig> {
        let mut config = match &self.workspace {
            Some(workspace) => RunnerConfig::new(workspace),
            None => RunnerConfig::from_env()?,
        };

        if let Some(secs) = self.timeout {
            config = config.with_step_timeout(Duration::from_secs(secs));
        }
        if let Some(jobs) = self.jobs {
            config.max_parallel_stages = jobs;
        }

        config.validate()?;
        Ok(config)
    }
}

/// Handle `gantry local`
///
/// Fails (non-zero exit) unless the run succeeds.
pub async fn run_local(args: LocalArgs) -> Result<()> {
    let manager = build_manager(&args)?;
    let run = execute(&manager, &args).await?;

    print_run_details(&run);
    print_failed_output(&manager, &run);

    if run.status != RunStatus::Succeeded {
        bail!("run finished with status {}", run.status);
    }

    println!("\n{}", "✓ Pipeline succeeded".green().bold());
    Ok(())
}

fn build_manager(args: &LocalArgs) -> Result<RunManager> {
    let config = args.runner_config()?;
    let source = Arc::new(LuaFileSource::new(&args.file));

    RunManager::from_config(source, &config).context("Failed to set up local runner")
}

/// Submits the event and waits for the run, cancelling it on Ctrl-C
async fn execute(manager: &RunManager, args: &LocalArgs) -> Result<RunState> {
    let payload = EventPayload::new(&args.event, &args.branch, &args.commit);

    let submitted = match manager.submit_run(payload) {
        Ok(submitted) => submitted,
        Err(SubmitError::Rejected(decision)) => {
            bail!(
                "{} event on '{}' does not trigger this pipeline ({})",
                args.event,
                args.branch,
                decision.reason
            )
        }
        Err(err) => {
            return Err(err).with_context(|| format!("Cannot run {}", args.file.display()));
        }
    };

    tracing::info!("Started local run {}", submitted.run_id);

    let wait = manager.wait_for_completion(submitted.run_id);
    tokio::pin!(wait);

    let run = tokio::select! {
        run = &mut wait => run?,
        _ = tokio::signal::ctrl_c() => {
            eprintln!("{}", "Cancelling run, waiting for running stages...".yellow());
            manager.cancel_run(submitted.run_id)?;
            wait.await?
        }
    };

    Ok(run)
}

/// Prints the combined log of every failed stage
fn print_failed_output(manager: &RunManager, run: &RunState) {
    for (name, stage) in &run.stages {
        if stage.status != StageStatus::Failed {
            continue;
        }
        let Some(log_ref) = &stage.log_ref else {
            continue;
        };

        match manager.read_output(log_ref) {
            Ok(output) => {
                println!("\n{}", format!("Output of failed stage '{}':", name).red().bold());
                println!("{}", "─".repeat(80).dimmed());
                print!("{}", String::from_utf8_lossy(&output));
                println!("{}", "─".repeat(80).dimmed());
            }
            Err(e) => tracing::warn!("Could not read output of stage '{}': {}", name, e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn setup(document: &str) -> (TempDir, LocalArgs) {
        let workspace = tempfile::tempdir().unwrap();
        let file = workspace.path().join("pipeline.lua");
        std::fs::write(&file, document).unwrap();

        let args = LocalArgs {
            file,
            event: "push".to_string(),
            branch: "main".to_string(),
            commit: "abc123".to_string(),
            workspace: Some(workspace.path().to_path_buf()),
            timeout: None,
            jobs: None,
        };
        (workspace, args)
    }

    #[tokio::test]
    async fn test_local_run_succeeds_in_workspace() {
        let (workspace, args) = setup(
            r#"
            return {
                name = "local",
                stages = {
                    { name = "build", steps = { "echo $GANTRY_COMMIT > built.txt" } },
                    { name = "check", needs = "build", steps = { "test -f built.txt" } },
                },
            }
            "#,
        );

        let manager = build_manager(&args).unwrap();
        let run = execute(&manager, &args).await.unwrap();

        assert_eq!(run.status, RunStatus::Succeeded);
        let built = std::fs::read_to_string(workspace.path().join("built.txt")).unwrap();
        assert_eq!(built.trim(), "abc123");
    }

    #[tokio::test]
    async fn test_local_run_reports_failure() {
        let (_workspace, args) = setup(
            r#"
            return {
                name = "local",
                stages = {
                    { name = "test", steps = { "exit 4" } },
                    { name = "deploy", needs = "test", steps = { "true" } },
                },
            }
            "#,
        );

        let err = run_local(args).await.unwrap_err();
        assert!(err.to_string().contains("Failed"));
    }

    #[tokio::test]
    async fn test_untracked_branch_is_explained() {
        let (_workspace, mut args) = setup(
            r#"
            return {
                name = "local",
                triggers = { push = { "main" } },
                stages = { { name = "a", steps = { "true" } } },
            }
            "#,
        );
        args.branch = "feature/x".to_string();

        let manager = build_manager(&args).unwrap();
        let err = execute(&manager, &args).await.unwrap_err();
        assert!(err.to_string().contains("untracked_branch"));
    }

    #[test]
    fn test_zero_jobs_is_rejected() {
        let (_workspace, mut args) = setup("return {}");
        args.jobs = Some(0);
        assert!(args.runner_config().is_err());
    }
}
