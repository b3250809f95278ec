//! Terminal rendering of runs, logs and pipeline views

use colored::*;
use gantry_core::domain::log::{LogEntry, LogLevel};
use gantry_core::domain::pipeline::FailurePolicy;
use gantry_core::domain::run::{
    RunState, RunStatus, RunSummary, StageResult, StageStatus, StepOutcome,
};
use gantry_core::dto::pipeline::PipelineView;

const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Print one line-group per run, as used by `run list`
pub fn print_run_summary(run: &RunSummary) {
    println!("  {} Run {}", "▸".cyan(), run.id.to_string().dimmed());
    println!("    Pipeline: {}", run.pipeline);
    println!(
        "    Event:    {} {} @ {}",
        run.event.kind,
        run.event.branch.cyan(),
        short_commit(&run.event.commit).dimmed()
    );
    println!("    Status:   {}", colorize_run_status(&run.status));
    println!(
        "    Stages:   {} total, {} succeeded, {} failed, {} skipped",
        run.total,
        run.succeeded.to_string().green(),
        run.failed.to_string().red(),
        run.skipped.to_string().yellow()
    );
    println!(
        "    Created:  {}",
        run.created_at.format(TIME_FORMAT).to_string().dimmed()
    );
    println!();
}

/// Print a full run report with one entry per stage
pub fn print_run_details(run: &RunState) {
    println!("{}", "Run Details:".bold());
    println!("  ID:        {}", run.id.to_string().cyan());
    println!("  Pipeline:  {}", run.pipeline);
    println!(
        "  Event:     {} {} @ {}",
        run.event.kind, run.event.branch, run.event.commit
    );
    println!("  Status:    {}", colorize_run_status(&run.status));
    println!("  Created:   {}", run.created_at.format(TIME_FORMAT));

    if let Some(started) = run.started_at {
        println!("  Started:   {}", started.format(TIME_FORMAT));
    }

    if let Some(finished) = run.finished_at {
        println!("  Finished:  {}", finished.format(TIME_FORMAT));
        if let Some(started) = run.started_at {
            let seconds = finished.signed_duration_since(started).num_milliseconds() as f64 / 1000.0;
            println!("  Duration:  {:.1}s", seconds);
        }
    }

    if run.cancel_requested {
        println!("  {}", "Cancellation requested".yellow());
    }

    println!("\n{}", "Stages:".bold());
    println!("{}", "─".repeat(80).dimmed());
    for (name, stage) in &run.stages {
        print_stage(name, stage);
    }
    println!("{}", "─".repeat(80).dimmed());
}

fn print_stage(name: &str, stage: &StageResult) {
    let mut line = format!(
        "  {} {}",
        format!("{:<24}", name).bold(),
        colorize_stage_status(&stage.status)
    );

    if let Some(code) = stage.exit_code.filter(|_| stage.status == StageStatus::Failed) {
        line.push_str(&format!(" (exit {})", code));
    }
    if let Some(ms) = stage.duration_ms() {
        line.push_str(&format!(" {}", format!("{}ms", ms).dimmed()));
    }
    println!("{}", line);

    if let Some(reason) = &stage.skip_reason {
        println!("      {}", reason.to_string().dimmed());
    }

    for step in &stage.steps {
        let marker = match step.outcome {
            StepOutcome::Succeeded => "✓".green(),
            StepOutcome::Failed => "✗".red(),
            StepOutcome::CacheHit => "↺".cyan(),
            StepOutcome::NotRun => "·".dimmed(),
        };
        println!("      {} {}", marker, step.name);
    }

    if let Some(log_ref) = &stage.log_ref {
        println!("      log: {}", log_ref.to_string().dimmed());
    }
}

/// Print a run event log entry
pub fn print_log_entry(log: &LogEntry) {
    let level_str = format!("{:?}", log.level).to_uppercase();
    let level_colored = match log.level {
        LogLevel::Debug => level_str.dimmed(),
        LogLevel::Info => level_str.cyan(),
        LogLevel::Warning => level_str.yellow(),
        LogLevel::Error => level_str.red(),
    };

    println!(
        "{} [{}] {}",
        log.timestamp.format("%H:%M:%S").to_string().dimmed(),
        level_colored,
        log.message
    );
}

/// Print a pipeline definition with its execution order
pub fn print_pipeline_view(view: &PipelineView) {
    println!("{}", "Pipeline:".bold());
    println!("  Name:          {}", view.name.cyan());
    if let Some(description) = &view.description {
        println!("  Description:   {}", description);
    }
    println!(
        "  Push branches: {}",
        if view.triggers.push_branches.is_empty() {
            "(none)".dimmed().to_string()
        } else {
            view.triggers.push_branches.join(", ")
        }
    );
    println!(
        "  Pull requests: {}",
        if view.triggers.pull_requests {
            "yes".green()
        } else {
            "no".dimmed()
        }
    );

    println!("\n{}", "Stages:".bold());
    for stage in &view.stages {
        let policy = match stage.failure_policy {
            FailurePolicy::Blocking => "".normal(),
            FailurePolicy::ContinueOnError => " [continue on error]".yellow(),
        };
        println!("  {} {}{}", "▸".cyan(), stage.name.bold(), policy);
        if !stage.needs.is_empty() {
            println!("    needs: {}", stage.needs.join(", ").dimmed());
        }
        for step in &stage.steps {
            println!("    - {}", step);
        }
    }

    println!("\n{}", "Execution order:".bold());
    for (idx, batch) in view.batches.iter().enumerate() {
        println!("  {}. {}", idx + 1, batch.join(", "));
    }
}

/// Colorize run status for display
pub fn colorize_run_status(status: &RunStatus) -> ColoredString {
    let status_str = status.to_string();
    match status {
        RunStatus::Pending => status_str.yellow(),
        RunStatus::Running => status_str.cyan(),
        RunStatus::Succeeded => status_str.green(),
        RunStatus::Failed => status_str.red(),
        RunStatus::Cancelled => status_str.dimmed(),
    }
}

fn colorize_stage_status(status: &StageStatus) -> ColoredString {
    let status_str = status.to_string();
    match status {
        StageStatus::Pending => status_str.yellow(),
        StageStatus::Running => status_str.cyan(),
        StageStatus::Succeeded => status_str.green(),
        StageStatus::Failed => status_str.red(),
        StageStatus::Skipped => status_str.dimmed(),
    }
}

fn short_commit(commit: &str) -> &str {
    commit.get(..8).unwrap_or(commit)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_commit() {
        assert_eq!(short_commit("0123456789abcdef"), "01234567");
        assert_eq!(short_commit("abc"), "abc");
    }
}
