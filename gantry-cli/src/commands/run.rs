//! Run command handlers
//!
//! Submitting events to the orchestrator and inspecting the runs they start.

use anyhow::Result;
use clap::Subcommand;
use colored::*;
use gantry_client::OrchestratorClient;
use gantry_core::domain::event::EventPayload;

use crate::config::Config;
use crate::display::{colorize_run_status, print_log_entry, print_run_details, print_run_summary};
use crate::id_resolver::resolve_run_id;

/// Run subcommands
#[derive(Subcommand)]
pub enum RunCommands {
    /// Submit an event; starts a run if the trigger policy admits it
    Submit {
        /// Event type (push or pull_request)
        #[arg(short, long, default_value = "push")]
        event: String,

        /// Branch the event refers to
        #[arg(short, long)]
        branch: String,

        /// Commit the event refers to
        #[arg(short, long)]
        commit: String,
    },
    /// List runs, newest first
    List,
    /// Show a run's stages and steps
    Get {
        /// Run ID or unambiguous prefix
        id: String,

        /// Print the raw run state as JSON
        #[arg(long)]
        json: bool,
    },
    /// Request cancellation of a run
    Cancel {
        /// Run ID or unambiguous prefix
        id: String,
    },
    /// Show a run's event log
    Logs {
        /// Run ID or unambiguous prefix
        id: String,
    },
    /// Print captured output for a log ref
    Output {
        /// Ref shown by `run get`, e.g. <run>/<stage>/stage.log
        log_ref: String,
    },
}

/// Handle run commands
///
/// # Arguments
/// * `command` - The run command to execute
/// * `config` - The CLI configuration
pub async fn handle_run_command(command: RunCommands, config: &Config) -> Result<()> {
    let client = OrchestratorClient::new(&config.orchestrator_url);

    match command {
        RunCommands::Submit {
            event,
            branch,
            commit,
        } => submit_run(&client, EventPayload::new(event, branch, commit)).await,
        RunCommands::List => list_runs(&client).await,
        RunCommands::Get { id, json } => get_run(&client, &id, json).await,
        RunCommands::Cancel { id } => cancel_run(&client, &id).await,
        RunCommands::Logs { id } => get_run_logs(&client, &id).await,
        RunCommands::Output { log_ref } => {
            let output = client.get_output(&log_ref).await?;
            print!("{}", output);
            Ok(())
        }
    }
}

async fn submit_run(client: &OrchestratorClient, event: EventPayload) -> Result<()> {
    let submitted = client.submit_run(event).await?;

    println!("{}", "✓ Run started".green().bold());
    println!("  ID:     {}", submitted.run_id.to_string().cyan());
    println!("  Reason: {}", submitted.reason);
    println!();
    println!(
        "Follow it with {}",
        format!("gantry run get {}", &submitted.run_id.to_string()[..8]).cyan()
    );

    Ok(())
}

async fn list_runs(client: &OrchestratorClient) -> Result<()> {
    let runs = client.list_runs().await?;

    if runs.is_empty() {
        println!("{}", "No runs found.".yellow());
    } else {
        println!("{}", format!("Found {} run(s):", runs.len()).bold());
        println!();
        for run in &runs {
            print_run_summary(run);
        }
    }

    Ok(())
}

async fn get_run(client: &OrchestratorClient, id: &str, json: bool) -> Result<()> {
    let run_id = resolve_run_id(client, id).await?;
    let run = client.get_run(run_id).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&run)?);
    } else {
        print_run_details(&run);
    }

    Ok(())
}

async fn cancel_run(client: &OrchestratorClient, id: &str) -> Result<()> {
    let run_id = resolve_run_id(client, id).await?;
    let ack = client.cancel_run(run_id).await?;

    if ack.accepted {
        println!("{} cancellation requested for run {}", "✓".green(), run_id);
    } else {
        println!(
            "{} run {} already finished ({})",
            "⚠".yellow(),
            run_id,
            colorize_run_status(&ack.status)
        );
    }

    Ok(())
}

async fn get_run_logs(client: &OrchestratorClient, id: &str) -> Result<()> {
    let run_id = resolve_run_id(client, id).await?;
    let logs = client.get_run_logs(run_id).await?;

    if logs.is_empty() {
        println!("{}", "No log entries for this run yet.".yellow());
    } else {
        println!("{}", format!("Logs for run {}:", run_id).bold());
        println!("{}", "─".repeat(80).dimmed());
        for entry in &logs {
            print_log_entry(entry);
        }
        println!("{}", "─".repeat(80).dimmed());
    }

    Ok(())
}
