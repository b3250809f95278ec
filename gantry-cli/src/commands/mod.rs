//! Commands module
//!
//! Defines all CLI commands and their handlers.

mod init;
mod local;
mod pipeline;
mod run;

pub use local::LocalArgs;
pub use pipeline::PipelineCommands;
pub use run::RunCommands;

use anyhow::Result;
use clap::Subcommand;
use std::path::PathBuf;

use crate::config::Config;

/// Top-level CLI commands
#[derive(Subcommand)]
pub enum Commands {
    /// Run submission and inspection
    Run {
        #[command(subcommand)]
        command: RunCommands,
    },
    /// Pipeline inspection and validation
    Pipeline {
        #[command(subcommand)]
        command: PipelineCommands,
    },
    /// Execute a pipeline document in-process, without an orchestrator
    Local(LocalArgs),
    /// Write a starter pipeline document
    Init {
        /// Where to write the document
        #[arg(short, long, default_value = "pipeline.lua")]
        path: PathBuf,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

/// Handle a CLI command
///
/// Routes the command to the appropriate handler module.
///
/// # Arguments
/// * `command` - The command to execute
/// * `config` - The CLI configuration
pub async fn handle_command(command: Commands, config: &Config) -> Result<()> {
    match command {
        Commands::Run { command } => run::handle_run_command(command, config).await,
        Commands::Pipeline { command } => pipeline::handle_pipeline_command(command, config).await,
        Commands::Local(args) => local::run_local(args).await,
        Commands::Init { path, force } => init::write_starter_pipeline(&path, force),
    }
}
