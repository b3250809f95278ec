//! Pipeline command handlers
//!
//! `show` asks the orchestrator for the definition it would run next;
//! `validate` checks a local document without running anything.

use anyhow::{Context, Result};
use clap::Subcommand;
use colored::*;
use gantry_client::OrchestratorClient;
use gantry_core::dto::pipeline::PipelineView;
use std::path::{Path, PathBuf};

use crate::config::Config;
use crate::display::print_pipeline_view;

/// Pipeline subcommands
#[derive(Subcommand)]
pub enum PipelineCommands {
    /// Show the orchestrator's active pipeline
    Show,
    /// Parse a pipeline document and print its execution order
    Validate {
        /// Path to the Lua pipeline document
        file: PathBuf,
    },
}

/// Handle pipeline commands
///
/// # Arguments
/// * `command` - The pipeline command to execute
/// * `config` - The CLI configuration
pub async fn handle_pipeline_command(command: PipelineCommands, config: &Config) -> Result<()> {
    match command {
        PipelineCommands::Show => {
            let client = OrchestratorClient::new(&config.orchestrator_url);
            let view = client.get_pipeline().await?;
            print_pipeline_view(&view);
            Ok(())
        }
        PipelineCommands::Validate { file } => {
            let view = validate_file(&file)?;
            println!("{}", "✓ Pipeline is valid".green().bold());
            println!();
            print_pipeline_view(&view);
            Ok(())
        }
    }
}

/// Parses a document and checks its graph, the same way a submission would
fn validate_file(path: &Path) -> Result<PipelineView> {
    let source = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read pipeline file {}", path.display()))?;

    let (definition, graph) = gantry_lua::validate_definition(&source)
        .with_context(|| format!("{} is not a valid pipeline", path.display()))?;

    Ok(PipelineView::new(&definition, &graph))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn document(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_validate_reports_batches() {
        let file = document(
            r#"
            return {
                name = "web",
                stages = {
                    { name = "deploy", needs = { "test" }, steps = { "make deploy" } },
                    { name = "test", steps = { "make test" } },
                },
            }
            "#,
        );

        let view = validate_file(file.path()).unwrap();
        assert_eq!(view.batches, vec![vec!["test"], vec!["deploy"]]);
    }

    #[test]
    fn test_validate_reports_cycle() {
        let file = document(
            r#"
            return {
                name = "loop",
                stages = {
                    { name = "a", needs = "b", steps = { "true" } },
                    { name = "b", needs = "a", steps = { "true" } },
                },
            }
            "#,
        );

        let err = validate_file(file.path()).unwrap_err();
        assert!(format!("{:#}", err).contains("cyclic stage dependency"));
    }

    #[test]
    fn test_validate_missing_file() {
        let err = validate_file(Path::new("/nonexistent/pipeline.lua")).unwrap_err();
        assert!(err.to_string().contains("Failed to read pipeline file"));
    }
}
