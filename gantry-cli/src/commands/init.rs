//! Init command handler
//!
//! Writes a starter pipeline document to edit from.

use anyhow::{Context, Result, bail};
use colored::*;
use std::fs;
use std::path::Path;

const STARTER_PIPELINE: &str = r#"-- Gantry pipeline
--
-- Stages run in parallel unless ordered with `needs`. A failing stage skips
-- everything that needs it, unless it sets `continue_on_error = true`.
return pipeline.define {
    name = "my-project",
    description = "Build, test and package",

    triggers = {
        push = { "main", "develop" },
        pull_request = true,
    },

    stages = {
        pipeline.stage {
            name = "build",
            steps = {
                pipeline.step {
                    name = "dependencies",
                    run = "echo 'install dependencies here'",
                    -- Reuses the step's outputs while the lockfile is unchanged
                    cache = pipeline.cache("deps", {
                        files = { "Cargo.lock" },
                        paths = { "target" },
                    }),
                },
                "echo 'build here'",
            },
        },

        pipeline.stage {
            name = "unit-tests",
            needs = "build",
            steps = { "echo 'run unit tests here'" },
        },

        pipeline.stage {
            name = "lint",
            needs = "build",
            continue_on_error = true,
            steps = { "echo 'run linters here'" },
        },

        pipeline.stage {
            name = "package",
            needs = { "unit-tests", "lint" },
            env = { PROFILE = "release" },
            steps = { "echo \"package $GANTRY_COMMIT ($PROFILE)\"" },
        },
    },
}
"#;

/// Handle `gantry init`
///
/// # Arguments
/// * `path` - Where to write the document
/// * `force` - Overwrite an existing file
pub fn write_starter_pipeline(path: &Path, force: bool) -> Result<()> {
    if path.exists() && !force {
        bail!(
            "{} already exists (use --force to overwrite)",
            path.display()
        );
    }

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory {}", parent.display()))?;
    }

    fs::write(path, STARTER_PIPELINE)
        .with_context(|| format!("Failed to write {}", path.display()))?;

    println!("  {} {}", "Created".green(), path.display());
    println!();
    println!("{}", "Next steps:".bold());
    println!("  1. Replace the echo commands with your build");
    println!(
        "  2. Check it with {}",
        format!("gantry pipeline validate {}", path.display()).cyan()
    );
    println!(
        "  3. Try it with {}",
        format!("gantry local {}", path.display()).cyan()
    );

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_starter_pipeline_is_valid() {
        let (definition, graph) = gantry_lua::validate_definition(STARTER_PIPELINE).unwrap();
        assert_eq!(definition.name, "my-project");

        let batches: Vec<Vec<&str>> = graph.topological_batches().collect();
        assert_eq!(
            batches,
            vec![vec!["build"], vec!["unit-tests", "lint"], vec!["package"]]
        );
    }

    #[test]
    fn test_refuses_to_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ci").join("pipeline.lua");

        write_starter_pipeline(&path, false).unwrap();
        assert!(write_starter_pipeline(&path, false).is_err());

        fs::write(&path, "-- edited").unwrap();
        write_starter_pipeline(&path, true).unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), STARTER_PIPELINE);
    }
}
