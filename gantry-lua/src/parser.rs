//! Pipeline document parser
//!
//! Evaluates a Lua pipeline document in the restricted sandbox and turns the
//! returned table into a [`PipelineDefinition`]. Nothing in the document is
//! executed beyond building that table.
//!
//! Document shape:
//!
//! ```lua
//! return pipeline.define {
//!     name = "web-app",
//!     description = "optional",
//!     triggers = { push = { "main", "develop" }, pull_request = true },
//!     stages = {
//!         pipeline.stage {
//!             name = "backend-tests",
//!             needs = { "lint" },          -- or a single string
//!             continue_on_error = false,
//!             env = { RUST_LOG = "debug" },
//!             steps = {
//!                 "cargo test",
//!                 { name = "deps", run = "npm ci", cwd = "frontend",
//!                   cache = { key = "npm", files = { "package-lock.json" },
//!                             paths = { "node_modules" } } },
//!             },
//!         },
//!     },
//! }
//! ```

use anyhow::{Context, Result, anyhow, bail};
use mlua::{Table, Value};

use gantry_core::domain::pipeline::{
    CacheSpec, PipelineBuilder, PipelineDefinition, StageDefinition, StepDefinition,
};
use gantry_core::{DefinitionError, PipelineGraph, TriggerPolicy};

use crate::sandbox::create_sandbox;

/// Parse a pipeline definition from Lua source code
///
/// # Arguments
/// * `source` - The Lua source code defining the pipeline
///
/// # Returns
/// The validated pipeline definition. Gating edges are not checked here; see
/// [`validate_definition`].
///
/// # Errors
/// Returns [`DefinitionError::Invalid`] if the Lua is invalid, does not
/// return a table, has missing or mistyped fields, or fails the per-stage
/// rules of [`PipelineBuilder::build`].
///
/// # Example
/// ```no_run
/// use gantry_lua::parser::parse_pipeline_definition;
///
/// let source = r#"
///     return {
///         name = "web-app",
///         stages = {
///             { name = "lint", steps = { "make lint" } },
///             { name = "test", needs = "lint", steps = { "make test" } },
///         }
///     }
/// "#;
///
/// let definition = parse_pipeline_definition(source)?;
/// assert_eq!(definition.name, "web-app");
/// assert_eq!(definition.stages.len(), 2);
/// # Ok::<(), gantry_core::DefinitionError>(())
/// ```
pub fn parse_pipeline_definition(source: &str) -> Result<PipelineDefinition, DefinitionError> {
    let builder = evaluate_document(source)
        .map_err(|e| DefinitionError::invalid(format!("{:#}", e)))?;
    builder.build()
}

/// Parse a document and check its gating graph
///
/// Returns the definition together with its [`PipelineGraph`], so cycles and
/// unknown prerequisites are reported the same way a submission would.
pub fn validate_definition(
    source: &str,
) -> Result<(PipelineDefinition, PipelineGraph), DefinitionError> {
    let definition = parse_pipeline_definition(source)?;
    let graph = PipelineGraph::new(&definition)?;
    Ok((definition, graph))
}

fn evaluate_document(source: &str) -> Result<PipelineBuilder> {
    let lua = create_sandbox().context("Failed to create pipeline sandbox")?;

    let pipeline: Table = lua
        .load(source)
        .eval()
        .context("Failed to evaluate pipeline definition")?;

    let name: String = pipeline
        .get("name")
        .context("Pipeline must have a 'name' field")?;

    let mut builder = PipelineDefinition::builder(name);

    if let Some(description) = pipeline
        .get::<Option<String>>("description")
        .context("Field 'description' must be a string")?
    {
        builder = builder.description(description);
    }

    builder = builder.triggers(parse_triggers(&pipeline)?);

    let stages: Table = pipeline
        .get("stages")
        .context("Pipeline must have a 'stages' field")?;

    for (idx, entry) in stages.sequence_values::<Table>().enumerate() {
        let stage_table = entry.with_context(|| format!("Stage {} must be a table", idx + 1))?;
        builder = builder.stage(parse_stage(&stage_table, idx)?);
    }

    Ok(builder)
}

/// Parse the 'triggers' field; each entry falls back to its default alone
fn parse_triggers(pipeline: &Table) -> Result<TriggerPolicy> {
    let mut policy = TriggerPolicy::default();

    match pipeline.get::<Value>("triggers")? {
        Value::Nil => {}
        Value::Table(triggers) => {
            if let Some(push) = triggers
                .get::<Option<Value>>("push")
                .context("Failed to read 'triggers.push'")?
            {
                policy = policy.with_push_branches(string_list(push, "triggers.push")?);
            }
            if let Some(enabled) = triggers
                .get::<Option<bool>>("pull_request")
                .context("Field 'triggers.pull_request' must be a boolean")?
            {
                policy = policy.with_pull_requests(enabled);
            }
        }
        _ => bail!("Field 'triggers' must be a table"),
    }

    Ok(policy)
}

fn parse_stage(stage_table: &Table, idx: usize) -> Result<StageDefinition> {
    let name: String = stage_table
        .get("name")
        .with_context(|| format!("Stage {} must have a 'name' field", idx + 1))?;

    let mut stage = StageDefinition::new(name.clone());

    if let Some(needs) = stage_table.get::<Option<Value>>("needs")? {
        for prerequisite in string_list(needs, &format!("stages.{}.needs", name))? {
            stage = stage.needs(prerequisite);
        }
    }

    let continue_on_error: bool = stage_table
        .get::<Option<bool>>("continue_on_error")
        .with_context(|| format!("Stage '{}': 'continue_on_error' must be a boolean", name))?
        .unwrap_or(false);
    if continue_on_error {
        stage = stage.continue_on_error();
    }

    if let Some(env) = stage_table
        .get::<Option<Table>>("env")
        .with_context(|| format!("Stage '{}': 'env' must be a table", name))?
    {
        for pair in env.pairs::<String, String>() {
            let (key, value) =
                pair.with_context(|| format!("Stage '{}': env entries must be strings", name))?;
            stage = stage.env(key, value);
        }
    }

    let steps: Table = stage_table
        .get("steps")
        .with_context(|| format!("Stage '{}' must have a 'steps' field", name))?;

    for (step_idx, entry) in steps.sequence_values::<Value>().enumerate() {
        let value = entry.with_context(|| format!("Stage '{}': failed to read step", name))?;
        stage = stage.step(parse_step(value, &name, step_idx)?);
    }

    Ok(stage)
}

/// A step is either a bare command string or a table with a 'run' field
fn parse_step(value: Value, stage: &str, idx: usize) -> Result<StepDefinition> {
    let table = match value {
        Value::String(command) => {
            return Ok(StepDefinition::new(command.to_string_lossy()));
        }
        Value::Table(table) => table,
        other => bail!(
            "Stage '{}': step {} must be a string or a table, got {}",
            stage,
            idx + 1,
            other.type_name()
        ),
    };

    let command: String = table
        .get("run")
        .with_context(|| format!("Stage '{}': step {} must have a 'run' field", stage, idx + 1))?;

    let mut step = StepDefinition::new(command);

    if let Some(name) = table.get::<Option<String>>("name")? {
        step = step.named(name);
    }
    if let Some(cwd) = table.get::<Option<String>>("cwd")? {
        step = step.in_dir(cwd);
    }
    if let Some(cache) = table
        .get::<Option<Table>>("cache")
        .with_context(|| format!("Stage '{}': step {} cache must be a table", stage, idx + 1))?
    {
        step = step.cached(parse_cache(&cache, stage, idx)?);
    }

    Ok(step)
}

fn parse_cache(cache: &Table, stage: &str, idx: usize) -> Result<CacheSpec> {
    let key: String = cache.get("key").with_context(|| {
        format!("Stage '{}': step {} cache must have a 'key'", stage, idx + 1)
    })?;

    let mut spec = CacheSpec::new(key);

    if let Some(files) = cache.get::<Option<Value>>("files")? {
        for file in string_list(files, "cache.files")? {
            spec = spec.hash_file(file);
        }
    }
    if let Some(paths) = cache.get::<Option<Value>>("paths")? {
        for path in string_list(paths, "cache.paths")? {
            spec = spec.path(path);
        }
    }

    Ok(spec)
}

/// Accepts a single string or an array of strings
fn string_list(value: Value, field: &str) -> Result<Vec<String>> {
    match value {
        Value::String(s) => Ok(vec![s.to_string_lossy()]),
        Value::Table(table) => {
            let mut items = Vec::new();
            for entry in table.sequence_values::<String>() {
                items.push(entry.with_context(|| format!("Failed to read '{}' entry", field))?);
            }
            Ok(items)
        }
        _ => Err(anyhow!("Field '{}' must be a string or an array of strings", field)),
    }
}
