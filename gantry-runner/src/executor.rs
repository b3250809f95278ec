//! Step executor
//!
//! Runs one step: consults the cache, runs the command, stores its output,
//! and populates the cache on success. Cache and log-store failures are
//! logged and never change a step's outcome.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use gantry_core::domain::log::{LogRef, OutputStream};
use gantry_core::domain::pipeline::{CacheSpec, StepDefinition};
use gantry_core::domain::run::{StepOutcome, StepRecord};

use crate::cache::{CacheError, CacheStore, CachedArtifact, effective_key, safe_relative};
use crate::context::RunContext;
use crate::logs::LogStore;
use crate::process::{CommandOutput, CommandRunner, CommandSpec, SPAWN_FAILURE_EXIT_CODE};

/// Result of one step, with the captured output kept for the stage log
#[derive(Debug, Clone)]
pub struct StepResult {
    pub record: StepRecord,
    pub output: CommandOutput,
}

/// Executes steps against a workspace
pub struct StepExecutor {
    runner: Arc<dyn CommandRunner>,
    cache: Arc<dyn CacheStore>,
    logs: Arc<dyn LogStore>,
    workspace: PathBuf,
    timeout: Option<Duration>,
}

impl StepExecutor {
    pub fn new(
        runner: Arc<dyn CommandRunner>,
        cache: Arc<dyn CacheStore>,
        logs: Arc<dyn LogStore>,
        workspace: impl Into<PathBuf>,
    ) -> Self {
        Self {
            runner,
            cache,
            logs,
            workspace: workspace.into(),
            timeout: None,
        }
    }

    /// Kills steps running longer than `timeout`
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn logs(&self) -> &Arc<dyn LogStore> {
        &self.logs
    }

    pub fn cache(&self) -> &Arc<dyn CacheStore> {
        &self.cache
    }

    /// Runs step number `index` (from 1) of `stage`
    ///
    /// # Arguments
    /// * `ctx` - The run this step belongs to
    /// * `stage` - Name of the enclosing stage
    /// * `index` - Position of the step in its stage, starting at 1
    /// * `step` - The step to run
    /// * `env` - Variables added to the inherited environment
    pub async fn run(
        &self,
        ctx: &RunContext,
        stage: &str,
        index: usize,
        step: &StepDefinition,
        env: &BTreeMap<String, String>,
    ) -> StepResult {
        let working_dir = match &step.working_directory {
            Some(dir) => match safe_relative(dir) {
                Ok(relative) => self.workspace.join(relative),
                Err(_) => {
                    warn!(
                        "Step '{}' of stage '{}' has working directory '{}' outside the workspace",
                        step.display_name(),
                        stage,
                        dir
                    );
                    let output = CommandOutput {
                        exit_code: SPAWN_FAILURE_EXIT_CODE,
                        stdout: Vec::new(),
                        stderr: format!("working directory '{}' is outside the workspace\n", dir)
                            .into_bytes(),
                    };
                    return self.finish(ctx, stage, index, step, output, 0, None, false);
                }
            },
            None => self.workspace.clone(),
        };

        let cache_key = match &step.cache {
            Some(spec) => self.resolve_key(ctx, spec, &working_dir).await,
            None => None,
        };

        if let Some(key) = &cache_key {
            match self.restore(key, &working_dir).await {
                Ok(Some(files)) => {
                    info!(
                        "Cache hit for step '{}' of stage '{}' (key {}, {} files)",
                        step.display_name(),
                        stage,
                        key,
                        files
                    );
                    ctx.log_info(format!(
                        "Stage '{}': step '{}' restored from cache ({})",
                        stage,
                        step.display_name(),
                        key
                    ));
                    let output = CommandOutput {
                        exit_code: 0,
                        stdout: format!("restored {} cached files for key {}\n", files, key)
                            .into_bytes(),
                        stderr: Vec::new(),
                    };
                    return self.finish(ctx, stage, index, step, output, 0, cache_key, true);
                }
                Ok(None) => debug!("Cache miss for key {}", key),
                Err(e) => {
                    warn!("Cache restore failed for key {}: {}", key, e);
                    ctx.log_warning(format!("Cache restore failed for key {}: {}", key, e));
                }
            }
        }

        let spec = CommandSpec {
            command: step.command.clone(),
            working_dir: working_dir.clone(),
            env: env.clone(),
        };

        let started = Instant::now();
        let output = self.runner.run(&spec, self.timeout).await;
        let duration_ms = started.elapsed().as_millis() as u64;

        if output.success() {
            if let (Some(key), Some(cache_spec)) = (&cache_key, &step.cache) {
                self.save(ctx, key, cache_spec, &working_dir).await;
            }
        }

        self.finish(ctx, stage, index, step, output, duration_ms, cache_key, false)
    }

    #[allow(clippy::too_many_arguments)]
    fn finish(
        &self,
        ctx: &RunContext,
        stage: &str,
        index: usize,
        step: &StepDefinition,
        output: CommandOutput,
        duration_ms: u64,
        cache_key: Option<String>,
        cache_hit: bool,
    ) -> StepResult {
        let stdout_ref = self.store_output(ctx, stage, index, OutputStream::Stdout, &output.stdout);
        let stderr_ref = self.store_output(ctx, stage, index, OutputStream::Stderr, &output.stderr);

        let outcome = if cache_hit {
            StepOutcome::CacheHit
        } else if output.success() {
            StepOutcome::Succeeded
        } else {
            StepOutcome::Failed
        };

        StepResult {
            record: StepRecord {
                name: step.display_name().to_string(),
                outcome,
                exit_code: Some(output.exit_code),
                stdout_ref,
                stderr_ref,
                duration_ms,
                cache_key,
            },
            output,
        }
    }

    fn store_output(
        &self,
        ctx: &RunContext,
        stage: &str,
        index: usize,
        stream: OutputStream,
        contents: &[u8],
    ) -> Option<LogRef> {
        let log_ref = LogRef::for_step(ctx.run_id, stage, index, stream);
        match self.logs.write(&log_ref, contents) {
            Ok(()) => Some(log_ref),
            Err(e) => {
                warn!("Failed to store {} of {}: {}", stream.as_str(), log_ref, e);
                None
            }
        }
    }

    async fn resolve_key(&self, ctx: &RunContext, spec: &CacheSpec, dir: &Path) -> Option<String> {
        let spec = spec.clone();
        let dir = dir.to_path_buf();
        let resolved = tokio::task::spawn_blocking(move || effective_key(&spec, &dir)).await;

        match resolved {
            Ok(Ok(key)) => Some(key),
            Ok(Err(e)) => {
                warn!("Failed to compute cache key: {}", e);
                ctx.log_warning(format!("Cache disabled for this step: {}", e));
                None
            }
            Err(e) => {
                warn!("Cache key task failed: {}", e);
                None
            }
        }
    }

    /// Restores the artifact bound to `key`; `Ok(None)` on a miss
    async fn restore(&self, key: &str, dir: &Path) -> Result<Option<usize>, CacheError> {
        let cache = Arc::clone(&self.cache);
        let key = key.to_string();
        let dir = dir.to_path_buf();

        tokio::task::spawn_blocking(move || {
            let Some(content_ref) = cache.get(&key)? else {
                return Ok(None);
            };
            let artifact = CachedArtifact::from_bytes(&cache.read(&content_ref)?)?;
            artifact.restore(&dir).map(Some)
        })
        .await
        .map_err(|e| CacheError::Io(std::io::Error::other(e)))?
    }

    async fn save(&self, ctx: &RunContext, key: &str, spec: &CacheSpec, dir: &Path) {
        let cache = Arc::clone(&self.cache);
        let owned_key = key.to_string();
        let paths = spec.paths.clone();
        let dir = dir.to_path_buf();

        let saved = tokio::task::spawn_blocking(move || {
            let artifact = CachedArtifact::capture(&dir, &paths)?;
            cache.put(&owned_key, &artifact.to_bytes()?)
        })
        .await
        .map_err(|e| CacheError::Io(std::io::Error::other(e)));

        match saved {
            Ok(Ok(content_ref)) => debug!("Cached key {} as {}", key, content_ref),
            Ok(Err(e)) | Err(e) => {
                warn!("Failed to populate cache for key {}: {}", key, e);
                ctx.log_warning(format!("Failed to populate cache for key {}: {}", key, e));
            }
        }
    }
}
