//! Gantry Runner
//!
//! The execution engine of the Gantry CI/CD system.
//!
//! Architecture:
//! - Configuration: workspace, cache and log locations, shell, limits
//! - Stores: content-addressed step cache and captured-output store
//! - Executor: runs one step (cache lookup, process, output capture)
//! - Stage: runs a stage's steps in order, fail-fast
//! - Engine: drives a run through its topological batches
//! - Manager: admits events and tracks runs
//!
//! Runs are executed in-process by whoever owns the [`RunManager`]: the
//! orchestrator for webhook-driven runs, the CLI for local ones.

pub mod cache;
pub mod config;
pub mod context;
pub mod engine;
pub mod error;
pub mod executor;
pub mod logs;
pub mod manager;
pub mod process;
pub mod stage;

#[cfg(test)]
mod testing;

pub use cache::{CacheError, CacheStore, FsCacheStore, InMemoryCacheStore};
pub use config::RunnerConfig;
pub use context::RunContext;
pub use engine::PipelineRunner;
pub use error::{RunError, SubmitError};
pub use executor::{StepExecutor, StepResult};
pub use logs::{FsLogStore, InMemoryLogStore, LogStore, LogStoreError};
pub use manager::RunManager;
pub use process::{CommandOutput, CommandRunner, CommandSpec, ShellCommandRunner};
