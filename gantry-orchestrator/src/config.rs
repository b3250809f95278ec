//! Orchestrator configuration

use std::path::PathBuf;

use gantry_runner::RunnerConfig;

/// Orchestrator configuration
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Address the HTTP API listens on
    pub bind_addr: String,

    /// Lua pipeline document, re-read on every submission
    pub pipeline_path: PathBuf,

    /// Settings for the in-process runner
    pub runner: RunnerConfig,
}

impl OrchestratorConfig {
    /// Creates configuration from environment variables
    ///
    /// Expected environment variables (all optional):
    /// - GANTRY_BIND_ADDR (default: 0.0.0.0:8080)
    /// - GANTRY_PIPELINE (default: pipeline.lua)
    ///
    /// Runner settings are read by [`RunnerConfig::from_env`].
    pub fn from_env() -> anyhow::Result<Self> {
        let mut config = Self {
            runner: RunnerConfig::from_env()?,
            ..Self::default()
        };

        if let Ok(addr) = std::env::var("GANTRY_BIND_ADDR") {
            config.bind_addr = addr;
        }

        if let Ok(path) = std::env::var("GANTRY_PIPELINE") {
            config.pipeline_path = PathBuf::from(path);
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.bind_addr.trim().is_empty() {
            anyhow::bail!("bind address cannot be empty");
        }

        if self.pipeline_path.as_os_str().is_empty() {
            anyhow::bail!("pipeline path cannot be empty");
        }

        self.runner.validate()
    }
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:8080".to_string(),
            pipeline_path: PathBuf::from("pipeline.lua"),
            runner: RunnerConfig::default(),
        }
    }
}
