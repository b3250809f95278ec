//! Runner configuration
//!
//! Defines where steps run, where cache blobs and captured output live, and
//! how much work may run at once.

use std::path::PathBuf;
use std::time::Duration;

/// Runner configuration
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    /// Directory steps run in (the checked-out repository)
    pub workspace_dir: PathBuf,

    /// Root of the content-addressed cache
    pub cache_dir: PathBuf,

    /// Root of captured step and stage output
    pub log_dir: PathBuf,

    /// Shell used to run step commands as `<shell> -c <command>`
    pub shell: String,

    /// Wall-clock limit per step; `None` means no limit
    pub step_timeout: Option<Duration>,

    /// Maximum number of stages of one batch running at the same time
    pub max_parallel_stages: usize,
}

impl RunnerConfig {
    /// Creates a configuration rooted at `workspace_dir`
    ///
    /// Cache and logs go under `<workspace_dir>/.gantry/`.
    pub fn new(workspace_dir: impl Into<PathBuf>) -> Self {
        let workspace_dir = workspace_dir.into();
        let state_dir = workspace_dir.join(".gantry");
        Self {
            cache_dir: state_dir.join("cache"),
            log_dir: state_dir.join("logs"),
            workspace_dir,
            shell: "sh".to_string(),
            step_timeout: None,
            max_parallel_stages: 4,
        }
    }

    /// Creates configuration from environment variables
    ///
    /// Expected environment variables (all optional):
    /// - GANTRY_WORKSPACE (default: current directory)
    /// - GANTRY_CACHE_DIR (default: $GANTRY_WORKSPACE/.gantry/cache)
    /// - GANTRY_LOG_DIR (default: $GANTRY_WORKSPACE/.gantry/logs)
    /// - GANTRY_SHELL (default: sh)
    /// - GANTRY_STEP_TIMEOUT (seconds, default: no timeout)
    /// - GANTRY_MAX_PARALLEL_STAGES (default: 4)
    pub fn from_env() -> anyhow::Result<Self> {
        let workspace_dir = std::env::var("GANTRY_WORKSPACE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("."));

        let mut config = Self::new(workspace_dir);

        if let Ok(dir) = std::env::var("GANTRY_CACHE_DIR") {
            config.cache_dir = PathBuf::from(dir);
        }

        if let Ok(dir) = std::env::var("GANTRY_LOG_DIR") {
            config.log_dir = PathBuf::from(dir);
        }

        if let Ok(shell) = std::env::var("GANTRY_SHELL") {
            config.shell = shell;
        }

        if let Ok(raw) = std::env::var("GANTRY_STEP_TIMEOUT") {
            let secs = raw.parse::<u64>().map_err(|_| {
                anyhow::anyhow!("GANTRY_STEP_TIMEOUT must be a number of seconds, got '{}'", raw)
            })?;
            config.step_timeout = Some(Duration::from_secs(secs));
        }

        if let Ok(raw) = std::env::var("GANTRY_MAX_PARALLEL_STAGES") {
            config.max_parallel_stages = raw.parse::<usize>().map_err(|_| {
                anyhow::anyhow!("GANTRY_MAX_PARALLEL_STAGES must be a number, got '{}'", raw)
            })?;
        }

        Ok(config)
    }

    pub fn with_step_timeout(mut self, timeout: Duration) -> Self {
        self.step_timeout = Some(timeout);
        self
    }

    /// Validates the configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.shell.trim().is_empty() {
            anyhow::bail!("shell cannot be empty");
        }

        if self.max_parallel_stages == 0 {
            anyhow::bail!("max_parallel_stages must be greater than 0");
        }

        if self.step_timeout.is_some_and(|t| t.is_zero()) {
            anyhow::bail!("step_timeout must be greater than 0");
        }

        Ok(())
    }
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self::new(".")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = RunnerConfig::default();
        assert_eq!(config.shell, "sh");
        assert_eq!(config.step_timeout, None);
        assert_eq!(config.max_parallel_stages, 4);
        assert_eq!(config.cache_dir, PathBuf::from("./.gantry/cache"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let mut config = RunnerConfig::default();
        assert!(config.validate().is_ok());

        config.max_parallel_stages = 0;
        assert!(config.validate().is_err());
        config.max_parallel_stages = 2;

        config.shell = " ".to_string();
        assert!(config.validate().is_err());
        config.shell = "bash".to_string();

        config.step_timeout = Some(Duration::ZERO);
        assert!(config.validate().is_err());

        let config = config.with_step_timeout(Duration::from_secs(30));
        assert!(config.validate().is_ok());
    }
}
