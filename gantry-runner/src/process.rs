//! Process execution
//!
//! Steps are opaque external processes. The [`CommandRunner`] trait is the
//! boundary between the engine and the host; [`ShellCommandRunner`] runs each
//! command through a shell.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Exit code reported when a step exceeds its timeout
pub const TIMEOUT_EXIT_CODE: i32 = 124;

/// Exit code reported when a step's process cannot be started
pub const SPAWN_FAILURE_EXIT_CODE: i32 = 127;

/// How long pipes are drained after a timed-out step is killed
const DRAIN_GRACE: Duration = Duration::from_millis(200);

/// A command ready to run
#[derive(Debug, Clone)]
pub struct CommandSpec {
    pub command: String,
    pub working_dir: PathBuf,
    /// Added to the inherited process environment
    pub env: BTreeMap<String, String>,
}

/// Captured result of a finished command
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub exit_code: i32,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Runs commands for the step executor
///
/// Implementations never fail: spawn errors and timeouts are reported as
/// exit codes with a message on stderr.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    async fn run(&self, spec: &CommandSpec, timeout: Option<Duration>) -> CommandOutput;
}

/// Runs commands as `<shell> -c <command>`
#[derive(Debug, Clone)]
pub struct ShellCommandRunner {
    shell: String,
}

impl ShellCommandRunner {
    pub fn new(shell: impl Into<String>) -> Self {
        Self {
            shell: shell.into(),
        }
    }
}

impl Default for ShellCommandRunner {
    fn default() -> Self {
        Self::new("sh")
    }
}

#[async_trait]
impl CommandRunner for ShellCommandRunner {
    async fn run(&self, spec: &CommandSpec, timeout: Option<Duration>) -> CommandOutput {
        debug!(
            "Executing command in {}: {}",
            spec.working_dir.display(),
            spec.command
        );

        let child = Command::new(&self.shell)
            .arg("-c")
            .arg(&spec.command)
            .current_dir(&spec.working_dir)
            .envs(&spec.env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn();

        let mut child = match child {
            Ok(child) => child,
            Err(e) => {
                warn!("Failed to spawn '{}': {}", spec.command, e);
                return CommandOutput {
                    exit_code: SPAWN_FAILURE_EXIT_CODE,
                    stdout: Vec::new(),
                    stderr: format!("failed to start command: {}\n", e).into_bytes(),
                };
            }
        };

        let (stdout, stdout_task) = capture(child.stdout.take());
        let (stderr, stderr_task) = capture(child.stderr.take());
        let mut readers: Vec<JoinHandle<()>> =
            [stdout_task, stderr_task].into_iter().flatten().collect();

        let waited = match timeout {
            Some(limit) => match tokio::time::timeout(limit, child.wait()).await {
                Ok(status) => Some(status),
                Err(_) => {
                    warn!("Command timed out after {:?}: {}", limit, spec.command);
                    if let Err(e) = child.kill().await {
                        warn!("Failed to kill timed-out command: {}", e);
                    }
                    None
                }
            },
            None => Some(child.wait().await),
        };

        let drain = async {
            for reader in readers.iter_mut() {
                let _ = reader.await;
            }
        };
        match waited {
            Some(_) => drain.await,
            // Orphaned grandchildren may keep the pipes open
            None => {
                let _ = tokio::time::timeout(DRAIN_GRACE, drain).await;
            }
        }
        for reader in &readers {
            reader.abort();
        }

        let stdout = std::mem::take(&mut *stdout.lock());
        let mut stderr = std::mem::take(&mut *stderr.lock());

        let exit_code = match waited {
            Some(Ok(status)) => status.code().unwrap_or(-1),
            Some(Err(e)) => {
                stderr.extend_from_slice(format!("failed to wait for command: {}\n", e).as_bytes());
                -1
            }
            None => {
                if let Some(limit) = timeout {
                    stderr.extend_from_slice(
                        format!("step timed out after {:?}\n", limit).as_bytes(),
                    );
                }
                TIMEOUT_EXIT_CODE
            }
        };

        CommandOutput {
            exit_code,
            stdout,
            stderr,
        }
    }
}

type Captured = Arc<Mutex<Vec<u8>>>;

/// Copies a child pipe into a shared buffer as output arrives
fn capture<R>(pipe: Option<R>) -> (Captured, Option<JoinHandle<()>>)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    let buffer = Captured::default();
    let task = pipe.map(|mut pipe| {
        let buffer = Arc::clone(&buffer);
        tokio::spawn(async move {
            let mut chunk = [0u8; 8192];
            loop {
                match pipe.read(&mut chunk).await {
                    Ok(0) | Err(_) => break,
                    Ok(n) => buffer.lock().extend_from_slice(&chunk[..n]),
                }
            }
        })
    });
    (buffer, task)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(command: &str, dir: &std::path::Path) -> CommandSpec {
        CommandSpec {
            command: command.to_string(),
            working_dir: dir.to_path_buf(),
            env: BTreeMap::new(),
        }
    }

    #[tokio::test]
    async fn test_captures_output_and_exit_code() {
        let dir = tempfile::tempdir().unwrap();
        let output = ShellCommandRunner::default()
            .run(&spec("echo out; echo err >&2; exit 3", dir.path()), None)
            .await;

        assert_eq!(output.exit_code, 3);
        assert_eq!(output.stdout, b"out\n");
        assert_eq!(output.stderr, b"err\n");
    }

    #[tokio::test]
    async fn test_env_and_working_dir() {
        let dir = tempfile::tempdir().unwrap();
        let mut spec = spec("echo $GREETING > greeting.txt", dir.path());
        spec.env.insert("GREETING".to_string(), "hello".to_string());

        let output = ShellCommandRunner::default().run(&spec, None).await;
        assert!(output.success());
        assert_eq!(
            std::fs::read_to_string(dir.path().join("greeting.txt")).unwrap(),
            "hello\n"
        );
    }

    #[tokio::test]
    async fn test_timeout_reports_124() {
        let dir = tempfile::tempdir().unwrap();
        let output = ShellCommandRunner::default()
            .run(&spec("sleep 5", dir.path()), Some(Duration::from_millis(100)))
            .await;

        assert_eq!(output.exit_code, TIMEOUT_EXIT_CODE);
        assert!(String::from_utf8_lossy(&output.stderr).contains("timed out"));
    }

    #[tokio::test]
    async fn test_timeout_keeps_partial_output() {
        let dir = tempfile::tempdir().unwrap();
        let output = ShellCommandRunner::default()
            .run(
                &spec("echo partial; echo warming up >&2; sleep 5", dir.path()),
                Some(Duration::from_millis(300)),
            )
            .await;

        assert_eq!(output.exit_code, TIMEOUT_EXIT_CODE);
        assert_eq!(output.stdout, b"partial\n");
        let stderr = String::from_utf8_lossy(&output.stderr);
        assert!(stderr.starts_with("warming up\n"));
        assert!(stderr.contains("timed out"));
    }

    #[tokio::test]
    async fn test_spawn_failure_reports_127() {
        let dir = tempfile::tempdir().unwrap();
        let output = ShellCommandRunner::new("/nonexistent/shell")
            .run(&spec("true", dir.path()), None)
            .await;

        assert_eq!(output.exit_code, SPAWN_FAILURE_EXIT_CODE);
        assert!(String::from_utf8_lossy(&output.stderr).contains("failed to start"));
    }
}
