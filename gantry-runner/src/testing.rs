//! Test doubles for the engine

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::Notify;

use gantry_core::domain::event::{Event, EventKind};
use gantry_core::domain::pipeline::{PipelineDefinition, StageDefinition, StepDefinition};

use crate::process::{CommandOutput, CommandRunner, CommandSpec};

/// What a scripted command does when run
#[derive(Clone)]
pub enum Behavior {
    Exit(i32),
    /// Blocks until the notify is signalled, then exits 0
    WaitFor(Arc<Notify>),
}

/// Command runner answering from a script instead of spawning processes
///
/// Commands without a script entry exit 0.
#[derive(Default)]
pub struct ScriptedRunner {
    script: Mutex<HashMap<String, Behavior>>,
    invoked: Mutex<Vec<String>>,
}

impl ScriptedRunner {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn on(&self, command: &str, behavior: Behavior) {
        self.script.lock().insert(command.to_string(), behavior);
    }

    /// Commands in the order they were started
    pub fn invoked(&self) -> Vec<String> {
        self.invoked.lock().clone()
    }

    pub fn was_invoked(&self, command: &str) -> bool {
        self.invoked.lock().iter().any(|c| c == command)
    }

    /// Waits until every listed command has started
    pub async fn wait_until_started(&self, commands: &[&str]) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while !commands.iter().all(|c| self.was_invoked(c)) {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("commands did not start in time");
    }
}

#[async_trait]
impl CommandRunner for ScriptedRunner {
    async fn run(&self, spec: &CommandSpec, _timeout: Option<Duration>) -> CommandOutput {
        self.invoked.lock().push(spec.command.clone());
        let behavior = self.script.lock().get(&spec.command).cloned();

        let exit_code = match behavior {
            Some(Behavior::Exit(code)) => code,
            Some(Behavior::WaitFor(notify)) => {
                notify.notified().await;
                0
            }
            None => 0,
        };

        CommandOutput {
            exit_code,
            stdout: format!("ran {}\n", spec.command).into_bytes(),
            stderr: Vec::new(),
        }
    }
}

pub fn push_event() -> Event {
    Event {
        kind: EventKind::Push,
        branch: "main".to_string(),
        commit: "abc123".to_string(),
    }
}

/// Stage with a single step whose command is `<name>-cmd`
pub fn stage(name: &str) -> StageDefinition {
    StageDefinition::new(name).step(StepDefinition::new(format!("{name}-cmd")))
}

/// The reference web-application pipeline
///
/// backend-tests, frontend-tests → integration-tests → docker-build → deploy
pub fn web_pipeline(continue_on_error: bool) -> PipelineDefinition {
    let tests = |name: &str| {
        let stage = stage(name);
        if continue_on_error {
            stage.continue_on_error()
        } else {
            stage
        }
    };

    PipelineDefinition::builder("web-app")
        .stage(tests("backend-tests"))
        .stage(tests("frontend-tests"))
        .stage(
            stage("integration-tests")
                .needs("backend-tests")
                .needs("frontend-tests"),
        )
        .stage(stage("docker-build").needs("integration-tests"))
        .stage(stage("deploy").needs("docker-build"))
        .build()
        .expect("web pipeline is valid")
}
