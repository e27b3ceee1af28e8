//! Scripted cluster executor shared by the scheduler integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use std::{collections::HashMap, sync::Mutex};
use walletsweep_core::{
    executor::{ClusterExecutor, LaunchOutcome, LaunchRequest, TaskDescription},
    Error, ExitInfo, Result, TaskHandle, TaskStatus,
};

/// Every launched task walks through `script`, one step per describe call, then stays on the
/// last status.
pub struct ScriptedExecutor {
    script: Vec<TaskStatus>,
    exit_code: i32,
    refuse_after: Option<usize>,
    empty_describe: bool,
    fail_describe: bool,
    state: Mutex<State>,
}

#[derive(Default)]
struct State {
    launches: Vec<LaunchRequest>,
    steps: HashMap<TaskHandle, usize>,
    describe_calls: usize,
}

impl ScriptedExecutor {
    pub fn new(script: Vec<TaskStatus>) -> Self {
        assert!(!script.is_empty());
        Self {
            script,
            exit_code: 0,
            refuse_after: None,
            empty_describe: false,
            fail_describe: false,
            state: Mutex::new(State::default()),
        }
    }

    pub fn exit_code(mut self, code: i32) -> Self {
        self.exit_code = code;
        self
    }

    /// Accept `n` launches, then report every further launch as not created.
    pub fn refuse_after(mut self, n: usize) -> Self {
        self.refuse_after = Some(n);
        self
    }

    pub fn empty_describe(mut self) -> Self {
        self.empty_describe = true;
        self
    }

    pub fn failing_describe(mut self) -> Self {
        self.fail_describe = true;
        self
    }

    pub fn launches(&self) -> Vec<LaunchRequest> {
        self.state.lock().unwrap().launches.clone()
    }

    pub fn describe_calls(&self) -> usize {
        self.state.lock().unwrap().describe_calls
    }
}

pub fn env_value<'a>(request: &'a LaunchRequest, name: &str) -> Option<&'a str> {
    request
        .env
        .iter()
        .find(|(k, _)| k == name)
        .map(|(_, v)| v.as_str())
}

#[async_trait]
impl ClusterExecutor for ScriptedExecutor {
    async fn run_task(&self, request: &LaunchRequest) -> Result<LaunchOutcome> {
        let mut state = self.state.lock().unwrap();
        if self
            .refuse_after
            .is_some_and(|n| state.launches.len() >= n)
        {
            state.launches.push(request.clone());
            return Ok(LaunchOutcome {
                handles: Vec::new(),
                failures: vec!["RESOURCE:ENI".to_string()],
            });
        }

        state.launches.push(request.clone());
        let handle = TaskHandle::new(format!("task-{}", state.launches.len()));
        state.steps.insert(handle.clone(), 0);
        Ok(LaunchOutcome {
            handles: vec![handle],
            failures: Vec::new(),
        })
    }

    async fn describe_tasks(&self, handles: &[TaskHandle]) -> Result<Vec<TaskDescription>> {
        let mut state = self.state.lock().unwrap();
        state.describe_calls += 1;
        if self.fail_describe {
            return Err(Error::Executor(anyhow::anyhow!("AccessDeniedException")));
        }
        if self.empty_describe {
            return Ok(Vec::new());
        }

        let mut out = Vec::new();
        for handle in handles {
            let Some(step) = state.steps.get_mut(handle) else {
                continue;
            };
            let status = self.script[(*step).min(self.script.len() - 1)];
            *step += 1;
            let exit = if status.is_terminal() {
                ExitInfo {
                    exit_code: Some(self.exit_code),
                    stopped_reason: Some("Essential container in task exited".to_string()),
                    ..ExitInfo::default()
                }
            } else {
                ExitInfo::default()
            };
            out.push(TaskDescription {
                handle: handle.clone(),
                last_status: status.to_string(),
                status,
                exit,
            });
        }
        Ok(out)
    }
}
