use async_trait::async_trait;
use chrono::Utc;
use std::{collections::HashMap, path::PathBuf, process::Stdio};
use tokio::{process::Child, sync::Mutex};
use uuid::Uuid;
use walletsweep_core::{
    executor::{ClusterExecutor, LaunchOutcome, LaunchRequest, TaskDescription},
    Error, ExitInfo, Result, TaskHandle, TaskStatus,
};

const HANDLE_PREFIX: &str = "local:";

struct LocalTask {
    group: String,
    child: Child,
    exit: ExitInfo,
    finished: bool,
}

/// Runs each task as a child process of the scheduler (Lite mode).
///
/// The invocation environment is layered over the scheduler's own environment, so storage
/// settings reach the worker without being part of the invocation contract.
pub struct LocalProcessExecutor {
    worker_bin: PathBuf,
    tasks: Mutex<HashMap<TaskHandle, LocalTask>>,
}

impl LocalProcessExecutor {
    pub fn new(worker_bin: impl Into<PathBuf>) -> Self {
        Self {
            worker_bin: worker_bin.into(),
            tasks: Mutex::new(HashMap::new()),
        }
    }
}

#[async_trait]
impl ClusterExecutor for LocalProcessExecutor {
    async fn run_task(&self, request: &LaunchRequest) -> Result<LaunchOutcome> {
        let mut cmd = tokio::process::Command::new(&self.worker_bin);
        cmd.envs(request.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(Stdio::null())
            .kill_on_drop(true);

        let child = match cmd.spawn() {
            Ok(child) => child,
            Err(err) => {
                return Ok(LaunchOutcome {
                    handles: Vec::new(),
                    failures: vec![format!(
                        "spawn {}: {err}",
                        self.worker_bin.display()
                    )],
                });
            }
        };

        let handle = TaskHandle::new(format!("{HANDLE_PREFIX}{}", Uuid::new_v4()));
        tracing::debug!(
            event = "walletsweep.executor.local.spawned",
            handle = %handle,
            group = %request.group,
            pid = child.id(),
            "spawned local worker"
        );

        self.tasks.lock().await.insert(
            handle.clone(),
            LocalTask {
                group: request.group.clone(),
                child,
                exit: ExitInfo {
                    started_at: Some(Utc::now()),
                    ..ExitInfo::default()
                },
                finished: false,
            },
        );

        Ok(LaunchOutcome {
            handles: vec![handle],
            failures: Vec::new(),
        })
    }

    async fn describe_tasks(&self, handles: &[TaskHandle]) -> Result<Vec<TaskDescription>> {
        let mut tasks = self.tasks.lock().await;
        let mut out = Vec::with_capacity(handles.len());

        for handle in handles {
            let Some(task) = tasks.get_mut(handle) else {
                continue;
            };

            if !task.finished {
                let polled = task.child.try_wait().map_err(|err| {
                    Error::Executor(anyhow::Error::from(err).context(format!(
                        "poll local worker {handle} (group {})",
                        task.group
                    )))
                })?;
                if let Some(status) = polled {
                    task.finished = true;
                    task.exit.stopped_at = Some(Utc::now());
                    task.exit.exit_code = status.code();
                    task.exit.stopped_reason = Some(if status.success() {
                        "Essential container in task exited".to_string()
                    } else {
                        format!("worker process exited: {status}")
                    });
                }
            }

            let status = if task.finished {
                TaskStatus::Stopped
            } else {
                TaskStatus::Running
            };
            out.push(TaskDescription {
                handle: handle.clone(),
                last_status: status.to_string(),
                status,
                exit: task.exit.clone(),
            });
        }

        Ok(out)
    }
}
