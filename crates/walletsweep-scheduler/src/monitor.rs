//! Polling wait over a batch of launched tasks.

use serde::Serialize;
use std::{sync::Arc, time::Duration};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use walletsweep_core::{
    executor::{ClusterExecutor, TaskDescription},
    Error, PartitionTask, Result, TaskHandle,
};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MonitorPolicy {
    pub poll_interval: Duration,
    /// `None` waits until the batch settles or the caller cancels.
    pub max_wait: Option<Duration>,
}

impl Default for MonitorPolicy {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            max_wait: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MonitorOutcome {
    /// Every described task reached a terminal status.
    AllTerminal,
    /// The executor returned no entries for the batch. Not a success signal.
    NothingToObserve,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MonitorReport {
    pub outcome: MonitorOutcome,
    pub polls: u32,
}

pub struct TaskMonitor {
    executor: Arc<dyn ClusterExecutor>,
    policy: MonitorPolicy,
}

impl TaskMonitor {
    pub fn new(executor: Arc<dyn ClusterExecutor>, policy: MonitorPolicy) -> Self {
        Self { executor, policy }
    }

    /// Poll until every task in `tasks` is terminal or the executor stops reporting them.
    ///
    /// Observed statuses and exit metadata are applied to `tasks` as they arrive.
    pub async fn wait(
        &self,
        tasks: &mut [PartitionTask],
        cancel: &CancellationToken,
    ) -> Result<MonitorReport> {
        if tasks.is_empty() {
            return Err(Error::config("cannot wait on an empty batch of tasks"));
        }

        let handles: Vec<TaskHandle> = tasks.iter().map(|t| t.handle.clone()).collect();
        let started = Instant::now();
        let deadline = self.policy.max_wait.map(|d| started + d);
        let mut polls = 0u32;

        loop {
            if cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }

            polls += 1;
            let described = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(Error::Cancelled),
                res = self.executor.describe_tasks(&handles) => res?,
            };

            tracing::debug!(
                event = "walletsweep.monitor.poll",
                poll = polls,
                tasks = handles.len(),
                described = described.len(),
                "polled task statuses"
            );

            if described.is_empty() {
                tracing::warn!(
                    event = "walletsweep.monitor.nothing_to_observe",
                    tasks = handles.len(),
                    "executor reported none of the tasks; ending wait"
                );
                return Ok(MonitorReport {
                    outcome: MonitorOutcome::NothingToObserve,
                    polls,
                });
            }

            let mut all_terminal = true;
            for d in &described {
                log_description(d);
                let recorded = match tasks.iter_mut().find(|t| t.handle == d.handle) {
                    Some(task) => {
                        if !task.observe(d.status, d.exit.clone()) {
                            tracing::warn!(
                                event = "walletsweep.monitor.status.regressed",
                                handle = %d.handle,
                                recorded = %task.status(),
                                observed = %d.status,
                                "ignoring status regression"
                            );
                        }
                        task.status()
                    }
                    None => d.status,
                };
                all_terminal &= recorded.is_terminal();
            }

            if all_terminal {
                tracing::info!(
                    event = "walletsweep.monitor.settled",
                    polls,
                    tasks = handles.len(),
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "all tasks reached a terminal status"
                );
                return Ok(MonitorReport {
                    outcome: MonitorOutcome::AllTerminal,
                    polls,
                });
            }

            let sleep = match deadline {
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        let waited = now - started;
                        tracing::warn!(
                            event = "walletsweep.monitor.timeout",
                            polls,
                            waited_secs = waited.as_secs(),
                            "gave up waiting for tasks"
                        );
                        return Err(Error::Timeout { waited });
                    }
                    self.policy.poll_interval.min(deadline - now)
                }
                None => self.policy.poll_interval,
            };

            tokio::select! {
                _ = cancel.cancelled() => return Err(Error::Cancelled),
                _ = tokio::time::sleep(sleep) => {}
            }
        }
    }
}

fn log_description(d: &TaskDescription) {
    tracing::info!(
        event = "walletsweep.monitor.task",
        handle = %d.handle,
        status = %d.last_status,
        stopped_reason = d.exit.stopped_reason.as_deref().unwrap_or("-"),
        exit_code = d.exit.exit_code,
        container_reason = d.exit.container_reason.as_deref().unwrap_or("-"),
        started_at = ?d.exit.started_at,
        stopping_at = ?d.exit.stopping_at,
        stopped_at = ?d.exit.stopped_at,
        "task status"
    );
}
