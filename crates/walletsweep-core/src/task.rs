use crate::{range::BlockRange, Error, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::{fmt, str::FromStr};

/// Opaque identifier assigned by the cluster executor at launch.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct TaskHandle(String);

impl TaskHandle {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TaskHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    Extract,
    Aggregate,
}

impl TaskKind {
    /// Value of the `TASK` variable in the remote invocation environment.
    pub fn wire_name(&self) -> &'static str {
        match self {
            TaskKind::Extract => "extract",
            TaskKind::Aggregate => "save",
        }
    }
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.wire_name())
    }
}

impl FromStr for TaskKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "extract" => Ok(TaskKind::Extract),
            "save" | "aggregate" => Ok(TaskKind::Aggregate),
            other => Err(Error::config(format!("unknown task: {other:?}"))),
        }
    }
}

/// Remote task lifecycle. Variants are declared in lifecycle order; `Ord` follows it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskStatus {
    Pending,
    Running,
    Stopping,
    Deprovisioning,
    Stopped,
}

impl TaskStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Stopped | TaskStatus::Deprovisioning)
    }

    /// Map an executor status string (ECS `lastStatus` vocabulary) onto the lifecycle.
    ///
    /// Returns `None` for strings outside the known vocabulary.
    pub fn from_executor(value: &str) -> Option<Self> {
        match value.trim().to_ascii_uppercase().as_str() {
            "PROVISIONING" | "PENDING" | "ACTIVATING" => Some(TaskStatus::Pending),
            "RUNNING" => Some(TaskStatus::Running),
            "DEACTIVATING" | "STOPPING" => Some(TaskStatus::Stopping),
            "DEPROVISIONING" => Some(TaskStatus::Deprovisioning),
            "STOPPED" | "DELETED" => Some(TaskStatus::Stopped),
            _ => None,
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TaskStatus::Pending => "PENDING",
            TaskStatus::Running => "RUNNING",
            TaskStatus::Stopping => "STOPPING",
            TaskStatus::Deprovisioning => "DEPROVISIONING",
            TaskStatus::Stopped => "STOPPED",
        };
        f.write_str(s)
    }
}

/// Raw exit metadata reported by the executor for a task.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ExitInfo {
    pub exit_code: Option<i32>,
    pub stopped_reason: Option<String>,
    pub container_reason: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub stopping_at: Option<DateTime<Utc>>,
    pub stopped_at: Option<DateTime<Utc>>,
}

/// One launched remote task, as tracked by the scheduler.
#[derive(Debug, Clone, Serialize)]
pub struct PartitionTask {
    pub handle: TaskHandle,
    pub kind: TaskKind,
    pub wallet: String,
    pub chain_id: String,
    pub range: Option<BlockRange>,
    status: TaskStatus,
    exit: ExitInfo,
}

impl PartitionTask {
    pub fn new(
        handle: TaskHandle,
        kind: TaskKind,
        wallet: impl Into<String>,
        chain_id: impl Into<String>,
        range: Option<BlockRange>,
    ) -> Self {
        Self {
            handle,
            kind,
            wallet: wallet.into(),
            chain_id: chain_id.into(),
            range,
            status: TaskStatus::Pending,
            exit: ExitInfo::default(),
        }
    }

    pub fn status(&self) -> TaskStatus {
        self.status
    }

    pub fn exit(&self) -> &ExitInfo {
        &self.exit
    }

    /// Apply an observed status. Returns `false` (and keeps the recorded status) when the
    /// observation would move the task back to an earlier lifecycle state.
    pub fn observe(&mut self, status: TaskStatus, exit: ExitInfo) -> bool {
        if status < self.status {
            return false;
        }
        self.status = status;
        self.exit = exit;
        true
    }

    pub fn succeeded(&self) -> bool {
        self.status.is_terminal() && self.exit.exit_code == Some(0)
    }
}
