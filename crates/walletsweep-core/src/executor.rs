use async_trait::async_trait;

use crate::{
    task::{ExitInfo, TaskHandle, TaskStatus},
    Result,
};

/// One task-launch request as handed to the cluster executor.
#[derive(Debug, Clone)]
pub struct LaunchRequest {
    /// Grouping label shared by all tasks of a wallet/chain (`{wallet}-{chain_id}`).
    pub group: String,
    /// Invocation environment for the remote worker process.
    pub env: Vec<(String, String)>,
}

#[derive(Debug, Clone, Default)]
pub struct LaunchOutcome {
    pub handles: Vec<TaskHandle>,
    /// Executor-reported reasons for tasks it did not create.
    pub failures: Vec<String>,
}

/// Current lifecycle state of one task, as reported by a describe call.
#[derive(Debug, Clone)]
pub struct TaskDescription {
    pub handle: TaskHandle,
    /// Raw executor status string (kept for logging).
    pub last_status: String,
    pub status: TaskStatus,
    pub exit: ExitInfo,
}

/// Remote compute cluster running worker tasks.
///
/// Lifecycle ownership stays with the executor: the scheduler only launches and describes.
#[async_trait]
pub trait ClusterExecutor: Send + Sync {
    async fn run_task(&self, request: &LaunchRequest) -> Result<LaunchOutcome>;

    /// Batch describe. Handles the executor does not know are omitted from the result.
    async fn describe_tasks(&self, handles: &[TaskHandle]) -> Result<Vec<TaskDescription>>;
}
