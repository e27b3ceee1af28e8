use std::sync::Arc;
use uuid::Uuid;
use walletsweep_core::{
    executor::{ClusterExecutor, LaunchRequest},
    invocation::{AggregateScope, TaskInvocation},
    BlockRange, Error, PartitionTask, Result, TaskKind,
};

/// Invocation fields shared by every task of one session.
#[derive(Debug, Clone)]
pub struct LaunchContext {
    pub target_url: String,
    pub chunk_size: u64,
    pub aggregate_scope: AggregateScope,
    pub session_id: Option<Uuid>,
}

pub struct TaskLauncher {
    executor: Arc<dyn ClusterExecutor>,
    context: LaunchContext,
}

impl TaskLauncher {
    pub fn new(executor: Arc<dyn ClusterExecutor>, context: LaunchContext) -> Self {
        Self { executor, context }
    }

    /// Submit one remote task. Fails with [`Error::Launch`] if the executor created none.
    pub async fn launch(
        &self,
        kind: TaskKind,
        wallet: &str,
        chain_id: &str,
        range: Option<BlockRange>,
    ) -> Result<PartitionTask> {
        let invocation = TaskInvocation {
            kind,
            wallet: wallet.to_string(),
            chain_id: chain_id.to_string(),
            range,
            target_url: self.context.target_url.clone(),
            chunk_size: self.context.chunk_size,
            aggregate_scope: self.context.aggregate_scope,
            session_id: self.context.session_id,
        };
        let request = LaunchRequest {
            group: task_group(wallet, chain_id),
            env: invocation.to_env(),
        };

        let outcome = self.executor.run_task(&request).await?;

        let mut handles = outcome.handles.into_iter();
        let Some(handle) = handles.next() else {
            tracing::error!(
                event = "walletsweep.scheduler.launch.failed",
                task = %kind,
                wallet = %wallet,
                chain_id = %chain_id,
                range = ?range,
                failures = ?outcome.failures,
                "executor created no task"
            );
            return Err(Error::Launch {
                reasons: outcome.failures,
            });
        };
        let extra = handles.len();
        if extra > 0 {
            tracing::warn!(
                event = "walletsweep.scheduler.launch.extra_tasks",
                handle = %handle,
                extra,
                "executor created more tasks than requested; tracking the first"
            );
        }

        tracing::info!(
            event = "walletsweep.scheduler.launch",
            task = %kind,
            handle = %handle,
            wallet = %wallet,
            chain_id = %chain_id,
            from_block = range.map(|r| r.from()),
            to_block = range.map(|r| r.to()),
            "launched task"
        );

        Ok(PartitionTask::new(handle, kind, wallet, chain_id, range))
    }
}

pub fn task_group(wallet: &str, chain_id: &str) -> String {
    format!("{wallet}-{chain_id}")
}
