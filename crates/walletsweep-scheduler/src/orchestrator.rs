//! One extraction session: fan out extract tasks, wait, aggregate, wait.

use crate::{
    launcher::{LaunchContext, TaskLauncher},
    monitor::{MonitorPolicy, MonitorReport, TaskMonitor},
};
use serde::Serialize;
use std::{sync::Arc, time::Duration};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;
use walletsweep_core::{
    executor::ClusterExecutor,
    invocation::AggregateScope,
    lease::{LeaseStore, SessionLease},
    partition, BlockRange, ObjectStore, PartitionTask, Result, TaskKind,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionRequest {
    pub wallet: String,
    pub chain_id: String,
    pub from_block: u64,
    pub to_block: u64,
}

/// Where session leases live.
#[derive(Clone)]
pub struct SessionLeasing {
    pub store: Arc<dyn ObjectStore>,
    pub bucket: String,
    pub ttl: Duration,
}

#[derive(Clone)]
pub struct SessionSettings {
    pub target_url: String,
    pub chunk_size: u64,
    pub aggregate_scope: AggregateScope,
    pub monitor: MonitorPolicy,
    /// `None` disables the session lease; workers then skip lease verification.
    pub leasing: Option<SessionLeasing>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionReport {
    pub session_id: Uuid,
    pub extract_tasks: Vec<PartitionTask>,
    pub extract_wait: MonitorReport,
    pub aggregate_task: PartitionTask,
    pub aggregate_wait: MonitorReport,
}

impl SessionReport {
    /// `(succeeded, failed, unknown)` over every task of the session.
    pub fn tally(&self) -> (usize, usize, usize) {
        let mut succeeded = 0;
        let mut failed = 0;
        let mut unknown = 0;
        for task in self.extract_tasks.iter().chain(Some(&self.aggregate_task)) {
            match task.exit().exit_code {
                Some(0) if task.status().is_terminal() => succeeded += 1,
                Some(_) if task.status().is_terminal() => failed += 1,
                _ => unknown += 1,
            }
        }
        (succeeded, failed, unknown)
    }
}

pub struct Orchestrator {
    executor: Arc<dyn ClusterExecutor>,
    settings: SessionSettings,
}

impl Orchestrator {
    pub fn new(executor: Arc<dyn ClusterExecutor>, settings: SessionSettings) -> Self {
        Self { executor, settings }
    }

    pub async fn run(
        &self,
        request: &SessionRequest,
        cancel: &CancellationToken,
    ) -> Result<SessionReport> {
        let range = BlockRange::new(request.from_block, request.to_block)?;
        let session_id = Uuid::new_v4();

        tracing::info!(
            event = "walletsweep.scheduler.session.started",
            session_id = %session_id,
            wallet = %request.wallet,
            chain_id = %request.chain_id,
            range = %range,
            aggregate_scope = self.settings.aggregate_scope.as_str(),
            leasing = self.settings.leasing.is_some(),
            "session started"
        );

        let Some(leasing) = &self.settings.leasing else {
            return self.run_session(request, range, session_id, None, cancel).await;
        };

        let leases = LeaseStore::new(leasing.store.as_ref(), &leasing.bucket, leasing.ttl);
        let lease = leases
            .acquire(&request.chain_id, &request.wallet, session_id)
            .await?;

        let res = self
            .run_session(request, range, session_id, Some(&lease), cancel)
            .await;

        if let Err(err) = leases.release(&lease).await {
            tracing::warn!(
                event = "walletsweep.lease.release_failed",
                session_id = %session_id,
                error = %err,
                "failed to release session lease; it will expire at {}",
                lease.expires_at
            );
        }
        res
    }

    async fn run_session(
        &self,
        request: &SessionRequest,
        range: BlockRange,
        session_id: Uuid,
        lease: Option<&SessionLease>,
        cancel: &CancellationToken,
    ) -> Result<SessionReport> {
        let launcher = TaskLauncher::new(
            self.executor.clone(),
            LaunchContext {
                target_url: self.settings.target_url.clone(),
                chunk_size: self.settings.chunk_size,
                aggregate_scope: self.settings.aggregate_scope,
                session_id: lease.map(|l| l.session_id),
            },
        );
        let monitor = TaskMonitor::new(self.executor.clone(), self.settings.monitor);

        let chunks = partition(range.from(), range.to(), self.settings.chunk_size)?;
        let mut extract_tasks = Vec::with_capacity(chunks.len());
        for chunk in chunks {
            let task = launcher
                .launch(TaskKind::Extract, &request.wallet, &request.chain_id, Some(chunk))
                .await?;
            extract_tasks.push(task);
        }

        let extract_wait = monitor.wait(&mut extract_tasks, cancel).await?;

        let aggregate_range = match self.settings.aggregate_scope {
            AggregateScope::Cumulative => None,
            AggregateScope::Session => Some(range),
        };
        let aggregate_task = launcher
            .launch(
                TaskKind::Aggregate,
                &request.wallet,
                &request.chain_id,
                aggregate_range,
            )
            .await?;
        let mut aggregate = [aggregate_task];
        let aggregate_wait = monitor.wait(&mut aggregate, cancel).await?;
        let [aggregate_task] = aggregate;

        let report = SessionReport {
            session_id,
            extract_tasks,
            extract_wait,
            aggregate_task,
            aggregate_wait,
        };

        let (succeeded, failed, unknown) = report.tally();
        tracing::info!(
            event = "walletsweep.scheduler.session.finished",
            session_id = %session_id,
            wallet = %request.wallet,
            chain_id = %request.chain_id,
            extract_tasks = report.extract_tasks.len(),
            succeeded,
            failed,
            unknown,
            "session finished"
        );
        Ok(report)
    }
}
