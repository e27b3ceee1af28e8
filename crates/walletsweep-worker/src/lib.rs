//! walletsweep worker.
//!
//! One process runs one task, selected by the `TASK` variable: `extract` fetches a block chunk
//! of a wallet's history into a partition file, `save` unions partition files into the
//! wallet's aggregate CSV.

pub mod aggregate;
pub mod columnar;
pub mod config;
pub mod extract;
pub mod upstream;

use config::{WorkerConfig, WorkerJob};
use walletsweep_core::{Error, ObjectStore, Result};

pub const EXIT_SUCCESS: u8 = 0;
pub const EXIT_TASK_FAILED: u8 = 1;
pub const EXIT_CONFIG: u8 = 2;
pub const EXIT_UNKNOWN_TASK: u8 = 12;

pub fn exit_code_for(err: &Error) -> u8 {
    match err {
        Error::Config(_) => EXIT_CONFIG,
        _ => EXIT_TASK_FAILED,
    }
}

/// Run the task described by `cfg` against `store`.
pub async fn run(cfg: &WorkerConfig, job: &WorkerJob, store: &dyn ObjectStore) -> Result<()> {
    match job {
        WorkerJob::Extract(job) => {
            extract::run(job, store, cfg.storage.parquet_bucket()?).await?;
        }
        WorkerJob::Aggregate(job) => {
            aggregate::run(job, store, &cfg.storage).await?;
        }
    }
    Ok(())
}

/// Resolve the task from `cfg`, run it and map the result onto a process exit code.
pub async fn invoke(cfg: &WorkerConfig, store: &dyn ObjectStore) -> u8 {
    let kind = match cfg.task_kind() {
        Ok(kind) => kind,
        Err(err) => {
            tracing::error!(
                event = "walletsweep.worker.unknown_task",
                task = %cfg.task,
                error = %err,
                "unknown task"
            );
            return EXIT_UNKNOWN_TASK;
        }
    };

    let res = match cfg.job(kind) {
        Ok(job) => run(cfg, &job, store).await,
        Err(err) => Err(err),
    };

    match res {
        Ok(()) => EXIT_SUCCESS,
        Err(err) => {
            tracing::error!(
                event = "walletsweep.worker.failed",
                task = %kind,
                kind = err.kind(),
                error = %err,
                "task failed"
            );
            exit_code_for(&err)
        }
    }
}
