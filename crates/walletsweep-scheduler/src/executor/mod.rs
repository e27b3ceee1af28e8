//! Cluster executor adapters.

use crate::config::{ExecutorKind, SchedulerConfig};
use std::sync::Arc;
use walletsweep_core::{executor::ClusterExecutor, Result};

#[cfg(feature = "aws")]
pub mod ecs;
pub mod local;

pub use local::LocalProcessExecutor;

pub async fn build(cfg: &SchedulerConfig) -> Result<Arc<dyn ClusterExecutor>> {
    match cfg.executor {
        ExecutorKind::Local => Ok(Arc::new(LocalProcessExecutor::new(cfg.worker_bin.clone()))),
        ExecutorKind::Ecs => build_ecs(cfg).await,
    }
}

#[cfg(feature = "aws")]
async fn build_ecs(cfg: &SchedulerConfig) -> Result<Arc<dyn ClusterExecutor>> {
    let settings = cfg.ecs_settings()?;
    Ok(Arc::new(ecs::EcsExecutor::from_env(settings).await))
}

#[cfg(not(feature = "aws"))]
async fn build_ecs(_cfg: &SchedulerConfig) -> Result<Arc<dyn ClusterExecutor>> {
    Err(walletsweep_core::Error::config(
        "EXECUTOR=ecs requires a build with the `aws` feature",
    ))
}
