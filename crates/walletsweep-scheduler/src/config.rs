use crate::{monitor::MonitorPolicy, orchestrator::{SessionLeasing, SessionSettings}};
use clap::Parser;
use std::{path::PathBuf, sync::Arc, time::Duration};
use walletsweep_core::{
    invocation::{AggregateScope, DEFAULT_TARGET_URL},
    storage::{required, StorageConfig},
    Error, ObjectStore, Result, DEFAULT_CHUNK_SIZE,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum ExecutorKind {
    /// AWS ECS on Fargate (requires the `aws` feature).
    Ecs,
    /// Child processes on this host.
    Local,
}

/// Scheduler configuration.
///
/// Parsed once at startup from the environment and passed by reference.
#[derive(Parser, Clone)]
#[command(name = "walletsweep-scheduler")]
pub struct SchedulerConfig {
    #[arg(long, env = "EXECUTOR", value_enum, default_value = "ecs")]
    pub executor: ExecutorKind,

    #[arg(long, env = "AWS_CLUSTER")]
    pub cluster: Option<String>,

    #[arg(long, env = "AWS_TASK_DEFINITION")]
    pub task_definition: Option<String>,

    #[arg(long, env = "AWS_SUBNET")]
    pub subnet: Option<String>,

    /// Container in the task definition that receives the invocation environment.
    #[arg(long, env = "ECS_CONTAINER_NAME", default_value = "web3_worker")]
    pub container_name: String,

    /// Worker binary spawned by the local executor.
    #[arg(long, env = "WORKER_BIN", default_value = "walletsweep-worker")]
    pub worker_bin: PathBuf,

    /// Base URL of the upstream transaction source, forwarded to extract tasks.
    #[arg(long, env = "TARGET_URL", default_value = DEFAULT_TARGET_URL)]
    pub target_url: String,

    #[arg(long, env = "CHUNK_SIZE", default_value_t = DEFAULT_CHUNK_SIZE)]
    pub chunk_size: u64,

    #[arg(long, env = "POLL_INTERVAL_MS", default_value_t = 2_000)]
    pub poll_interval_ms: u64,

    /// Give up waiting on a batch after this many seconds. Unbounded when unset.
    #[arg(long, env = "MAX_WAIT_SECS")]
    pub max_wait_secs: Option<u64>,

    #[arg(long, env = "AGGREGATE_SCOPE", value_enum, default_value = "cumulative")]
    pub aggregate_scope: AggregateScope,

    #[arg(
        long,
        env = "SESSION_LEASE",
        default_value_t = true,
        action = clap::ArgAction::Set,
        value_parser = clap::builder::BoolishValueParser::new()
    )]
    pub session_lease: bool,

    #[arg(long, env = "SESSION_LEASE_TTL_SECS", default_value_t = 21_600)]
    pub session_lease_ttl_secs: u64,

    #[command(flatten)]
    pub storage: StorageConfig,
}

impl std::fmt::Debug for SchedulerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SchedulerConfig")
            .field("executor", &self.executor)
            .field("cluster", &self.cluster)
            .field("task_definition", &self.task_definition)
            .field("subnet", &self.subnet)
            .field("container_name", &self.container_name)
            .field("worker_bin", &self.worker_bin)
            .field("target_url", &self.target_url)
            .field("chunk_size", &self.chunk_size)
            .field("poll_interval_ms", &self.poll_interval_ms)
            .field("max_wait_secs", &self.max_wait_secs)
            .field("aggregate_scope", &self.aggregate_scope)
            .field("session_lease", &self.session_lease)
            .field("session_lease_ttl_secs", &self.session_lease_ttl_secs)
            .field("storage", &self.storage)
            .finish()
    }
}

/// Settings for the ECS executor, validated.
#[derive(Debug, Clone)]
pub struct EcsSettings {
    pub cluster: String,
    pub task_definition: String,
    pub subnet: String,
    pub container_name: String,
    pub region: String,
}

impl SchedulerConfig {
    /// Parse config from environment only.
    ///
    /// A single fake argv element keeps clap from interpreting the `extract` arguments here.
    pub fn from_env() -> Result<Self> {
        Self::from_args(["walletsweep-scheduler"])
    }

    pub fn from_args<I, T>(args: I) -> Result<Self>
    where
        I: IntoIterator<Item = T>,
        T: Into<std::ffi::OsString> + Clone,
    {
        let cfg = Self::try_parse_from(args).map_err(|err| Error::Config(err.into()))?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(Error::config("CHUNK_SIZE must be greater than zero"));
        }
        if self.poll_interval_ms == 0 {
            return Err(Error::config("POLL_INTERVAL_MS must be greater than zero"));
        }
        if self.session_lease_ttl_secs == 0 {
            return Err(Error::config("SESSION_LEASE_TTL_SECS must be greater than zero"));
        }
        if self.executor == ExecutorKind::Ecs {
            self.ecs_settings()?;
        }
        if self.session_lease {
            self.storage.csv_bucket()?;
        }
        Ok(())
    }

    pub fn ecs_settings(&self) -> Result<EcsSettings> {
        Ok(EcsSettings {
            cluster: required(&self.cluster, "AWS_CLUSTER")?.to_string(),
            task_definition: required(&self.task_definition, "AWS_TASK_DEFINITION")?
                .to_string(),
            subnet: required(&self.subnet, "AWS_SUBNET")?.to_string(),
            container_name: self.container_name.clone(),
            region: self.storage.region.clone(),
        })
    }

    pub fn monitor_policy(&self) -> MonitorPolicy {
        MonitorPolicy {
            poll_interval: Duration::from_millis(self.poll_interval_ms),
            max_wait: self.max_wait_secs.map(Duration::from_secs),
        }
    }

    /// Session settings. `store` is only consulted when leasing is enabled.
    pub fn session_settings(&self, store: Option<Arc<dyn ObjectStore>>) -> Result<SessionSettings> {
        let leasing = match (self.session_lease, store) {
            (false, _) => None,
            (true, Some(store)) => Some(SessionLeasing {
                store,
                bucket: self.storage.csv_bucket()?.to_string(),
                ttl: Duration::from_secs(self.session_lease_ttl_secs),
            }),
            (true, None) => {
                return Err(Error::config(
                    "SESSION_LEASE is enabled but no object store was configured",
                ))
            }
        };

        Ok(SessionSettings {
            target_url: self.target_url.clone(),
            chunk_size: self.chunk_size,
            aggregate_scope: self.aggregate_scope,
            monitor: self.monitor_policy(),
            leasing,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::{CommandFactory, FromArgMatches};

    /// Parse from flags only; `env` fallbacks are switched off so the shell cannot leak in.
    fn parse(args: &[&str]) -> Result<SchedulerConfig> {
        let matches = SchedulerConfig::command()
            .mut_args(|arg| arg.env(None::<&'static str>))
            .try_get_matches_from(args)
            .map_err(|err| Error::Config(err.into()))?;
        let cfg = SchedulerConfig::from_arg_matches(&matches)
            .map_err(|err| Error::Config(err.into()))?;
        cfg.validate()?;
        Ok(cfg)
    }

    #[test]
    fn ecs_requires_cluster_settings() {
        let err = parse(&[
            "walletsweep-scheduler",
            "--executor",
            "ecs",
            "--session-lease",
            "false",
        ])
        .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
        assert!(err.to_string().contains("AWS_CLUSTER"), "{err}");
    }

    #[test]
    fn local_executor_defaults() {
        let cfg = parse(&[
            "walletsweep-scheduler",
            "--executor",
            "local",
            "--csv-bucket",
            "csv",
        ])
        .unwrap();
        assert_eq!(cfg.chunk_size, 1_000);
        assert_eq!(cfg.monitor_policy().poll_interval, Duration::from_secs(2));
        assert_eq!(cfg.monitor_policy().max_wait, None);
        assert_eq!(cfg.aggregate_scope, AggregateScope::Cumulative);
        assert!(cfg.session_lease);
        assert_eq!(cfg.container_name, "web3_worker");
    }

    #[test]
    fn environment_does_not_leak_into_flag_parsing() {
        let cfg = parse(&[
            "walletsweep-scheduler",
            "--executor",
            "local",
            "--session-lease",
            "false",
        ])
        .unwrap();
        assert_eq!(cfg.cluster, None);
        assert_eq!(cfg.storage.csv_bucket, None);
        assert_eq!(cfg.max_wait_secs, None);
    }

    #[test]
    fn lease_requires_csv_bucket() {
        let err = parse(&[
            "walletsweep-scheduler",
            "--executor",
            "local",
            "--session-lease",
            "true",
        ])
        .unwrap_err();
        assert!(err.to_string().contains("AWS_CSV_BUCKET"), "{err}");
    }

    #[test]
    fn rejects_zero_chunk_size() {
        let err = parse(&[
            "walletsweep-scheduler",
            "--executor",
            "local",
            "--session-lease",
            "false",
            "--chunk-size",
            "0",
        ])
        .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }
}
