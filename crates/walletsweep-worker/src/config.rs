use crate::upstream::DEFAULT_UPSTREAM_TIMEOUT;
use clap::Parser;
use std::time::Duration;
use uuid::Uuid;
use walletsweep_core::{
    invocation::{parse_range, AggregateScope, DEFAULT_TARGET_URL},
    partition,
    storage::StorageConfig,
    BlockRange, Error, Result, TaskKind, DEFAULT_CHUNK_SIZE,
};

/// How the aggregate task makes partition files visible to DuckDB.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum ReadMode {
    /// Scan the store location in place (`httpfs` for S3, plain paths for `fs`).
    Direct,
    /// Download the selected partitions into a temp dir first.
    Staged,
}

/// Worker configuration: the task invocation plus storage settings.
///
/// Every field is read from the environment the scheduler set on the task. Long flags mirror
/// the variable names for local runs.
#[derive(Parser, Clone)]
#[command(name = "walletsweep-worker")]
pub struct WorkerConfig {
    /// `extract` or `save`. Anything else exits with the unknown-task code.
    #[arg(long, env = "TASK", default_value = "")]
    pub task: String,

    #[arg(long, env = "WALLET")]
    pub wallet: Option<String>,

    #[arg(long, env = "CHAIN_ID")]
    pub chain_id: Option<String>,

    #[arg(long, env = "FROM_BLOCK", default_value_t = 0)]
    pub from_block: u64,

    #[arg(long, env = "TO_BLOCK", default_value_t = 0)]
    pub to_block: u64,

    #[arg(long, env = "TARGET_URL", default_value = DEFAULT_TARGET_URL)]
    pub target_url: String,

    /// Bound on one upstream request, in seconds.
    #[arg(long, env = "UPSTREAM_TIMEOUT_SECS", default_value_t = DEFAULT_UPSTREAM_TIMEOUT.as_secs())]
    pub upstream_timeout_secs: u64,

    #[arg(long, env = "CHUNK_SIZE", default_value_t = DEFAULT_CHUNK_SIZE)]
    pub chunk_size: u64,

    #[arg(long, env = "AGGREGATE_SCOPE", value_enum, default_value = "cumulative")]
    pub aggregate_scope: AggregateScope,

    /// Session whose lease must be held before the aggregate file is written.
    #[arg(long, env = "SESSION_ID")]
    pub session_id: Option<Uuid>,

    #[arg(long, env = "AGGREGATE_READ_MODE", value_enum, default_value = "direct")]
    pub read_mode: ReadMode,

    #[command(flatten)]
    pub storage: StorageConfig,
}

impl std::fmt::Debug for WorkerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerConfig")
            .field("task", &self.task)
            .field("wallet", &self.wallet)
            .field("chain_id", &self.chain_id)
            .field("from_block", &self.from_block)
            .field("to_block", &self.to_block)
            .field("target_url", &self.target_url)
            .field("upstream_timeout_secs", &self.upstream_timeout_secs)
            .field("chunk_size", &self.chunk_size)
            .field("aggregate_scope", &self.aggregate_scope)
            .field("session_id", &self.session_id)
            .field("read_mode", &self.read_mode)
            .field("storage", &self.storage)
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractJob {
    pub chain_id: String,
    pub wallet: String,
    pub range: BlockRange,
    pub target_url: String,
    pub upstream_timeout: Duration,
}

/// Which partition files the aggregate unions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PartitionSelection {
    /// Everything under the wallet prefix.
    Cumulative,
    /// Exactly the chunks of one session range.
    Session(Vec<BlockRange>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AggregateJob {
    pub chain_id: String,
    pub wallet: String,
    pub selection: PartitionSelection,
    pub session_id: Option<Uuid>,
    pub read_mode: ReadMode,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerJob {
    Extract(ExtractJob),
    Aggregate(AggregateJob),
}

impl WorkerConfig {
    /// Parse config from environment only.
    pub fn from_env() -> Result<Self> {
        Self::from_args(["walletsweep-worker"])
    }

    pub fn from_args<I, T>(args: I) -> Result<Self>
    where
        I: IntoIterator<Item = T>,
        T: Into<std::ffi::OsString> + Clone,
    {
        Self::try_parse_from(args).map_err(|err| Error::Config(err.into()))
    }

    pub fn task_kind(&self) -> Result<TaskKind> {
        self.task.parse()
    }

    /// Validate the invocation for `kind` and turn it into a typed job.
    pub fn job(&self, kind: TaskKind) -> Result<WorkerJob> {
        let wallet = walletsweep_core::storage::required(&self.wallet, "WALLET")?.to_string();
        let chain_id =
            walletsweep_core::storage::required(&self.chain_id, "CHAIN_ID")?.to_string();
        let range = parse_range(self.from_block, self.to_block)?;

        match kind {
            TaskKind::Extract => {
                let range = range.ok_or_else(|| {
                    Error::config("extract requires FROM_BLOCK and TO_BLOCK")
                })?;
                Ok(WorkerJob::Extract(ExtractJob {
                    chain_id,
                    wallet,
                    range,
                    target_url: self.target_url.clone(),
                    upstream_timeout: Duration::from_secs(self.upstream_timeout_secs),
                }))
            }
            TaskKind::Aggregate => {
                let selection = match self.aggregate_scope {
                    AggregateScope::Cumulative => PartitionSelection::Cumulative,
                    AggregateScope::Session => {
                        let range = range.ok_or_else(|| {
                            Error::config(
                                "AGGREGATE_SCOPE=session requires FROM_BLOCK and TO_BLOCK",
                            )
                        })?;
                        PartitionSelection::Session(partition(
                            range.from(),
                            range.to(),
                            self.chunk_size,
                        )?)
                    }
                };
                Ok(WorkerJob::Aggregate(AggregateJob {
                    chain_id,
                    wallet,
                    selection,
                    session_id: self.session_id,
                    read_mode: self.read_mode,
                }))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Flags only; `env` fallbacks are switched off so the shell cannot leak in.
    fn cfg(args: &[&str]) -> WorkerConfig {
        use clap::{CommandFactory, FromArgMatches};

        let mut argv = vec!["walletsweep-worker", "--storage-backend", "fs"];
        argv.extend_from_slice(args);
        let matches = WorkerConfig::command()
            .mut_args(|arg| arg.env(None::<&'static str>))
            .try_get_matches_from(argv)
            .unwrap();
        WorkerConfig::from_arg_matches(&matches).unwrap()
    }

    #[test]
    fn extract_job_from_invocation() {
        let c = cfg(&[
            "--task",
            " Extract ",
            "--wallet",
            "0xabc",
            "--chain-id",
            "1",
            "--from-block",
            "1000",
            "--to-block",
            "2000",
        ]);
        let kind = c.task_kind().unwrap();
        assert_eq!(kind, TaskKind::Extract);
        assert_eq!(
            c.job(kind).unwrap(),
            WorkerJob::Extract(ExtractJob {
                chain_id: "1".to_string(),
                wallet: "0xabc".to_string(),
                range: BlockRange::new(1_000, 2_000).unwrap(),
                target_url: DEFAULT_TARGET_URL.to_string(),
                upstream_timeout: DEFAULT_UPSTREAM_TIMEOUT,
            })
        );
    }

    #[test]
    fn extract_without_range_is_a_config_error() {
        let c = cfg(&["--task", "extract", "--wallet", "0xabc", "--chain-id", "1"]);
        assert!(matches!(c.job(TaskKind::Extract), Err(Error::Config(_))));
    }

    #[test]
    fn session_scope_repartitions_range() {
        let c = cfg(&[
            "--task",
            "save",
            "--wallet",
            "0xabc",
            "--chain-id",
            "1",
            "--from-block",
            "0",
            "--to-block",
            "2500",
            "--aggregate-scope",
            "session",
        ]);
        let WorkerJob::Aggregate(job) = c.job(TaskKind::Aggregate).unwrap() else {
            panic!("expected aggregate job");
        };
        let PartitionSelection::Session(ranges) = job.selection else {
            panic!("expected session selection");
        };
        assert_eq!(ranges.len(), 3);
        assert_eq!(ranges[2], BlockRange::new(2_000, 2_500).unwrap());
    }

    #[test]
    fn unknown_task_is_rejected() {
        let c = cfg(&["--task", "load"]);
        assert!(c.task_kind().is_err());
        let c = cfg(&[]);
        assert!(c.task_kind().is_err());
    }

    #[test]
    fn missing_wallet_is_a_config_error() {
        let c = cfg(&["--task", "save", "--chain-id", "1"]);
        let err = c.job(TaskKind::Aggregate).unwrap_err();
        assert!(err.to_string().contains("WALLET"), "{err}");
    }
}
