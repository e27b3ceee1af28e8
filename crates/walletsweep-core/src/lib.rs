//! Shared core abstractions for walletsweep.
//!
//! This crate defines the cross-crate contracts used by the scheduler and the worker: block
//! ranges and the partitioner, remote task lifecycle types, the task invocation environment,
//! storage layout, object storage, and the session lease guarding the aggregate artifact.
//!
//! # API notes
//! `walletsweep-core` is an internal crate (`publish = false`). Its public API uses a few
//! third-party types (`uuid::Uuid`, `chrono::DateTime<Utc>`) as part of the contract.

use async_trait::async_trait;
use std::{fmt, time::Duration};

pub mod executor;
pub mod invocation;
pub mod layout;
pub mod lease;
pub mod lite;
pub mod range;
pub mod record;
pub mod storage;
pub mod task;

#[cfg(feature = "aws")]
pub mod aws;

pub use range::{partition, BlockRange, DEFAULT_CHUNK_SIZE, MAX_CHUNKS};
pub use record::TransactionRecord;
pub use task::{ExitInfo, PartitionTask, TaskHandle, TaskKind, TaskStatus};

pub type Result<T> = std::result::Result<T, Error>;

/// Error taxonomy shared by the scheduler and the worker.
///
/// Variants wrap an `anyhow::Error` so adapters can keep attaching context to external calls.
#[derive(Debug)]
pub enum Error {
    /// Missing or invalid required parameter. Fatal at startup.
    Config(anyhow::Error),
    /// The cluster executor created no task for a launch request.
    Launch { reasons: Vec<String> },
    /// Upstream data source query failed.
    Fetch(anyhow::Error),
    /// Columnar file could not be written.
    Write(anyhow::Error),
    /// Object storage rejected an upload.
    Upload(anyhow::Error),
    /// Union or export of partition files failed.
    Query(anyhow::Error),
    /// The monitor gave up waiting.
    Timeout { waited: Duration },
    /// The monitor was cancelled by its caller.
    Cancelled,
    /// Another session holds the aggregate lease for this wallet and chain.
    Lease(anyhow::Error),
    /// The cluster executor API call itself failed.
    Executor(anyhow::Error),
    /// Object storage failure outside of an upload (read, list, delete).
    Storage(anyhow::Error),
}

impl Error {
    pub fn config(message: impl Into<String>) -> Self {
        Error::Config(anyhow::anyhow!(message.into()))
    }

    /// Stable label for log fields and exit code mapping.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::Config(_) => "config",
            Error::Launch { .. } => "launch",
            Error::Fetch(_) => "fetch",
            Error::Write(_) => "write",
            Error::Upload(_) => "upload",
            Error::Query(_) => "query",
            Error::Timeout { .. } => "timeout",
            Error::Cancelled => "cancelled",
            Error::Lease(_) => "lease",
            Error::Executor(_) => "executor",
            Error::Storage(_) => "storage",
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Config(err) => write!(f, "configuration error: {err:#}"),
            Error::Launch { reasons } if reasons.is_empty() => {
                write!(f, "failed to launch task: N/A")
            }
            Error::Launch { reasons } => {
                write!(f, "failed to launch task: {}", reasons.join("; "))
            }
            Error::Fetch(err) => write!(f, "fetch failed: {err:#}"),
            Error::Write(err) => write!(f, "columnar write failed: {err:#}"),
            Error::Upload(err) => write!(f, "upload failed: {err:#}"),
            Error::Query(err) => write!(f, "query failed: {err:#}"),
            Error::Timeout { waited } => {
                write!(f, "timed out after {}s waiting for tasks", waited.as_secs())
            }
            Error::Cancelled => write!(f, "wait cancelled"),
            Error::Lease(err) => write!(f, "session lease error: {err:#}"),
            Error::Executor(err) => write!(f, "cluster executor error: {err:#}"),
            Error::Storage(err) => write!(f, "object storage error: {err:#}"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Config(err)
            | Error::Fetch(err)
            | Error::Write(err)
            | Error::Upload(err)
            | Error::Query(err)
            | Error::Lease(err)
            | Error::Executor(err)
            | Error::Storage(err) => Some(err.as_ref()),
            Error::Launch { .. } | Error::Timeout { .. } | Error::Cancelled => None,
        }
    }
}

/// Key/blob store holding partition files, aggregate files and session leases.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn put_bytes(
        &self,
        bucket: &str,
        key: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<()>;

    /// Conditional put. Returns `false` without writing if the key already exists.
    async fn put_if_absent(
        &self,
        bucket: &str,
        key: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<bool>;

    /// Compare-and-swap. Writes `bytes` only if the object still holds exactly `expected`,
    /// otherwise returns `false`. A swap racing another swap on the same key may also lose.
    async fn replace_if_unchanged(
        &self,
        bucket: &str,
        key: &str,
        expected: &[u8],
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<bool>;

    async fn get_bytes(&self, bucket: &str, key: &str) -> Result<Vec<u8>>;

    async fn delete(&self, bucket: &str, key: &str) -> Result<()>;

    /// Keys under `prefix`, sorted.
    async fn list_keys(&self, bucket: &str, prefix: &str) -> Result<Vec<String>>;

    /// Location the analytical reader can scan in place. `key` may contain glob characters.
    fn scan_uri(&self, bucket: &str, key: &str) -> String;
}
