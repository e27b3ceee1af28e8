//! Remote task invocation contract.
//!
//! The scheduler renders a [`TaskInvocation`] into environment variables on the launched task;
//! the worker parses the same variables back at startup.

use crate::{range::BlockRange, task::TaskKind, Result};
use serde::Serialize;
use uuid::Uuid;

pub const ENV_TASK: &str = "TASK";
pub const ENV_WALLET: &str = "WALLET";
pub const ENV_CHAIN_ID: &str = "CHAIN_ID";
pub const ENV_FROM_BLOCK: &str = "FROM_BLOCK";
pub const ENV_TO_BLOCK: &str = "TO_BLOCK";
pub const ENV_TARGET_URL: &str = "TARGET_URL";
pub const ENV_CHUNK_SIZE: &str = "CHUNK_SIZE";
pub const ENV_AGGREGATE_SCOPE: &str = "AGGREGATE_SCOPE";
pub const ENV_SESSION_ID: &str = "SESSION_ID";

pub const DEFAULT_TARGET_URL: &str = "http://localhost:7010/assets";

/// Which partition files the aggregate task unions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum AggregateScope {
    /// Every partition under the `(chain_id, wallet)` prefix, whichever session wrote it.
    #[default]
    Cumulative,
    /// Only the partitions of the session's own block range.
    Session,
}

impl AggregateScope {
    pub fn as_str(&self) -> &'static str {
        match self {
            AggregateScope::Cumulative => "cumulative",
            AggregateScope::Session => "session",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaskInvocation {
    pub kind: TaskKind,
    pub wallet: String,
    pub chain_id: String,
    /// `None` is rendered as `FROM_BLOCK=0`, `TO_BLOCK=0`.
    pub range: Option<BlockRange>,
    pub target_url: String,
    pub chunk_size: u64,
    pub aggregate_scope: AggregateScope,
    pub session_id: Option<Uuid>,
}

impl TaskInvocation {
    pub fn to_env(&self) -> Vec<(String, String)> {
        let (from, to) = self
            .range
            .map(|r| (r.from(), r.to()))
            .unwrap_or((0, 0));

        let mut env = vec![
            (ENV_TARGET_URL.to_string(), self.target_url.clone()),
            (ENV_TASK.to_string(), self.kind.wire_name().to_string()),
            (ENV_WALLET.to_string(), self.wallet.clone()),
            (ENV_CHAIN_ID.to_string(), self.chain_id.clone()),
            (ENV_FROM_BLOCK.to_string(), from.to_string()),
            (ENV_TO_BLOCK.to_string(), to.to_string()),
            (ENV_CHUNK_SIZE.to_string(), self.chunk_size.to_string()),
            (
                ENV_AGGREGATE_SCOPE.to_string(),
                self.aggregate_scope.as_str().to_string(),
            ),
        ];
        if let Some(session_id) = self.session_id {
            env.push((ENV_SESSION_ID.to_string(), session_id.to_string()));
        }
        env
    }
}

/// Interpret `FROM_BLOCK`/`TO_BLOCK` as received by a worker. `0`/`0` means "no range".
pub fn parse_range(from: u64, to: u64) -> Result<Option<BlockRange>> {
    if from == 0 && to == 0 {
        return Ok(None);
    }
    BlockRange::new(from, to).map(Some)
}
