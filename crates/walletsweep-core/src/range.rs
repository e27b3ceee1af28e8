use crate::{Error, Result};
use serde::Serialize;
use std::fmt;

/// Default number of blocks per extract chunk.
pub const DEFAULT_CHUNK_SIZE: u64 = 1_000;

/// Most chunks one partitioning call may produce. Each chunk becomes a remote task.
pub const MAX_CHUNKS: u64 = 1_000_000;

/// Half-open block interval `[from, to)` with `from < to`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct BlockRange {
    from: u64,
    to: u64,
}

impl BlockRange {
    pub fn new(from: u64, to: u64) -> Result<Self> {
        if from >= to {
            return Err(Error::config(format!(
                "invalid block range: from={from} must be below to={to}"
            )));
        }
        Ok(Self { from, to })
    }

    pub fn from(&self) -> u64 {
        self.from
    }

    pub fn to(&self) -> u64 {
        self.to
    }

    /// Number of blocks in the range.
    pub fn span(&self) -> u64 {
        self.to - self.from
    }

    pub fn contains(&self, other: &BlockRange) -> bool {
        self.from <= other.from && other.to <= self.to
    }
}

impl fmt::Display for BlockRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.from, self.to)
    }
}

/// Split `[from, to)` into contiguous chunks of at most `chunk_size` blocks.
///
/// The last chunk may be shorter. `from == to` yields no chunks.
pub fn partition(from: u64, to: u64, chunk_size: u64) -> Result<Vec<BlockRange>> {
    if chunk_size == 0 {
        return Err(Error::config("chunk size must be greater than zero"));
    }
    if to < from {
        return Err(Error::config(format!(
            "invalid block range: to={to} is below from={from}"
        )));
    }

    let count = (to - from).div_ceil(chunk_size);
    if count > MAX_CHUNKS {
        return Err(Error::config(format!(
            "block range [{from}, {to}) splits into {count} chunks of {chunk_size}, above the limit of {MAX_CHUNKS}"
        )));
    }

    let mut out = Vec::with_capacity(count as usize);
    let mut cursor = from;
    while cursor < to {
        let next = to.min(cursor.saturating_add(chunk_size));
        out.push(BlockRange { from: cursor, to: next });
        cursor = next;
    }
    Ok(out)
}
