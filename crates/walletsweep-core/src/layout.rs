//! Object storage key layout.
//!
//! - partition files: `{chain_id}/{wallet}/{from}-{to}.parquet` (partition bucket)
//! - aggregate file: `{chain_id}/{wallet}.csv` (aggregate bucket)
//! - session lease: `{chain_id}/{wallet}.lease` (aggregate bucket)

use crate::range::BlockRange;

pub const PARTITION_EXTENSION: &str = "parquet";

pub const CONTENT_TYPE_PARQUET: &str = "application/vnd.apache.parquet";
pub const CONTENT_TYPE_CSV: &str = "text/csv";
pub const CONTENT_TYPE_JSON: &str = "application/json";

/// Prefix holding every partition file for a wallet on a chain. Ends with `/`.
pub fn partition_prefix(chain_id: &str, wallet: &str) -> String {
    format!("{chain_id}/{wallet}/")
}

pub fn partition_file_name(range: &BlockRange) -> String {
    format!("{}-{}.{PARTITION_EXTENSION}", range.from(), range.to())
}

pub fn partition_key(chain_id: &str, wallet: &str, range: &BlockRange) -> String {
    format!(
        "{}{}",
        partition_prefix(chain_id, wallet),
        partition_file_name(range)
    )
}

/// Glob matching every partition file under the wallet prefix.
pub fn partition_glob(chain_id: &str, wallet: &str) -> String {
    format!("{}*.{PARTITION_EXTENSION}", partition_prefix(chain_id, wallet))
}

pub fn is_partition_key(key: &str) -> bool {
    key.ends_with(&format!(".{PARTITION_EXTENSION}"))
}

pub fn aggregate_key(chain_id: &str, wallet: &str) -> String {
    format!("{chain_id}/{wallet}.csv")
}

pub fn lease_key(chain_id: &str, wallet: &str) -> String {
    format!("{chain_id}/{wallet}.lease")
}
