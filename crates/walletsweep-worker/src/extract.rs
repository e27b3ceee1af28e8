use crate::{columnar, config::ExtractJob, upstream::UpstreamClient};
use walletsweep_core::{layout, ObjectStore, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractSummary {
    pub key: String,
    pub records: usize,
    pub bytes: usize,
}

/// Fetch one chunk of a wallet's history and store it as a partition file.
///
/// The key is deterministic, so re-running a chunk replaces its previous file.
pub async fn run(
    job: &ExtractJob,
    store: &dyn ObjectStore,
    parquet_bucket: &str,
) -> Result<ExtractSummary> {
    let upstream = UpstreamClient::new(job.target_url.clone(), job.upstream_timeout)?;
    let records = upstream
        .fetch_transactions(&job.chain_id, &job.wallet, &job.range)
        .await?;
    let record_count = records.len();
    tracing::debug!(
        event = "walletsweep.worker.extract.fetched",
        chain_id = %job.chain_id,
        wallet = %job.wallet,
        range = %job.range,
        records = record_count,
        "fetched transactions"
    );

    let bytes = columnar::write_partition(records).await?;
    let byte_count = bytes.len();

    let key = layout::partition_key(&job.chain_id, &job.wallet, &job.range);
    store
        .put_bytes(parquet_bucket, &key, bytes, layout::CONTENT_TYPE_PARQUET)
        .await?;

    tracing::info!(
        event = "walletsweep.worker.extract.done",
        bucket = %parquet_bucket,
        key = %key,
        records = record_count,
        bytes = byte_count,
        "uploaded partition file"
    );

    Ok(ExtractSummary {
        key,
        records: record_count,
        bytes: byte_count,
    })
}
