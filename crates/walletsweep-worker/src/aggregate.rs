use crate::{
    columnar::{self, S3Access},
    config::{AggregateJob, PartitionSelection, ReadMode},
};
use anyhow::{anyhow, Context};
use walletsweep_core::{
    layout,
    lease::{LeaseStore, DEFAULT_LEASE_TTL},
    storage::StorageConfig,
    Error, ObjectStore, Result,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AggregateSummary {
    pub key: String,
    pub partitions: usize,
    pub rows: u64,
    pub columns: usize,
}

/// Union the selected partition files of a wallet into one CSV and upload it, replacing any
/// previous aggregate.
pub async fn run(
    job: &AggregateJob,
    store: &dyn ObjectStore,
    storage: &StorageConfig,
) -> Result<AggregateSummary> {
    let parquet_bucket = storage.parquet_bucket()?;
    let csv_bucket = storage.csv_bucket()?;

    let keys = select_partitions(job, store, parquet_bucket).await?;
    tracing::debug!(
        event = "walletsweep.worker.aggregate.selected",
        chain_id = %job.chain_id,
        wallet = %job.wallet,
        partitions = keys.len(),
        read_mode = ?job.read_mode,
        "selected partition files"
    );

    let export = match job.read_mode {
        ReadMode::Direct => {
            let sources = match &job.selection {
                PartitionSelection::Cumulative => vec![store.scan_uri(
                    parquet_bucket,
                    &layout::partition_glob(&job.chain_id, &job.wallet),
                )],
                PartitionSelection::Session(_) => keys
                    .iter()
                    .map(|key| store.scan_uri(parquet_bucket, key))
                    .collect(),
            };
            let s3 = sources
                .iter()
                .any(|s| s.starts_with("s3://"))
                .then(|| S3Access::from_storage(storage));
            columnar::export_csv(sources, s3).await?
        }
        ReadMode::Staged => {
            let staging = tempfile::tempdir()
                .context("create staging dir")
                .map_err(Error::Query)?;
            let mut sources = Vec::with_capacity(keys.len());
            for (i, key) in keys.iter().enumerate() {
                let bytes = store.get_bytes(parquet_bucket, key).await?;
                let path = staging.path().join(format!("{i:06}.parquet"));
                tokio::fs::write(&path, bytes)
                    .await
                    .with_context(|| format!("stage {key} to {}", path.display()))
                    .map_err(Error::Query)?;
                sources.push(path.to_string_lossy().into_owned());
            }
            columnar::export_csv(sources, None).await?
        }
    };

    if export.columns != columnar::partition_columns() {
        tracing::warn!(
            event = "walletsweep.worker.aggregate.schema_drift",
            columns = ?export.columns,
            "aggregate columns differ from the partition schema"
        );
    }

    if let Some(session_id) = job.session_id {
        LeaseStore::new(store, csv_bucket, DEFAULT_LEASE_TTL)
            .verify(&job.chain_id, &job.wallet, session_id)
            .await?;
    }

    let key = layout::aggregate_key(&job.chain_id, &job.wallet);
    let rows = export.rows;
    let columns = export.columns.len();
    store
        .put_bytes(csv_bucket, &key, export.bytes, layout::CONTENT_TYPE_CSV)
        .await?;

    tracing::info!(
        event = "walletsweep.worker.aggregate.done",
        bucket = %csv_bucket,
        key = %key,
        partitions = keys.len(),
        rows,
        columns,
        "uploaded aggregate file"
    );

    Ok(AggregateSummary {
        key,
        partitions: keys.len(),
        rows,
        columns,
    })
}

/// Partition keys the job covers. Fails with [`Error::Query`] when there is nothing to union.
pub async fn select_partitions(
    job: &AggregateJob,
    store: &dyn ObjectStore,
    bucket: &str,
) -> Result<Vec<String>> {
    let prefix = layout::partition_prefix(&job.chain_id, &job.wallet);
    let existing = store
        .list_keys(bucket, &prefix)
        .await?
        .into_iter()
        .filter(|key| {
            key.strip_prefix(&prefix)
                .is_some_and(|leaf| !leaf.contains('/') && layout::is_partition_key(leaf))
        })
        .collect::<Vec<_>>();

    let keys = match &job.selection {
        PartitionSelection::Cumulative => existing,
        PartitionSelection::Session(ranges) => {
            let mut keys = Vec::with_capacity(ranges.len());
            for range in ranges {
                let key = layout::partition_key(&job.chain_id, &job.wallet, range);
                if existing.binary_search(&key).is_err() {
                    return Err(Error::Query(anyhow!(
                        "missing partition file {bucket}/{key} for session range"
                    )));
                }
                keys.push(key);
            }
            keys
        }
    };

    if keys.is_empty() {
        return Err(Error::Query(anyhow!(
            "no partition files under {bucket}/{prefix}"
        )));
    }
    Ok(keys)
}
