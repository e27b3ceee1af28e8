//! DuckDB-backed Parquet writer and CSV exporter.
//!
//! All DuckDB work is blocking and runs on `spawn_blocking` with a fresh in-memory connection.

use anyhow::{anyhow, Context};
use duckdb::Connection;
use walletsweep_core::{record::COLUMNS, storage::StorageConfig, Error, Result, TransactionRecord};

const PARTITION_TABLE: &str = "transactions";
const HISTORY_TABLE: &str = "wallet_history";

const CREATE_PARTITION_TABLE: &str = r#"
CREATE TABLE transactions (
  id VARCHAR NOT NULL,
  chain_id VARCHAR NOT NULL,
  category VARCHAR NOT NULL,
  transaction_type VARCHAR NOT NULL,
  transaction_hash VARCHAR NOT NULL,
  block_number BIGINT NOT NULL,
  date_time VARCHAR NOT NULL,
  from_address VARCHAR NOT NULL,
  to_address VARCHAR NOT NULL,
  asset_contract_address VARCHAR,
  asset_symbol_name VARCHAR NOT NULL,
  value_amount DECIMAL(18, 8) NOT NULL,
  gas_fee_eth DECIMAL(18, 8) NOT NULL,
  token_id VARCHAR
);
"#;

const INSERT_PARTITION_ROW: &str = r#"
INSERT INTO transactions VALUES (
  ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?,
  CAST(? AS DECIMAL(18, 8)),
  CAST(? AS DECIMAL(18, 8)),
  ?
)
"#;

/// Credentials and endpoint DuckDB needs to scan `s3://` locations.
#[derive(Clone)]
pub struct S3Access {
    pub region: String,
    pub key_id: Option<String>,
    pub secret: Option<String>,
    pub endpoint: Option<String>,
}

impl S3Access {
    pub fn from_storage(storage: &StorageConfig) -> Self {
        Self {
            region: storage.region.clone(),
            key_id: storage.access_key_id.clone(),
            secret: storage.secret_access_key.clone(),
            endpoint: storage.s3_endpoint.clone(),
        }
    }

    fn create_secret_sql(&self) -> String {
        let mut opts = vec!["TYPE S3".to_string()];
        match (&self.key_id, &self.secret) {
            (Some(key_id), Some(secret)) => {
                opts.push(format!("KEY_ID {}", sql_literal(key_id)));
                opts.push(format!("SECRET {}", sql_literal(secret)));
            }
            _ => opts.push("PROVIDER credential_chain".to_string()),
        }
        opts.push(format!("REGION {}", sql_literal(&self.region)));
        if let Some(endpoint) = &self.endpoint {
            let (host, use_ssl) = match endpoint.split_once("://") {
                Some(("http", host)) => (host, false),
                Some((_, host)) => (host, true),
                None => (endpoint.as_str(), true),
            };
            opts.push(format!("ENDPOINT {}", sql_literal(host.trim_end_matches('/'))));
            opts.push("URL_STYLE 'path'".to_string());
            opts.push(format!("USE_SSL {use_ssl}"));
        }
        format!("CREATE SECRET walletsweep_s3 ({});", opts.join(", "))
    }

    fn needs_credential_chain(&self) -> bool {
        self.key_id.is_none() || self.secret.is_none()
    }
}

/// Result of exporting a union of partition files.
#[derive(Debug, Clone)]
pub struct CsvExport {
    pub bytes: Vec<u8>,
    pub rows: u64,
    pub columns: Vec<String>,
}

/// Encode `records` as a Parquet file and return its bytes.
pub async fn write_partition(records: Vec<TransactionRecord>) -> Result<Vec<u8>> {
    tokio::task::spawn_blocking(move || build_partition(&records))
        .await
        .context("join parquet writer")
        .and_then(|res| res)
        .map_err(Error::Write)
}

fn build_partition(records: &[TransactionRecord]) -> anyhow::Result<Vec<u8>> {
    let dir = tempfile::tempdir().context("create temp dir")?;
    let parquet_path = dir.path().join("partition.parquet");

    let mut conn = Connection::open_in_memory().context("open duckdb in-memory")?;
    conn.execute_batch(CREATE_PARTITION_TABLE)
        .context("create transactions table")?;

    let tx = conn.transaction().context("begin insert")?;
    {
        let mut stmt = tx.prepare(INSERT_PARTITION_ROW).context("prepare insert")?;
        for r in records {
            stmt.execute(duckdb::params![
                r.id,
                r.chain_id,
                r.category,
                r.transaction_type,
                r.transaction_hash,
                r.block_number,
                r.date_time,
                r.from_address,
                r.to_address,
                r.asset_contract_address,
                r.asset_symbol_name,
                r.value_amount,
                r.gas_fee_eth,
                r.token_id,
            ])
            .with_context(|| format!("insert transaction {}", r.id))?;
        }
    }
    tx.commit().context("commit insert")?;

    conn.execute_batch(&format!(
        "COPY {PARTITION_TABLE} TO {} (FORMAT PARQUET);",
        sql_literal(&parquet_path.to_string_lossy())
    ))
    .context("copy transactions to parquet")?;

    std::fs::read(&parquet_path)
        .with_context(|| format!("read parquet file {}", parquet_path.display()))
}

/// Union the Parquet files at `sources` (paths, URIs or globs) and export them as CSV.
///
/// Rows are ordered by `block_number, id`. Columns are matched by name across files.
pub async fn export_csv(sources: Vec<String>, s3: Option<S3Access>) -> Result<CsvExport> {
    tokio::task::spawn_blocking(move || build_csv(&sources, s3.as_ref()))
        .await
        .context("join csv exporter")
        .and_then(|res| res)
        .map_err(Error::Query)
}

fn build_csv(sources: &[String], s3: Option<&S3Access>) -> anyhow::Result<CsvExport> {
    if sources.is_empty() {
        return Err(anyhow!("no partition files to aggregate"));
    }

    let dir = tempfile::tempdir().context("create temp dir")?;
    let csv_path = dir.path().join("aggregate.csv");

    let conn = Connection::open_in_memory().context("open duckdb in-memory")?;
    if let Some(s3) = s3 {
        enable_s3(&conn, s3).context("enable s3 access")?;
    }

    let list = sources
        .iter()
        .map(|s| sql_literal(s))
        .collect::<Vec<_>>()
        .join(", ");
    conn.execute_batch(&format!(
        "CREATE TABLE {HISTORY_TABLE} AS SELECT * FROM read_parquet([{list}], union_by_name = true);"
    ))
    .context("union partition files")?;

    let rows: i64 = conn
        .query_row(&format!("SELECT count(*) FROM {HISTORY_TABLE}"), [], |row| {
            row.get(0)
        })
        .context("count rows")?;

    let columns = {
        let mut stmt = conn
            .prepare(&format!(
                "SELECT name FROM pragma_table_info('{HISTORY_TABLE}') ORDER BY cid"
            ))
            .context("prepare column listing")?;
        let names = stmt
            .query_map([], |row| row.get::<_, String>(0))
            .context("list columns")?
            .collect::<std::result::Result<Vec<_>, _>>()
            .context("read column names")?;
        names
    };

    conn.execute_batch(&format!(
        "COPY (SELECT * FROM {HISTORY_TABLE} ORDER BY block_number, id) TO {} \
         (FORMAT CSV, DELIMITER ',', HEADER, QUOTE '\"', ESCAPE '\"');",
        sql_literal(&csv_path.to_string_lossy())
    ))
    .context("copy wallet history to csv")?;

    let bytes = std::fs::read(&csv_path)
        .with_context(|| format!("read csv file {}", csv_path.display()))?;

    Ok(CsvExport {
        bytes,
        rows: u64::try_from(rows).context("row count")?,
        columns,
    })
}

fn enable_s3(conn: &Connection, s3: &S3Access) -> anyhow::Result<()> {
    conn.execute_batch("INSTALL httpfs; LOAD httpfs;")
        .context("load httpfs")?;
    if s3.needs_credential_chain() {
        conn.execute_batch("INSTALL aws; LOAD aws;")
            .context("load aws extension")?;
    }
    conn.execute_batch(&s3.create_secret_sql())
        .context("create s3 secret")?;
    Ok(())
}

fn sql_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

/// Column names a partition file is expected to carry, in order.
pub fn partition_columns() -> Vec<String> {
    COLUMNS.iter().map(|c| c.to_string()).collect()
}
