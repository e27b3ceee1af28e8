use crate::{lite::fs::FsObjectStore, Error, ObjectStore, Result};
use std::{path::PathBuf, sync::Arc};

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum StorageBackend {
    /// Amazon S3 or an S3-compatible endpoint (requires the `aws` feature).
    S3,
    /// Local directory tree (Lite mode).
    Fs,
}

/// Object storage settings shared by the scheduler and the worker.
#[derive(clap::Args, Clone)]
pub struct StorageConfig {
    #[arg(long, env = "STORAGE_BACKEND", value_enum, default_value = "s3")]
    pub storage_backend: StorageBackend,

    /// Root directory for the `fs` backend.
    #[arg(long, env = "STORAGE_ROOT", default_value = "./data")]
    pub storage_root: PathBuf,

    /// Bucket holding partition (Parquet) files.
    #[arg(long, env = "AWS_PARQUET_BUCKET")]
    pub parquet_bucket: Option<String>,

    /// Bucket holding aggregate (CSV) files and session leases.
    #[arg(long, env = "AWS_CSV_BUCKET")]
    pub csv_bucket: Option<String>,

    #[arg(long, env = "AWS_REGION", default_value = "us-east-1")]
    pub region: String,

    #[arg(long, env = "AWS_ACCESS_KEY_ID")]
    pub access_key_id: Option<String>,

    #[arg(long, env = "AWS_SECRET_ACCESS_KEY")]
    pub secret_access_key: Option<String>,

    /// Custom S3 endpoint (MinIO and friends); switches to path-style addressing.
    #[arg(long, env = "S3_ENDPOINT")]
    pub s3_endpoint: Option<String>,
}

impl std::fmt::Debug for StorageConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageConfig")
            .field("storage_backend", &self.storage_backend)
            .field("storage_root", &self.storage_root)
            .field("parquet_bucket", &self.parquet_bucket)
            .field("csv_bucket", &self.csv_bucket)
            .field("region", &self.region)
            .field("access_key_id", &self.access_key_id.as_deref().map(|_| "<redacted>"))
            .field(
                "secret_access_key",
                &self.secret_access_key.as_deref().map(|_| "<redacted>"),
            )
            .field("s3_endpoint", &self.s3_endpoint)
            .finish()
    }
}

impl StorageConfig {
    pub fn parquet_bucket(&self) -> Result<&str> {
        required(&self.parquet_bucket, "AWS_PARQUET_BUCKET")
    }

    pub fn csv_bucket(&self) -> Result<&str> {
        required(&self.csv_bucket, "AWS_CSV_BUCKET")
    }

    pub async fn build(&self) -> Result<Arc<dyn ObjectStore>> {
        match self.storage_backend {
            StorageBackend::Fs => Ok(Arc::new(FsObjectStore::new(self.storage_root.clone()))),
            StorageBackend::S3 => self.build_s3().await,
        }
    }

    #[cfg(feature = "aws")]
    async fn build_s3(&self) -> Result<Arc<dyn ObjectStore>> {
        let store =
            crate::aws::S3ObjectStore::from_env(&self.region, self.s3_endpoint.as_deref())
                .await
                .map_err(Error::Config)?;
        Ok(Arc::new(store))
    }

    #[cfg(not(feature = "aws"))]
    async fn build_s3(&self) -> Result<Arc<dyn ObjectStore>> {
        Err(Error::config(
            "STORAGE_BACKEND=s3 requires a build with the `aws` feature",
        ))
    }
}

pub fn required<'a>(value: &'a Option<String>, name: &str) -> Result<&'a str> {
    match value.as_deref().map(str::trim) {
        Some(v) if !v.is_empty() => Ok(v),
        _ => Err(Error::config(format!("missing environment variable: {name}"))),
    }
}
