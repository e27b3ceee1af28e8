use crate::{Error, ObjectStore as ObjectStoreTrait, Result};
use anyhow::{anyhow, Context};
use async_trait::async_trait;
use std::{
    io::ErrorKind,
    path::{Component, Path, PathBuf},
    time::Duration,
};
use uuid::Uuid;

/// A swap guard older than this belongs to a writer that died mid-swap.
const STALE_SWAP_GUARD: Duration = Duration::from_secs(30);

/// Object store backed by a local directory. Each bucket is a subdirectory of `root`.
#[derive(Clone, Debug)]
pub struct FsObjectStore {
    root: PathBuf,
}

impl FsObjectStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn object_path(&self, bucket: &str, key: &str) -> anyhow::Result<PathBuf> {
        let mut path = self.root.join(checked_segment(bucket)?);
        for part in key.split('/') {
            path.push(checked_segment(part)?);
        }
        Ok(path)
    }

    async fn write_temp(&self, path: &Path, bytes: &[u8]) -> anyhow::Result<PathBuf> {
        let parent = path
            .parent()
            .ok_or_else(|| anyhow!("object path has no parent: {}", path.display()))?;
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("create dir {}", parent.display()))?;

        let tmp = parent.join(format!(".tmp-{}", Uuid::new_v4()));
        tokio::fs::write(&tmp, bytes)
            .await
            .with_context(|| format!("write {}", tmp.display()))?;
        Ok(tmp)
    }
}

#[async_trait]
impl ObjectStoreTrait for FsObjectStore {
    async fn put_bytes(
        &self,
        bucket: &str,
        key: &str,
        bytes: Vec<u8>,
        _content_type: &str,
    ) -> Result<()> {
        let res: anyhow::Result<()> = async {
            let path = self.object_path(bucket, key)?;
            let tmp = self.write_temp(&path, &bytes).await?;
            tokio::fs::rename(&tmp, &path)
                .await
                .with_context(|| format!("rename into {}", path.display()))?;
            Ok(())
        }
        .await;
        res.with_context(|| format!("fs put bucket={bucket} key={key}"))
            .map_err(Error::Upload)
    }

    async fn put_if_absent(
        &self,
        bucket: &str,
        key: &str,
        bytes: Vec<u8>,
        _content_type: &str,
    ) -> Result<bool> {
        let res: anyhow::Result<bool> = async {
            let path = self.object_path(bucket, key)?;
            let tmp = self.write_temp(&path, &bytes).await?;
            // hard_link fails if the destination exists, which gives create-if-absent semantics
            // without exposing a partially written file.
            let linked = tokio::fs::hard_link(&tmp, &path).await;
            let _ = tokio::fs::remove_file(&tmp).await;
            match linked {
                Ok(()) => Ok(true),
                Err(err) if err.kind() == ErrorKind::AlreadyExists => Ok(false),
                Err(err) => Err(anyhow::Error::from(err).context("link object")),
            }
        }
        .await;
        res.with_context(|| format!("fs conditional put bucket={bucket} key={key}"))
            .map_err(Error::Upload)
    }

    async fn replace_if_unchanged(
        &self,
        bucket: &str,
        key: &str,
        expected: &[u8],
        bytes: Vec<u8>,
        _content_type: &str,
    ) -> Result<bool> {
        let res: anyhow::Result<bool> = async {
            let path = self.object_path(bucket, key)?;
            let Some(_guard) = SwapGuard::acquire(&path).await? else {
                return Ok(false);
            };
            let current = match tokio::fs::read(&path).await {
                Ok(current) => current,
                Err(err) if err.kind() == ErrorKind::NotFound => return Ok(false),
                Err(err) => return Err(anyhow::Error::from(err).context("read object")),
            };
            if current != expected {
                return Ok(false);
            }
            let tmp = self.write_temp(&path, &bytes).await?;
            tokio::fs::rename(&tmp, &path)
                .await
                .with_context(|| format!("rename into {}", path.display()))?;
            Ok(true)
        }
        .await;
        res.with_context(|| format!("fs swap bucket={bucket} key={key}"))
            .map_err(Error::Upload)
    }

    async fn get_bytes(&self, bucket: &str, key: &str) -> Result<Vec<u8>> {
        let res: anyhow::Result<Vec<u8>> = async {
            let path = self.object_path(bucket, key)?;
            tokio::fs::read(&path)
                .await
                .with_context(|| format!("read {}", path.display()))
        }
        .await;
        res.with_context(|| format!("fs get bucket={bucket} key={key}"))
            .map_err(Error::Storage)
    }

    async fn delete(&self, bucket: &str, key: &str) -> Result<()> {
        let res: anyhow::Result<()> = async {
            let path = self.object_path(bucket, key)?;
            match tokio::fs::remove_file(&path).await {
                Ok(()) => Ok(()),
                Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
                Err(err) => Err(anyhow::Error::from(err).context("remove object")),
            }
        }
        .await;
        res.with_context(|| format!("fs delete bucket={bucket} key={key}"))
            .map_err(Error::Storage)
    }

    async fn list_keys(&self, bucket: &str, prefix: &str) -> Result<Vec<String>> {
        let bucket_dir = self
            .root
            .join(checked_segment(bucket).map_err(Error::Storage)?);
        let prefix = prefix.to_string();

        tokio::task::spawn_blocking(move || -> anyhow::Result<Vec<String>> {
            let mut keys = Vec::new();
            if bucket_dir.is_dir() {
                walk(&bucket_dir, &bucket_dir, &mut keys)?;
            }
            keys.retain(|k| k.starts_with(&prefix));
            keys.sort();
            Ok(keys)
        })
        .await
        .context("join fs list")
        .and_then(|res| res)
        .with_context(|| format!("fs list bucket={bucket}"))
        .map_err(Error::Storage)
    }

    fn scan_uri(&self, bucket: &str, key: &str) -> String {
        let mut path = self.root.join(bucket);
        for part in key.split('/') {
            path.push(part);
        }
        path.to_string_lossy().into_owned()
    }
}

/// Exclusive marker next to an object while it is being swapped. Removed on drop.
struct SwapGuard {
    path: PathBuf,
}

impl SwapGuard {
    /// `None` if another writer holds the guard or the object's directory does not exist.
    async fn acquire(object: &Path) -> anyhow::Result<Option<Self>> {
        let name = object
            .file_name()
            .ok_or_else(|| anyhow!("object path has no file name: {}", object.display()))?;
        let path = object.with_file_name(format!(".tmp-swap-{}", name.to_string_lossy()));

        let created = tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await;
        match created {
            Ok(_) => Ok(Some(Self { path })),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) if err.kind() == ErrorKind::AlreadyExists => {
                let age = tokio::fs::metadata(&path)
                    .await
                    .ok()
                    .and_then(|m| m.modified().ok())
                    .and_then(|t| t.elapsed().ok());
                if age.is_some_and(|age| age > STALE_SWAP_GUARD) {
                    tracing::warn!(
                        event = "walletsweep.store.stale_swap_guard",
                        path = %path.display(),
                        "removing abandoned swap guard"
                    );
                    let _ = tokio::fs::remove_file(&path).await;
                }
                Ok(None)
            }
            Err(err) => Err(anyhow::Error::from(err).context("create swap guard")),
        }
    }
}

impl Drop for SwapGuard {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}

fn checked_segment(segment: &str) -> anyhow::Result<&str> {
    let mut components = Path::new(segment).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(_)), None) if !segment.is_empty() => Ok(segment),
        _ => Err(anyhow!("invalid object path segment {segment:?}")),
    }
}

fn walk(base: &Path, dir: &Path, out: &mut Vec<String>) -> anyhow::Result<()> {
    for entry in std::fs::read_dir(dir).with_context(|| format!("read dir {}", dir.display()))? {
        let entry = entry.context("read dir entry")?;
        let path = entry.path();
        let name = entry.file_name();
        if name.to_string_lossy().starts_with(".tmp-") {
            continue;
        }
        if entry.file_type().context("stat dir entry")?.is_dir() {
            walk(base, &path, out)?;
            continue;
        }
        let rel = path
            .strip_prefix(base)
            .context("strip bucket prefix")?
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect::<Vec<_>>()
            .join("/");
        out.push(rel);
    }
    Ok(())
}
