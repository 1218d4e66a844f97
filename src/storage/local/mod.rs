use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tracing::debug;

use super::ObjectStore;
use crate::errors::RelayError;
use crate::messages::StorageReference;
use crate::utils::{atomic_write, safe_filename};

const CONTENT_TYPE_SUFFIX: &str = ".content-type";

/// Filesystem-backed object store rooted at `<root>/<bucket>/`.
pub struct LocalObjectStore {
    root: PathBuf,
    bucket: String,
}

impl LocalObjectStore {
    pub fn new(root: impl Into<PathBuf>, bucket: &str) -> Self {
        Self {
            root: root.into(),
            bucket: bucket.to_string(),
        }
    }

    fn bucket_dir(&self) -> PathBuf {
        self.root.join(&self.bucket)
    }

    /// Map a key to a path inside the bucket, one sanitized segment per `/`.
    pub fn object_path(&self, key: &str) -> PathBuf {
        key.split('/')
            .filter(|s| !s.is_empty())
            .fold(self.bucket_dir(), |p, seg| p.join(safe_filename(seg)))
    }

    pub fn read(&self, key: &str) -> anyhow::Result<(Vec<u8>, String)> {
        let path = self.object_path(key);
        let bytes = std::fs::read(&path)?;
        let content_type = std::fs::read_to_string(sidecar(&path))?;
        Ok((bytes, content_type))
    }
}

fn sidecar(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(CONTENT_TYPE_SUFFIX);
    PathBuf::from(name)
}

#[async_trait]
impl ObjectStore for LocalObjectStore {
    async fn put(
        &self,
        key: &str,
        bytes: &[u8],
        content_type: &str,
    ) -> Result<StorageReference, RelayError> {
        let path = self.object_path(key);
        let data = bytes.to_vec();
        let ct = content_type.to_string();
        let write_path = path.clone();

        tokio::task::spawn_blocking(move || -> anyhow::Result<()> {
            atomic_write(&write_path, &data)?;
            atomic_write(&sidecar(&write_path), ct.as_bytes())?;
            Ok(())
        })
        .await
        .map_err(|e| RelayError::Storage(format!("upload task failed: {e}")))?
        .map_err(|e| RelayError::Storage(format!("{e:#}")))?;

        debug!(
            "stored {} ({} bytes) at {}",
            key,
            bytes.len(),
            path.display()
        );

        Ok(StorageReference {
            bucket: self.bucket.clone(),
            key: key.to_string(),
            content_type: content_type.to_string(),
        })
    }

    fn bucket(&self) -> &str {
        &self.bucket
    }
}

#[cfg(test)]
mod tests;
