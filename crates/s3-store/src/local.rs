//! Filesystem-backed object store
//!
//! Maps object keys onto paths below a root directory, so
//! `prefix/stock.csv` lives at `{root}/prefix/stock.csv`. Used for local runs
//! where no S3-compatible service is available.

use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use pipeline::{Aggregate, ColdStoreReader, ColdStoreWriter, ResourceError, Row};

use crate::codec::{decode_aggregate, decode_rows, encode_aggregate};
use crate::ObjectStoreError;

/// Object store rooted at a local directory
#[derive(Debug, Clone)]
pub struct LocalObjectStore {
    root: PathBuf,
}

impl LocalObjectStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        tracing::debug!(root = %root.display(), "Local object store initialized");
        Self { root }
    }

    /// Resolve a key to a path, rejecting keys that would escape the root
    fn object_path(&self, key: &str) -> Result<PathBuf, ObjectStoreError> {
        let relative = Path::new(key);
        let escapes = key.is_empty()
            || relative
                .components()
                .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
        if escapes {
            return Err(ObjectStoreError::InvalidKey(key.to_string()));
        }
        Ok(self.root.join(relative))
    }

    async fn read(&self, key: &str) -> Result<Vec<u8>, ObjectStoreError> {
        let path = self.object_path(key)?;
        tokio::fs::read(&path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ObjectStoreError::NotFound(key.to_string())
            } else {
                ObjectStoreError::Io(e)
            }
        })
    }

    async fn write(&self, key: &str, data: &[u8]) -> Result<(), ObjectStoreError> {
        let path = self.object_path(key)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, data).await?;
        tracing::debug!(key, size = data.len(), path = %path.display(), "Object written");
        Ok(())
    }

    /// Read back an aggregate stored by [`ColdStoreWriter::put`]
    pub async fn get_aggregate(&self, key: &str) -> Result<Aggregate, ObjectStoreError> {
        decode_aggregate(&self.read(key).await?)
    }
}

#[async_trait]
impl ColdStoreReader for LocalObjectStore {
    async fn get(&self, key: &str) -> Result<Vec<Row>, ResourceError> {
        let data = self.read(key).await?;
        Ok(decode_rows(&data)?)
    }
}

#[async_trait]
impl ColdStoreWriter for LocalObjectStore {
    async fn put(&self, key: &str, value: &Aggregate) -> Result<(), ResourceError> {
        let data = encode_aggregate(value)?;
        Ok(self.write(key, &data).await?)
    }
}
