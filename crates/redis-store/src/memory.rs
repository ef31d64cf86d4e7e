//! In-process key-value store
//!
//! Stands in for Redis in local runs and tests. Contents live only as long as
//! the store itself.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;
use pipeline::{FastStoreWriter, ResourceError};

#[derive(Debug, Default)]
pub struct MemoryKvStore {
    entries: RwLock<HashMap<String, String>>,
}

impl MemoryKvStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<String> {
        self.entries.read().get(key).cloned()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Copy of every entry, for reporting at the end of a local run
    pub fn snapshot(&self) -> HashMap<String, String> {
        self.entries.read().clone()
    }
}

#[async_trait]
impl FastStoreWriter for MemoryKvStore {
    async fn put(&self, key: &str, value: &str) -> Result<(), ResourceError> {
        self.entries.write().insert(key.to_string(), value.to_string());
        tracing::debug!(key, value, "Value stored in memory");
        Ok(())
    }
}
