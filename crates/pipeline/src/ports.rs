//! Resource port traits and the registry the orchestrator injects them from.
//!
//! Steps never construct storage clients. They declare which named resource
//! and which [`Capability`] they need, and the orchestrator hands them a
//! shared handle from the [`ResourceRegistry`] at call time. Adapter crates
//! (`s3-store`, `redis-store`) implement the traits; tests implement them with
//! in-process doubles.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::{Aggregate, ResourceError, ResourceName, Row};

// ---------------------------------------------------------------------------
// Capability traits
// ---------------------------------------------------------------------------

/// Reads a named blob of rows from durable object storage.
#[async_trait]
pub trait ColdStoreReader: Send + Sync {
    /// Returns every row stored under `key`, in stored order.
    ///
    /// Fails with [`ResourceError::NotFound`] if `key` does not exist.
    async fn get(&self, key: &str) -> Result<Vec<Row>, ResourceError>;
}

/// Writes an aggregate to durable object storage.
#[async_trait]
pub trait ColdStoreWriter: Send + Sync {
    /// Stores `value` under `key`.
    ///
    /// Writing the same value to the same key twice leaves the store in the
    /// same state as writing it once.
    async fn put(&self, key: &str, value: &Aggregate) -> Result<(), ResourceError>;
}

/// Writes a string value to a low-latency key-value store.
#[async_trait]
pub trait FastStoreWriter: Send + Sync {
    /// Stores `value` under `key`, replacing any previous value.
    async fn put(&self, key: &str, value: &str) -> Result<(), ResourceError>;
}

// ---------------------------------------------------------------------------
// Capabilities
// ---------------------------------------------------------------------------

/// A capability a step may require from a named resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    ColdStoreRead,
    ColdStoreWrite,
    FastStoreWrite,
}

impl std::fmt::Display for Capability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Capability::ColdStoreRead => "cold_store_read",
            Capability::ColdStoreWrite => "cold_store_write",
            Capability::FastStoreWrite => "fast_store_write",
        };
        f.write_str(name)
    }
}

// ---------------------------------------------------------------------------
// Handles
// ---------------------------------------------------------------------------

/// A configured backend, exposing whichever capabilities it implements.
///
/// Cloning a handle clones the `Arc`s, not the backend.
#[derive(Clone, Default)]
pub struct ResourceHandle {
    cold_reader: Option<Arc<dyn ColdStoreReader>>,
    cold_writer: Option<Arc<dyn ColdStoreWriter>>,
    fast_writer: Option<Arc<dyn FastStoreWriter>>,
}

impl ResourceHandle {
    /// A cold store that can be both read and written.
    pub fn cold_store<S>(store: Arc<S>) -> Self
    where
        S: ColdStoreReader + ColdStoreWriter + 'static,
    {
        Self {
            cold_reader: Some(store.clone()),
            cold_writer: Some(store),
            fast_writer: None,
        }
    }

    /// A fast key-value store.
    pub fn fast_store<S>(store: Arc<S>) -> Self
    where
        S: FastStoreWriter + 'static,
    {
        Self {
            fast_writer: Some(store),
            ..Self::default()
        }
    }

    /// Returns `true` if this handle implements `capability`.
    pub fn provides(&self, capability: Capability) -> bool {
        match capability {
            Capability::ColdStoreRead => self.cold_reader.is_some(),
            Capability::ColdStoreWrite => self.cold_writer.is_some(),
            Capability::FastStoreWrite => self.fast_writer.is_some(),
        }
    }
}

impl std::fmt::Debug for ResourceHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceHandle")
            .field("cold_store_read", &self.cold_reader.is_some())
            .field("cold_store_write", &self.cold_writer.is_some())
            .field("fast_store_write", &self.fast_writer.is_some())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// Named resource handles available to a pipeline.
///
/// Built once at configuration time and shared read-only by every step.
#[derive(Debug, Clone, Default)]
pub struct ResourceRegistry {
    handles: HashMap<ResourceName, ResourceHandle>,
}

impl ResourceRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `handle` under `name`, replacing any previous registration.
    pub fn insert(&mut self, name: ResourceName, handle: ResourceHandle) {
        self.handles.insert(name, handle);
    }

    /// Builder-style variant of [`ResourceRegistry::insert`].
    pub fn with(mut self, name: ResourceName, handle: ResourceHandle) -> Self {
        self.insert(name, handle);
        self
    }

    /// Returns `true` if `name` is registered and provides `capability`.
    pub fn provides(&self, name: &ResourceName, capability: Capability) -> bool {
        self.handles
            .get(name)
            .is_some_and(|handle| handle.provides(capability))
    }

    /// Returns the cold-store reader registered under `name`.
    pub fn cold_reader(&self, name: &ResourceName) -> Option<Arc<dyn ColdStoreReader>> {
        self.handles.get(name)?.cold_reader.clone()
    }

    /// Returns the cold-store writer registered under `name`.
    pub fn cold_writer(&self, name: &ResourceName) -> Option<Arc<dyn ColdStoreWriter>> {
        self.handles.get(name)?.cold_writer.clone()
    }

    /// Returns the fast-store writer registered under `name`.
    pub fn fast_writer(&self, name: &ResourceName) -> Option<Arc<dyn FastStoreWriter>> {
        self.handles.get(name)?.fast_writer.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NullStore;

    #[async_trait]
    impl ColdStoreReader for NullStore {
        async fn get(&self, key: &str) -> Result<Vec<Row>, ResourceError> {
            Err(ResourceError::NotFound {
                key: key.to_string(),
            })
        }
    }

    #[async_trait]
    impl ColdStoreWriter for NullStore {
        async fn put(&self, _key: &str, _value: &Aggregate) -> Result<(), ResourceError> {
            Ok(())
        }
    }

    #[async_trait]
    impl FastStoreWriter for NullStore {
        async fn put(&self, _key: &str, _value: &str) -> Result<(), ResourceError> {
            Ok(())
        }
    }

    fn name(value: &str) -> ResourceName {
        ResourceName::new(value).unwrap()
    }

    #[test]
    fn cold_store_handle_provides_read_and_write_only() {
        let handle = ResourceHandle::cold_store(Arc::new(NullStore));
        assert!(handle.provides(Capability::ColdStoreRead));
        assert!(handle.provides(Capability::ColdStoreWrite));
        assert!(!handle.provides(Capability::FastStoreWrite));
    }

    #[test]
    fn fast_store_handle_provides_fast_write_only() {
        let handle = ResourceHandle::fast_store(Arc::new(NullStore));
        assert!(handle.provides(Capability::FastStoreWrite));
        assert!(!handle.provides(Capability::ColdStoreRead));
    }

    #[test]
    fn registry_looks_up_by_name_and_capability() {
        let registry = ResourceRegistry::new()
            .with(name("s3"), ResourceHandle::cold_store(Arc::new(NullStore)))
            .with(name("redis"), ResourceHandle::fast_store(Arc::new(NullStore)));

        assert!(registry.provides(&name("s3"), Capability::ColdStoreRead));
        assert!(!registry.provides(&name("s3"), Capability::FastStoreWrite));
        assert!(registry.provides(&name("redis"), Capability::FastStoreWrite));
        assert!(!registry.provides(&name("postgres"), Capability::ColdStoreRead));

        assert!(registry.cold_reader(&name("s3")).is_some());
        assert!(registry.cold_writer(&name("redis")).is_none());
        assert!(registry.fast_writer(&name("redis")).is_some());
    }

    #[tokio::test]
    async fn injected_reader_reaches_the_backend() {
        let registry =
            ResourceRegistry::new().with(name("s3"), ResourceHandle::cold_store(Arc::new(NullStore)));
        let reader = registry.cold_reader(&name("s3")).unwrap();
        let err = reader.get("prefix/stock.csv").await.unwrap_err();
        assert_eq!(
            err,
            ResourceError::NotFound {
                key: "prefix/stock.csv".into()
            }
        );
    }
}
