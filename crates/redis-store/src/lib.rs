//! StockFlow fast-store infrastructure adapters.
//!
//! Implements [`pipeline::FastStoreWriter`] with two backends:
//!
//! - [`RedisKvStore`] — a pooled Redis (or Redis-compatible) connection via
//!   `deadpool-redis`.
//! - [`MemoryKvStore`] — an in-process map, for local runs.
//!
//! ## Architectural Layer
//!
//! **Infrastructure.** Connection pooling, URLs and Redis errors live here.
//! The [`pipeline`] crate sees only [`pipeline::FastStoreWriter`].

mod error;
mod memory;
mod redis;

pub use error::KvStoreError;
pub use memory::MemoryKvStore;
pub use redis::{RedisConfig, RedisKvStore};
