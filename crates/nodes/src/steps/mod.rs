//! The four steps of the stock pipeline.
//!
//! Each module exposes the step's plain operation as a free function (so it
//! can be called and tested without an executor) plus the [`crate::Step`]
//! implementation that binds it to inputs, resources and configuration.

pub mod aggregate;
pub mod ingest;
pub mod publish;

pub use aggregate::{aggregate, AggregateConfig, AggregateStep};
pub use ingest::{ingest, IngestConfig, IngestStep};
pub use publish::{
    publish_to_cache, publish_to_cold_storage, PublishToCacheStep, PublishToColdStorageStep,
};
