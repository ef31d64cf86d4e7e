//! StockFlow pipeline steps and executor.
//!
//! This crate provides the four default steps (`ingest`, `aggregate`,
//! `publish_to_cache`, `publish_to_cold_storage`) and the
//! [`PipelineExecutor`] that resolves their dependency graph and runs it.
//!
//! ## Architectural Layer
//!
//! **Orchestration layer.** Steps sequence calls between business logic in the
//! [`pipeline`] crate and the injected resource traits. They never construct a
//! storage client themselves.

pub mod executor;
pub mod step;
pub mod steps;

pub use executor::{PipelineBuilder, PipelineExecutor, StepRetryPolicy};
pub use step::{Step, StepContext, StepOutput};

use pipeline::{PipelineName, ResourceName, StepName};

use crate::steps::{AggregateStep, IngestStep, PublishToCacheStep, PublishToColdStorageStep};

/// Step names of the default stock pipeline.
pub mod names {
    pub const INGEST: &str = "ingest";
    pub const AGGREGATE: &str = "aggregate";
    pub const PUBLISH_TO_CACHE: &str = "publish_to_cache";
    pub const PUBLISH_TO_COLD_STORAGE: &str = "publish_to_cold_storage";

    /// Resource the cold-store steps read from and write to.
    pub const COLD_STORE: &str = "s3";
    /// Resource the cache step writes to.
    pub const FAST_STORE: &str = "redis";
}

/// Builder pre-loaded with the default four-step graph:
/// `ingest` → `aggregate` → {`publish_to_cache`, `publish_to_cold_storage`}.
///
/// Callers still supply resources named [`names::COLD_STORE`] and
/// [`names::FAST_STORE`] and the `ingest` configuration before building.
pub fn stock_pipeline(name: PipelineName) -> PipelineBuilder {
    let ingest = StepName::from_static(names::INGEST);
    let aggregate = StepName::from_static(names::AGGREGATE);
    let cold = ResourceName::from_static(names::COLD_STORE);
    let fast = ResourceName::from_static(names::FAST_STORE);

    PipelineBuilder::new(name)
        .step(IngestStep::new(ingest.clone(), cold.clone()))
        .step(AggregateStep::new(aggregate.clone(), ingest))
        .step(PublishToCacheStep::new(
            StepName::from_static(names::PUBLISH_TO_CACHE),
            aggregate.clone(),
            fast,
        ))
        .step(PublishToColdStorageStep::new(
            StepName::from_static(names::PUBLISH_TO_COLD_STORAGE),
            aggregate,
            cold,
        ))
}
