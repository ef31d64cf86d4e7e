//! Core orchestration domain for StockFlow.
//!
//! This crate contains the record model, the step graph, the run report, and
//! the port traits through which steps reach their storage backends.
//! Infrastructure crates implement the traits defined here; they never add
//! domain rules.
//!
//! ## Architectural Layer
//!
//! **Business logic + port definitions.** This crate has no I/O dependencies.
//! It defines *what* is needed; infrastructure crates define *how* to supply it.
//!
//! ## Module Layout
//!
//! | Module | Contents |
//! |--------|----------|
//! | [`identifiers`] | Newtype identifiers (`StepName`, `ResourceName`, `PipelineRunId`) |
//! | [`types`] | `Record`, `RecordField`, `Aggregate` |
//! | [`parse`] | Row-to-record parsing |
//! | [`ports`] | Resource capability traits, handles and the registry |
//! | [`graph`] | Step descriptors and topological ordering |
//! | [`config`] | Opaque per-step configuration |
//! | [`report`] | Step states and run reports |
//! | [`errors`] | Error and retry-classification types |

pub mod config;
pub mod errors;
pub mod graph;
pub mod identifiers;
pub mod parse;
pub mod ports;
pub mod report;
pub mod types;

// Re-export everything at the crate root for ergonomic usage by downstream crates.
pub use config::{StepConfig, StepConfigs};
pub use errors::{PipelineError, ResourceError, RetryPolicy};
pub use graph::{PipelineGraph, ResourceRequirement, StepDescriptor};
pub use identifiers::{PipelineName, PipelineRunId, ResourceName, StepName};
pub use parse::{parse_batch, parse_record};
pub use ports::{
    Capability, ColdStoreReader, ColdStoreWriter, FastStoreWriter, ResourceHandle,
    ResourceRegistry,
};
pub use report::{classify_outcome, RunOutcome, RunReport, StepReport, StepState};
pub use types::{Aggregate, Record, RecordField, Row};
