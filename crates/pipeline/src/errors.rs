//! Pipeline error and retry-classification types.
//!
//! [`PipelineError`] covers every condition that fails a step or prevents a
//! pipeline from being built. Storage adapters report failures through the
//! narrower [`ResourceError`], which steps wrap into
//! [`PipelineError::ResourceUnavailable`] together with the resource name.
//!
//! [`RetryPolicy`] is a cross-cutting concern: the orchestrator consults it
//! before re-invoking a failed step.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{ResourceName, StepName};

// ---------------------------------------------------------------------------
// Retry semantics
// ---------------------------------------------------------------------------

/// Whether an error condition is safe to retry and, if so, after what delay.
///
/// Only backend failures are retryable. Input and configuration errors produce
/// the same result on every attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RetryPolicy {
    /// The operation may be retried.
    Retryable {
        /// Minimum back-off before the next attempt. `None` means the caller's
        /// own back-off schedule applies.
        after: Option<Duration>,
    },
    /// The operation must not be retried.
    NonRetryable,
}

// ---------------------------------------------------------------------------
// Resource (port) errors
// ---------------------------------------------------------------------------

/// Failure reported by a storage backend through one of the port traits in
/// [`crate::ports`].
#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
pub enum ResourceError {
    /// The requested key does not exist in the backend.
    #[error("key '{key}' not found")]
    NotFound {
        /// The key that was looked up.
        key: String,
    },

    /// The key can never be served by this backend, e.g. it escapes the
    /// store's root.
    #[error("invalid key '{key}'")]
    InvalidKey {
        /// The rejected key.
        key: String,
    },

    /// The backend could not be reached or rejected the request.
    #[error("backend error: {0}")]
    Backend(String),

    /// A stored value could not be encoded or decoded.
    #[error("serialization error: {0}")]
    Serialization(String),
}

// ---------------------------------------------------------------------------
// Pipeline-level errors
// ---------------------------------------------------------------------------

/// Errors that fail a step, a run, or the construction of a pipeline.
#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
pub enum PipelineError {
    /// An input row could not be parsed into a record.
    ///
    /// Produced by: `ingest`. The whole batch is rejected.
    #[error("Malformed record at row {row}: {reason}")]
    MalformedRecord {
        /// Zero-based index of the offending row within the batch.
        row: usize,
        /// Description of the parse failure.
        reason: String,
    },

    /// Aggregation was invoked on an empty batch.
    #[error("Cannot aggregate an empty batch")]
    EmptyBatch,

    /// A read or write through an injected resource failed.
    #[error("Resource '{resource}' unavailable: {source}")]
    ResourceUnavailable {
        /// Name under which the resource was registered.
        resource: ResourceName,
        /// Underlying backend failure.
        source: ResourceError,
    },

    /// A step's configuration is missing or invalid.
    ///
    /// Produced at build time; a pipeline never starts with an invalid config.
    #[error("Configuration error for step '{step}': {message}")]
    Configuration {
        /// The step whose configuration was rejected.
        step: StepName,
        /// Description of the configuration problem.
        message: String,
    },

    /// Two steps share the same name.
    #[error("Duplicate step name '{0}'")]
    DuplicateStep(StepName),

    /// A step declares an input that no step in the graph produces.
    #[error("Step '{step}' depends on unknown step '{dependency}'")]
    UnknownDependency {
        /// The declaring step.
        step: StepName,
        /// The missing upstream step.
        dependency: StepName,
    },

    /// The declared dependencies contain a cycle.
    #[error("Cyclic dependency among steps: {}", format_names(.0))]
    CyclicGraph(Vec<StepName>),

    /// A step requires a resource that was not registered, or that does not
    /// provide the required capability.
    #[error("Step '{step}' requires resource '{resource}' with capability {capability}")]
    MissingResource {
        /// The declaring step.
        step: StepName,
        /// The resource name the step asked for.
        resource: ResourceName,
        /// The capability the step needs from it.
        capability: crate::Capability,
    },

    /// A declared upstream output was absent or had an unexpected shape.
    #[error("Step '{step}' could not bind input '{input}': {message}")]
    InputUnavailable {
        /// The consuming step.
        step: StepName,
        /// The upstream step name.
        input: StepName,
        /// What went wrong.
        message: String,
    },
}

impl PipelineError {
    /// Classifies this error for the orchestrator's retry decision.
    pub fn retry_policy(&self) -> RetryPolicy {
        match self {
            PipelineError::ResourceUnavailable {
                source: ResourceError::Backend(_),
                ..
            } => RetryPolicy::Retryable { after: None },
            _ => RetryPolicy::NonRetryable,
        }
    }

    /// Wraps a port failure with the name of the resource it came from.
    pub fn resource(resource: &ResourceName, source: ResourceError) -> Self {
        PipelineError::ResourceUnavailable {
            resource: resource.clone(),
            source,
        }
    }
}

fn format_names(names: &[StepName]) -> String {
    names
        .iter()
        .map(StepName::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}
