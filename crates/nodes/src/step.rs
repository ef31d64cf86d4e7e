//! The [`Step`] trait and the context a step executes in.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;

use pipeline::{
    Aggregate, Capability, ColdStoreReader, ColdStoreWriter, FastStoreWriter, PipelineError,
    PipelineRunId, Record, ResourceName, ResourceRegistry, StepConfig, StepDescriptor, StepName,
};

/// Value produced by a step and handed to its dependents.
#[derive(Debug, Clone, PartialEq)]
pub enum StepOutput {
    Records(Vec<Record>),
    Aggregate(Aggregate),
    /// The step ran for its side effect only.
    Unit,
}

impl StepOutput {
    fn kind(&self) -> &'static str {
        match self {
            StepOutput::Records(_) => "records",
            StepOutput::Aggregate(_) => "aggregate",
            StepOutput::Unit => "unit",
        }
    }
}

/// One named unit of computation in a pipeline graph.
#[async_trait]
pub trait Step: Send + Sync {
    /// Static declaration of the step's inputs and resource needs.
    fn descriptor(&self) -> &StepDescriptor;

    /// Checks the step's configuration at build time.
    ///
    /// The default accepts anything; steps with required settings override it.
    fn validate_config(&self, _config: &StepConfig) -> Result<(), PipelineError> {
        Ok(())
    }

    /// Runs the step once.
    async fn execute(&self, ctx: StepContext<'_>) -> Result<StepOutput, PipelineError>;
}

/// Everything a step may touch while it runs, borrowed from the executor.
///
/// Inputs are restricted to the step's declared upstream steps, and resources
/// to those it declared with the matching capability.
pub struct StepContext<'a> {
    run_id: PipelineRunId,
    descriptor: &'a StepDescriptor,
    outputs: &'a HashMap<StepName, StepOutput>,
    resources: &'a ResourceRegistry,
    config: &'a StepConfig,
}

impl<'a> StepContext<'a> {
    pub fn new(
        run_id: PipelineRunId,
        descriptor: &'a StepDescriptor,
        outputs: &'a HashMap<StepName, StepOutput>,
        resources: &'a ResourceRegistry,
        config: &'a StepConfig,
    ) -> Self {
        Self {
            run_id,
            descriptor,
            outputs,
            resources,
            config,
        }
    }

    pub fn run_id(&self) -> PipelineRunId {
        self.run_id
    }

    pub fn step(&self) -> &'a StepName {
        &self.descriptor.name
    }

    /// Decodes this step's configuration.
    pub fn config<T: DeserializeOwned>(&self) -> Result<T, PipelineError> {
        self.config.decode(&self.descriptor.name)
    }

    /// Binds the records produced by `upstream`.
    pub fn records(&self, upstream: &StepName) -> Result<&'a [Record], PipelineError> {
        match self.input(upstream)? {
            StepOutput::Records(records) => Ok(records),
            other => Err(self.mismatch(upstream, "records", other)),
        }
    }

    /// Binds the aggregate produced by `upstream`.
    pub fn aggregate(&self, upstream: &StepName) -> Result<&'a Aggregate, PipelineError> {
        match self.input(upstream)? {
            StepOutput::Aggregate(aggregate) => Ok(aggregate),
            other => Err(self.mismatch(upstream, "aggregate", other)),
        }
    }

    pub fn cold_reader(
        &self,
        resource: &ResourceName,
    ) -> Result<Arc<dyn ColdStoreReader>, PipelineError> {
        self.require(resource, Capability::ColdStoreRead)?;
        self.resources
            .cold_reader(resource)
            .ok_or_else(|| self.missing(resource, Capability::ColdStoreRead))
    }

    pub fn cold_writer(
        &self,
        resource: &ResourceName,
    ) -> Result<Arc<dyn ColdStoreWriter>, PipelineError> {
        self.require(resource, Capability::ColdStoreWrite)?;
        self.resources
            .cold_writer(resource)
            .ok_or_else(|| self.missing(resource, Capability::ColdStoreWrite))
    }

    pub fn fast_writer(
        &self,
        resource: &ResourceName,
    ) -> Result<Arc<dyn FastStoreWriter>, PipelineError> {
        self.require(resource, Capability::FastStoreWrite)?;
        self.resources
            .fast_writer(resource)
            .ok_or_else(|| self.missing(resource, Capability::FastStoreWrite))
    }

    fn input(&self, upstream: &StepName) -> Result<&'a StepOutput, PipelineError> {
        if !self.descriptor.inputs.contains(upstream) {
            return Err(PipelineError::InputUnavailable {
                step: self.descriptor.name.clone(),
                input: upstream.clone(),
                message: "not a declared input".into(),
            });
        }
        self.outputs
            .get(upstream)
            .ok_or_else(|| PipelineError::InputUnavailable {
                step: self.descriptor.name.clone(),
                input: upstream.clone(),
                message: "upstream produced no output".into(),
            })
    }

    fn mismatch(&self, upstream: &StepName, expected: &str, found: &StepOutput) -> PipelineError {
        PipelineError::InputUnavailable {
            step: self.descriptor.name.clone(),
            input: upstream.clone(),
            message: format!("expected {expected}, found {}", found.kind()),
        }
    }

    fn require(&self, resource: &ResourceName, capability: Capability) -> Result<(), PipelineError> {
        let declared = self
            .descriptor
            .resources
            .iter()
            .any(|r| &r.resource == resource && r.capability == capability);
        if declared {
            Ok(())
        } else {
            Err(self.missing(resource, capability))
        }
    }

    fn missing(&self, resource: &ResourceName, capability: Capability) -> PipelineError {
        PipelineError::MissingResource {
            step: self.descriptor.name.clone(),
            resource: resource.clone(),
            capability,
        }
    }
}
