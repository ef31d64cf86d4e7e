//! The two sink steps: `publish_to_cache` and `publish_to_cold_storage`.
//!
//! Both key the aggregate by its ISO-8601 date, so the two sinks always agree
//! on where a given day's aggregate lives. Each write is idempotent, which is
//! what makes it safe to run the two sinks concurrently without rollback.

use async_trait::async_trait;

use pipeline::{
    Aggregate, Capability, ColdStoreWriter, FastStoreWriter, PipelineError, ResourceName,
    StepDescriptor, StepName,
};

use crate::step::{Step, StepContext, StepOutput};

/// Writes the aggregate's decimal value to the fast store under its date key.
pub async fn publish_to_cache(
    value: &Aggregate,
    writer: &dyn FastStoreWriter,
    resource: &ResourceName,
) -> Result<(), PipelineError> {
    let key = value.storage_key();
    let cached = value.cache_value();
    tracing::info!(%key, value = %cached, %resource, "writing aggregate to fast store");
    writer
        .put(&key, &cached)
        .await
        .map_err(|e| PipelineError::resource(resource, e))
}

/// Writes the full aggregate to the cold store under its date key.
pub async fn publish_to_cold_storage(
    value: &Aggregate,
    writer: &dyn ColdStoreWriter,
    resource: &ResourceName,
) -> Result<(), PipelineError> {
    let key = value.storage_key();
    tracing::info!(%key, aggregate = %value, %resource, "writing aggregate to cold store");
    writer
        .put(&key, value)
        .await
        .map_err(|e| PipelineError::resource(resource, e))
}

// ---------------------------------------------------------------------------

pub struct PublishToCacheStep {
    descriptor: StepDescriptor,
    upstream: StepName,
    resource: ResourceName,
}

impl PublishToCacheStep {
    pub fn new(name: StepName, upstream: StepName, resource: ResourceName) -> Self {
        Self {
            descriptor: StepDescriptor::new(name)
                .with_input(upstream.clone())
                .with_resource(resource.clone(), Capability::FastStoreWrite),
            upstream,
            resource,
        }
    }
}

#[async_trait]
impl Step for PublishToCacheStep {
    fn descriptor(&self) -> &StepDescriptor {
        &self.descriptor
    }

    async fn execute(&self, ctx: StepContext<'_>) -> Result<StepOutput, PipelineError> {
        let value = ctx.aggregate(&self.upstream)?;
        let writer = ctx.fast_writer(&self.resource)?;
        publish_to_cache(value, writer.as_ref(), &self.resource).await?;
        Ok(StepOutput::Unit)
    }
}

// ---------------------------------------------------------------------------

pub struct PublishToColdStorageStep {
    descriptor: StepDescriptor,
    upstream: StepName,
    resource: ResourceName,
}

impl PublishToColdStorageStep {
    pub fn new(name: StepName, upstream: StepName, resource: ResourceName) -> Self {
        Self {
            descriptor: StepDescriptor::new(name)
                .with_input(upstream.clone())
                .with_resource(resource.clone(), Capability::ColdStoreWrite),
            upstream,
            resource,
        }
    }
}

#[async_trait]
impl Step for PublishToColdStorageStep {
    fn descriptor(&self) -> &StepDescriptor {
        &self.descriptor
    }

    async fn execute(&self, ctx: StepContext<'_>) -> Result<StepOutput, PipelineError> {
        let value = ctx.aggregate(&self.upstream)?;
        let writer = ctx.cold_writer(&self.resource)?;
        publish_to_cold_storage(value, writer.as_ref(), &self.resource).await?;
        Ok(StepOutput::Unit)
    }
}
