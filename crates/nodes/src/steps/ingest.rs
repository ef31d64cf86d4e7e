//! `ingest`: read one blob of rows from the cold store and parse it.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use pipeline::{
    parse_batch, Capability, ColdStoreReader, PipelineError, Record, ResourceName, StepConfig,
    StepDescriptor, StepName,
};

use crate::step::{Step, StepContext, StepOutput};

/// Settings for [`IngestStep`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngestConfig {
    /// Key of the blob to read.
    pub source_key: String,
}

/// Reads `config.source_key` through `reader` and parses every row.
///
/// Read failures and malformed rows are returned unchanged; nothing is
/// produced for a partially valid batch.
pub async fn ingest(
    config: &IngestConfig,
    reader: &dyn ColdStoreReader,
    resource: &ResourceName,
) -> Result<Vec<Record>, PipelineError> {
    tracing::info!(source_key = %config.source_key, %resource, "reading records from cold store");
    let rows = reader
        .get(&config.source_key)
        .await
        .map_err(|e| PipelineError::resource(resource, e))?;
    let records = parse_batch(&rows)?;
    tracing::debug!(records = records.len(), "parsed batch");
    Ok(records)
}

/// Source step of the stock pipeline.
pub struct IngestStep {
    descriptor: StepDescriptor,
    resource: ResourceName,
}

impl IngestStep {
    /// An ingest step named `name` reading through the cold store registered
    /// as `resource`.
    pub fn new(name: StepName, resource: ResourceName) -> Self {
        Self {
            descriptor: StepDescriptor::new(name)
                .with_resource(resource.clone(), Capability::ColdStoreRead),
            resource,
        }
    }
}

#[async_trait]
impl Step for IngestStep {
    fn descriptor(&self) -> &StepDescriptor {
        &self.descriptor
    }

    fn validate_config(&self, config: &StepConfig) -> Result<(), PipelineError> {
        let config: IngestConfig = config.decode(&self.descriptor.name)?;
        if config.source_key.trim().is_empty() {
            return Err(PipelineError::Configuration {
                step: self.descriptor.name.clone(),
                message: "source_key must not be empty".into(),
            });
        }
        Ok(())
    }

    async fn execute(&self, ctx: StepContext<'_>) -> Result<StepOutput, PipelineError> {
        let config: IngestConfig = ctx.config()?;
        let reader = ctx.cold_reader(&self.resource)?;
        let records = ingest(&config, reader.as_ref(), &self.resource).await?;
        Ok(StepOutput::Records(records))
    }
}
