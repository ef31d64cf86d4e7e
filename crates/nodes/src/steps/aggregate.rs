//! `aggregate`: reduce a batch to the record with the largest target value.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use pipeline::{Aggregate, PipelineError, Record, RecordField, StepDescriptor, StepName};

use crate::step::{Step, StepContext, StepOutput};

/// Settings for [`AggregateStep`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AggregateConfig {
    /// Field to rank records by.
    pub field: RecordField,
}

/// Returns the aggregate of the record with the largest `field` value.
///
/// Single linear scan; among equal maxima the earliest record wins.
pub fn aggregate(records: &[Record], field: RecordField) -> Result<Aggregate, PipelineError> {
    let (first, rest) = records.split_first().ok_or(PipelineError::EmptyBatch)?;
    let best = rest.iter().fold(first, |best, record| {
        if record.value(field) > best.value(field) {
            record
        } else {
            best
        }
    });
    Ok(Aggregate {
        date: best.date,
        field,
        value: best.value(field),
    })
}

pub struct AggregateStep {
    descriptor: StepDescriptor,
    upstream: StepName,
}

impl AggregateStep {
    /// An aggregate step named `name` consuming the records of `upstream`.
    pub fn new(name: StepName, upstream: StepName) -> Self {
        Self {
            descriptor: StepDescriptor::new(name).with_input(upstream.clone()),
            upstream,
        }
    }
}

#[async_trait]
impl Step for AggregateStep {
    fn descriptor(&self) -> &StepDescriptor {
        &self.descriptor
    }

    fn validate_config(&self, config: &pipeline::StepConfig) -> Result<(), PipelineError> {
        config
            .decode::<AggregateConfig>(&self.descriptor.name)
            .map(|_| ())
    }

    async fn execute(&self, ctx: StepContext<'_>) -> Result<StepOutput, PipelineError> {
        let config: AggregateConfig = ctx.config()?;
        let records = ctx.records(&self.upstream)?;
        let aggregate = aggregate(records, config.field)?;
        tracing::info!(
            date = %aggregate.date,
            field = %aggregate.field,
            value = aggregate.value,
            batch = records.len(),
            "aggregated batch"
        );
        Ok(StepOutput::Aggregate(aggregate))
    }
}
