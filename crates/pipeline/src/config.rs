//! Per-step configuration carried as data.
//!
//! The orchestrator holds one [`StepConfig`] per step and never interprets it.
//! Each step decodes its own typed configuration with [`StepConfig::decode`],
//! once at build time for validation and again when it executes.

use std::collections::BTreeMap;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::{PipelineError, StepName};

/// Opaque configuration for one step.
///
/// An absent configuration behaves like an empty table, so steps whose
/// settings all have defaults need no entry at all.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StepConfig(serde_json::Value);

impl StepConfig {
    /// Wraps a raw configuration value.
    pub fn new(value: serde_json::Value) -> Self {
        Self(value)
    }

    /// Returns the raw value.
    pub fn as_value(&self) -> &serde_json::Value {
        &self.0
    }

    /// Decodes the configuration into the step's typed settings.
    pub fn decode<T: DeserializeOwned>(&self, step: &StepName) -> Result<T, PipelineError> {
        let value = match &self.0 {
            serde_json::Value::Null => serde_json::Value::Object(serde_json::Map::new()),
            other => other.clone(),
        };
        serde_json::from_value(value).map_err(|e| PipelineError::Configuration {
            step: step.clone(),
            message: e.to_string(),
        })
    }
}

impl From<serde_json::Value> for StepConfig {
    fn from(value: serde_json::Value) -> Self {
        Self(value)
    }
}

/// Configuration for every step of a pipeline, keyed by step name.
pub type StepConfigs = BTreeMap<StepName, StepConfig>;

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Sample {
        key: String,
        #[serde(default)]
        limit: u32,
    }

    #[derive(Debug, Default, Deserialize, PartialEq)]
    #[serde(default)]
    struct AllDefaults {
        limit: u32,
    }

    fn step() -> StepName {
        StepName::new("ingest").unwrap()
    }

    #[test]
    fn decodes_typed_settings() {
        let config = StepConfig::new(json!({ "key": "prefix/stock.csv" }));
        let sample: Sample = config.decode(&step()).unwrap();
        assert_eq!(
            sample,
            Sample {
                key: "prefix/stock.csv".into(),
                limit: 0
            }
        );
    }

    #[test]
    fn missing_config_decodes_as_empty_table() {
        let decoded: AllDefaults = StepConfig::default().decode(&step()).unwrap();
        assert_eq!(decoded, AllDefaults::default());
    }

    #[test]
    fn missing_required_field_is_a_configuration_error() {
        let err = StepConfig::default().decode::<Sample>(&step()).unwrap_err();
        match err {
            PipelineError::Configuration { step: s, message } => {
                assert_eq!(s, step());
                assert!(message.contains("key"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
