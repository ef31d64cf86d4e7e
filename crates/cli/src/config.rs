//! Configuration file loading and per-step configuration resolution.
//!
//! The file is TOML. Backend tables under `[resources]` are handed to the
//! adapters untouched; step tables under `[steps]` are handed to the executor
//! untouched. The only things interpreted here are the source-key overrides.

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{bail, Context, Result};
use nodes::{names, StepRetryPolicy};
use pipeline::{StepConfig, StepConfigs, StepName};
use redis_store::RedisConfig;
use s3_store::S3Config;
use serde::Deserialize;

/// File read when `--config` is not given, if it exists.
pub const DEFAULT_CONFIG_PATH: &str = "stockflow.toml";

const PARTITION_PLACEHOLDER: &str = "{partition}";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    #[default]
    Compact,
    Json,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PipelineSection {
    pub name: String,
}

impl Default for PipelineSection {
    fn default() -> Self {
        Self {
            name: "stock_pipeline".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ResourcesSection {
    pub s3: Option<S3Config>,
    pub redis: Option<RedisConfig>,
}

/// Static partitions, each reading its own blob.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PartitionsSection {
    pub keys: Vec<String>,
    /// Source key with a `{partition}` placeholder, e.g. `prefix/stock_{partition}.csv`.
    pub source_key_template: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TelemetrySection {
    pub log_format: LogFormat,
    /// OTLP/gRPC collector endpoint. Tracing export is off when unset.
    pub otlp_endpoint: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub pipeline: PipelineSection,
    pub resources: ResourcesSection,
    pub steps: BTreeMap<String, serde_json::Value>,
    pub partitions: Option<PartitionsSection>,
    pub retry: StepRetryPolicy,
    pub telemetry: TelemetrySection,
}

impl Config {
    /// Loads `path`, or [`DEFAULT_CONFIG_PATH`] if present, or the defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(path) => path,
            None if Path::new(DEFAULT_CONFIG_PATH).exists() => Path::new(DEFAULT_CONFIG_PATH),
            None => return Ok(Self::default()),
        };
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::parse(&raw).with_context(|| format!("Invalid config file: {}", path.display()))
    }

    pub fn parse(raw: &str) -> Result<Self> {
        Ok(toml::from_str(raw)?)
    }

    /// Builds the executor's per-step configuration map.
    ///
    /// The ingest source key is taken from, in order: `source_key`, the
    /// rendered partition template for `partition`, the `[steps.ingest]` table.
    pub fn step_configs(
        &self,
        source_key: Option<&str>,
        partition: Option<&str>,
    ) -> Result<StepConfigs> {
        let mut configs = StepConfigs::new();
        for (name, value) in &self.steps {
            let step = StepName::new(name.clone()).context("Step names must not be empty")?;
            configs.insert(step, StepConfig::new(value.clone()));
        }

        let source_key = match (source_key, partition) {
            (Some(key), _) => Some(key.to_string()),
            (None, Some(partition)) => Some(self.partition_source_key(partition)?),
            (None, None) => None,
        };

        if let Some(key) = source_key {
            let ingest = StepName::from_static(names::INGEST);
            let mut table = match configs.remove(&ingest).map(|c| c.as_value().clone()) {
                Some(serde_json::Value::Object(table)) => table,
                Some(serde_json::Value::Null) | None => serde_json::Map::new(),
                Some(other) => bail!("[steps.{}] must be a table, found {other}", names::INGEST),
            };
            table.insert("source_key".into(), serde_json::Value::String(key));
            configs.insert(ingest, StepConfig::new(serde_json::Value::Object(table)));
        }

        Ok(configs)
    }

    fn partition_source_key(&self, partition: &str) -> Result<String> {
        let Some(partitions) = &self.partitions else {
            bail!("--partition given but no [partitions] section is configured");
        };
        if !partitions.keys.iter().any(|k| k == partition) {
            bail!(
                "Unknown partition '{partition}'; expected one of: {}",
                partitions.keys.join(", ")
            );
        }
        if !partitions.source_key_template.contains(PARTITION_PLACEHOLDER) {
            bail!("source_key_template must contain {PARTITION_PLACEHOLDER}");
        }
        Ok(partitions
            .source_key_template
            .replace(PARTITION_PLACEHOLDER, partition))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    const DOCKER: &str = r#"
[pipeline]
name = "week_2_pipeline_docker"

[resources.s3]
bucket = "dagster"
access_key = "test"
secret_key = "test"
endpoint_url = "http://localstack:4566"

[resources.redis]
host = "redis"
port = 6379

[steps.ingest]
source_key = "prefix/stock.csv"

[partitions]
keys = ["1", "2", "3"]
source_key_template = "prefix/stock_{partition}.csv"

[retry]
max_retries = 10
delay_ms = 1000
"#;

    fn ingest_key(configs: &StepConfigs) -> Option<String> {
        configs
            .get(&StepName::from_static(names::INGEST))
            .and_then(|c| c.as_value().get("source_key"))
            .and_then(|v| v.as_str())
            .map(str::to_string)
    }

    #[test]
    fn parses_full_config() {
        let config = Config::parse(DOCKER).unwrap();
        assert_eq!(config.pipeline.name, "week_2_pipeline_docker");
        let s3 = config.resources.s3.as_ref().unwrap();
        assert_eq!(s3.bucket, "dagster");
        assert_eq!(s3.endpoint_url.as_deref(), Some("http://localstack:4566"));
        assert_eq!(config.resources.redis.as_ref().unwrap().host, "redis");
        assert_eq!(config.retry.max_retries, 10);
        assert_eq!(config.retry.delay, Duration::from_secs(1));
        assert_eq!(config.telemetry.log_format, LogFormat::Compact);
    }

    #[test]
    fn empty_file_uses_defaults() {
        let config = Config::parse("").unwrap();
        assert_eq!(config.pipeline.name, "stock_pipeline");
        assert!(config.resources.s3.is_none());
        assert_eq!(config.retry, StepRetryPolicy::default());
    }

    #[test]
    fn unknown_sections_are_rejected() {
        assert!(Config::parse("[sensors]\ninterval = 30\n").is_err());
    }

    #[test]
    fn file_source_key_is_used_by_default() {
        let configs = Config::parse(DOCKER).unwrap().step_configs(None, None).unwrap();
        assert_eq!(ingest_key(&configs).as_deref(), Some("prefix/stock.csv"));
    }

    #[test]
    fn partition_renders_template() {
        let configs = Config::parse(DOCKER)
            .unwrap()
            .step_configs(None, Some("2"))
            .unwrap();
        assert_eq!(ingest_key(&configs).as_deref(), Some("prefix/stock_2.csv"));
    }

    #[test]
    fn explicit_source_key_wins() {
        let configs = Config::parse(DOCKER)
            .unwrap()
            .step_configs(Some("prefix/other.csv"), Some("2"))
            .unwrap();
        assert_eq!(ingest_key(&configs).as_deref(), Some("prefix/other.csv"));
    }

    #[test]
    fn unknown_partition_is_an_error() {
        let err = Config::parse(DOCKER)
            .unwrap()
            .step_configs(None, Some("11"))
            .unwrap_err();
        assert!(err.to_string().contains("Unknown partition '11'"));
    }

    #[test]
    fn partition_without_section_is_an_error() {
        let err = Config::default().step_configs(None, Some("1")).unwrap_err();
        assert!(err.to_string().contains("no [partitions] section"));
    }

    #[test]
    fn source_key_override_creates_ingest_table() {
        let configs = Config::default()
            .step_configs(Some("prefix/stock.csv"), None)
            .unwrap();
        assert_eq!(ingest_key(&configs).as_deref(), Some("prefix/stock.csv"));
    }

    #[test]
    fn other_step_tables_pass_through() {
        let config = Config::parse("[steps.aggregate]\nfield = \"close\"\n").unwrap();
        let configs = config.step_configs(None, None).unwrap();
        let aggregate = configs.get(&StepName::from_static(names::AGGREGATE)).unwrap();
        assert_eq!(aggregate.as_value()["field"], "close");
    }
}
