//! StockFlow CLI entry point.
//!
//! This binary is the composition root for the entire system. Responsibilities:
//!
//! 1. **Parse configuration**: load `stockflow.toml` (or `--config`) and apply
//!    command-line overrides to the per-step configuration.
//! 2. **Wire observability**: configure `tracing-subscriber` with a compact or
//!    JSON layer and, when an endpoint is configured, an OpenTelemetry OTLP
//!    exporter. Spans and events from every crate flow through it.
//! 3. **Construct infrastructure**: create the concrete cold and fast stores
//!    (S3 + Redis, or a local directory + in-process map under `--local`) and
//!    register them under the resource names the steps declare.
//! 4. **Run once**: build the default stock pipeline, run it, print the JSON
//!    run report on stdout, and exit non-zero unless every step succeeded.

mod config;
mod telemetry;

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use nodes::names;
use pipeline::{PipelineName, ResourceHandle, ResourceName, ResourceRegistry, RunOutcome};
use redis_store::{MemoryKvStore, RedisKvStore};
use s3_store::{LocalObjectStore, S3ObjectStore};

use crate::config::{Config, LogFormat};

#[derive(Debug, Parser)]
#[command(name = "stockflow", version, about = "Run the stock aggregation pipeline once")]
struct Cli {
    /// Configuration file (defaults to ./stockflow.toml when present)
    #[arg(short, long, env = "STOCKFLOW_CONFIG")]
    config: Option<PathBuf>,

    /// Cold-store key of the CSV to ingest
    #[arg(long, env = "STOCKFLOW_SOURCE_KEY")]
    source_key: Option<String>,

    /// Partition to run; renders the configured source key template
    #[arg(long)]
    partition: Option<String>,

    /// Use a local directory and an in-process cache instead of S3 and Redis
    #[arg(long)]
    local: bool,

    /// Root directory of the local cold store
    #[arg(long, default_value = "data")]
    data_dir: PathBuf,

    /// Console log format; overrides `[telemetry] log_format`
    #[arg(long, value_enum, env = "STOCKFLOW_LOG_FORMAT")]
    log_format: Option<LogFormat>,
}

#[tokio::main]
async fn main() -> ExitCode {
    match run(Cli::parse()).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<ExitCode> {
    let config = Config::load(cli.config.as_deref())?;
    let telemetry = telemetry::init(
        cli.log_format.unwrap_or(config.telemetry.log_format),
        config.telemetry.otlp_endpoint.as_deref(),
    )?;

    let result = run_pipeline(&cli, &config).await;
    telemetry.shutdown();
    result
}

async fn run_pipeline(cli: &Cli, config: &Config) -> Result<ExitCode> {
    let name = PipelineName::new(config.pipeline.name.clone())
        .context("[pipeline] name must not be empty")?;
    let configs = config.step_configs(cli.source_key.as_deref(), cli.partition.as_deref())?;

    let (resources, local_cache) = if cli.local {
        local_resources(&cli.data_dir)
    } else {
        (remote_resources(config).await?, None)
    };

    let executor = nodes::stock_pipeline(name)
        .resources(resources)
        .configs(configs)
        .retry_policy(config.retry)
        .build()?;

    let report = executor.run().await;
    println!("{}", serde_json::to_string_pretty(&report)?);

    if let Some(cache) = local_cache {
        for (key, value) in cache.snapshot() {
            tracing::info!(%key, %value, "Local cache entry");
        }
    }

    Ok(match report.outcome {
        RunOutcome::Succeeded => ExitCode::SUCCESS,
        RunOutcome::PartialFailure | RunOutcome::Failed => ExitCode::FAILURE,
    })
}

fn local_resources(data_dir: &std::path::Path) -> (ResourceRegistry, Option<Arc<MemoryKvStore>>) {
    tracing::info!(data_dir = %data_dir.display(), "Using local resources");
    let cache = Arc::new(MemoryKvStore::new());
    let registry = ResourceRegistry::new()
        .with(
            ResourceName::from_static(names::COLD_STORE),
            ResourceHandle::cold_store(Arc::new(LocalObjectStore::new(data_dir))),
        )
        .with(
            ResourceName::from_static(names::FAST_STORE),
            ResourceHandle::fast_store(cache.clone()),
        );
    (registry, Some(cache))
}

async fn remote_resources(config: &Config) -> Result<ResourceRegistry> {
    let s3_config = config
        .resources
        .s3
        .as_ref()
        .context("[resources.s3] is required unless --local is given")?;
    let redis_config = config
        .resources
        .redis
        .as_ref()
        .context("[resources.redis] is required unless --local is given")?;

    let cold = S3ObjectStore::new(s3_config)
        .await
        .context("Failed to create S3 client")?;
    let fast = RedisKvStore::new(redis_config)
        .await
        .context("Failed to connect to Redis")?;

    Ok(ResourceRegistry::new()
        .with(
            ResourceName::from_static(names::COLD_STORE),
            ResourceHandle::cold_store(Arc::new(cold)),
        )
        .with(
            ResourceName::from_static(names::FAST_STORE),
            ResourceHandle::fast_store(Arc::new(fast)),
        ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_local_run() {
        let cli = Cli::try_parse_from([
            "stockflow",
            "--local",
            "--data-dir",
            "/tmp/stock",
            "--source-key",
            "prefix/stock.csv",
            "--log-format",
            "json",
        ])
        .unwrap();
        assert!(cli.local);
        assert_eq!(cli.data_dir, PathBuf::from("/tmp/stock"));
        assert_eq!(cli.source_key.as_deref(), Some("prefix/stock.csv"));
        assert_eq!(cli.log_format, Some(LogFormat::Json));
    }

    #[test]
    fn local_resources_provide_every_capability() {
        let (registry, cache) = local_resources(std::path::Path::new("data"));
        let cold = ResourceName::from_static(names::COLD_STORE);
        let fast = ResourceName::from_static(names::FAST_STORE);
        assert!(registry.provides(&cold, pipeline::Capability::ColdStoreRead));
        assert!(registry.provides(&cold, pipeline::Capability::ColdStoreWrite));
        assert!(registry.provides(&fast, pipeline::Capability::FastStoreWrite));
        assert!(cache.unwrap().is_empty());
    }

    #[tokio::test]
    async fn remote_resources_require_backend_sections() {
        let err = remote_resources(&Config::default()).await.unwrap_err();
        assert!(err.to_string().contains("[resources.s3]"));
    }
}
