//! The orchestrator: validates a step graph once, then executes it.
//!
//! Execution proceeds level by level (see [`PipelineGraph::levels`]). Steps in
//! the same level are independent and run concurrently on the current task.
//! A step whose upstream did not succeed is skipped, and so, transitively, is
//! everything below it. Sibling branches are never cancelled.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tracing::Instrument;

use pipeline::{
    classify_outcome, PipelineError, PipelineGraph, PipelineName, PipelineRunId, ResourceHandle,
    ResourceName, ResourceRegistry, RetryPolicy, RunReport, StepConfig, StepConfigs, StepName,
    StepReport, StepState,
};

use crate::step::{Step, StepContext, StepOutput};

// ---------------------------------------------------------------------------
// Retry policy
// ---------------------------------------------------------------------------

/// How often the executor re-invokes a step that failed with a retryable
/// error. Steps never retry on their own.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StepRetryPolicy {
    /// Additional attempts after the first. `0` disables retries.
    pub max_retries: u32,
    /// Pause between attempts, unless the error specifies its own.
    #[serde(with = "millis", rename = "delay_ms")]
    pub delay: Duration,
}

mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

/// Collects steps, resources and configuration, and validates them together.
pub struct PipelineBuilder {
    name: PipelineName,
    steps: Vec<Arc<dyn Step>>,
    resources: ResourceRegistry,
    configs: StepConfigs,
    retry: StepRetryPolicy,
}

impl PipelineBuilder {
    pub fn new(name: PipelineName) -> Self {
        Self {
            name,
            steps: Vec::new(),
            resources: ResourceRegistry::new(),
            configs: StepConfigs::new(),
            retry: StepRetryPolicy::default(),
        }
    }

    pub fn step(mut self, step: impl Step + 'static) -> Self {
        self.steps.push(Arc::new(step));
        self
    }

    pub fn resource(mut self, name: ResourceName, handle: ResourceHandle) -> Self {
        self.resources.insert(name, handle);
        self
    }

    pub fn resources(mut self, resources: ResourceRegistry) -> Self {
        self.resources = resources;
        self
    }

    pub fn config(mut self, step: StepName, config: impl Into<StepConfig>) -> Self {
        self.configs.insert(step, config.into());
        self
    }

    pub fn configs(mut self, configs: StepConfigs) -> Self {
        self.configs.extend(configs);
        self
    }

    pub fn retry_policy(mut self, retry: StepRetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Validates the graph, resource bindings and every step's configuration.
    ///
    /// Nothing is executed; a pipeline that builds is fully wired.
    pub fn build(self) -> Result<PipelineExecutor, PipelineError> {
        let graph = PipelineGraph::new(
            self.steps
                .iter()
                .map(|step| step.descriptor().clone())
                .collect(),
        )?;

        for descriptor in graph.descriptors() {
            for requirement in &descriptor.resources {
                if !self
                    .resources
                    .provides(&requirement.resource, requirement.capability)
                {
                    return Err(PipelineError::MissingResource {
                        step: descriptor.name.clone(),
                        resource: requirement.resource.clone(),
                        capability: requirement.capability,
                    });
                }
            }
        }

        if let Some(unknown) = self
            .configs
            .keys()
            .find(|name| graph.descriptor(name).is_none())
        {
            return Err(PipelineError::Configuration {
                step: unknown.clone(),
                message: "no step with this name in the pipeline".into(),
            });
        }

        let mut configs = self.configs;
        let mut steps = HashMap::with_capacity(self.steps.len());
        for step in self.steps {
            let name = step.descriptor().name.clone();
            let config = configs.entry(name.clone()).or_default();
            step.validate_config(config)?;
            steps.insert(name, step);
        }

        tracing::debug!(
            pipeline = %self.name,
            steps = steps.len(),
            levels = graph.levels().len(),
            "pipeline built"
        );

        Ok(PipelineExecutor {
            name: self.name,
            graph,
            steps,
            resources: self.resources,
            configs,
            retry: self.retry,
        })
    }
}

// ---------------------------------------------------------------------------
// Executor
// ---------------------------------------------------------------------------

/// A validated pipeline, ready to run.
pub struct PipelineExecutor {
    name: PipelineName,
    graph: PipelineGraph,
    steps: HashMap<StepName, Arc<dyn Step>>,
    resources: ResourceRegistry,
    configs: StepConfigs,
    retry: StepRetryPolicy,
}

impl std::fmt::Debug for PipelineExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineExecutor")
            .field("name", &self.name)
            .field("graph", &self.graph)
            .field("resources", &self.resources)
            .field("configs", &self.configs)
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}

impl PipelineExecutor {
    pub fn builder(name: PipelineName) -> PipelineBuilder {
        PipelineBuilder::new(name)
    }

    pub fn name(&self) -> &PipelineName {
        &self.name
    }

    pub fn graph(&self) -> &PipelineGraph {
        &self.graph
    }

    /// Executes the graph once and reports the terminal state of every step.
    ///
    /// Step failures never escape as `Err`; they are recorded in the report.
    pub async fn run(&self) -> RunReport {
        let run_id = PipelineRunId::new_random();
        let span = tracing::info_span!("pipeline_run", pipeline = %self.name, %run_id);
        self.run_levels(run_id).instrument(span).await
    }

    async fn run_levels(&self, run_id: PipelineRunId) -> RunReport {
        tracing::info!("pipeline run started");

        let mut states: HashMap<StepName, StepState> = self
            .graph
            .descriptors()
            .iter()
            .map(|d| (d.name.clone(), StepState::Pending))
            .collect();
        let mut outputs: HashMap<StepName, StepOutput> = HashMap::new();
        let mut reports = Vec::with_capacity(states.len());

        for level in self.graph.levels() {
            let mut runnable = Vec::new();
            for name in level {
                let blocker = self.graph.descriptor(name).and_then(|descriptor| {
                    descriptor
                        .inputs
                        .iter()
                        .find(|input| !matches!(states.get(*input), Some(StepState::Succeeded)))
                });
                match blocker {
                    Some(blocked_by) => {
                        tracing::warn!(step = %name, %blocked_by, "skipping step: upstream did not succeed");
                        let state = StepState::Skipped {
                            blocked_by: blocked_by.clone(),
                        };
                        states.insert(name.clone(), state.clone());
                        reports.push(StepReport {
                            step: name.clone(),
                            state,
                            attempts: 0,
                            elapsed: Duration::ZERO,
                        });
                    }
                    None => runnable.push(name),
                }
            }

            for name in &runnable {
                states.insert((*name).clone(), StepState::Running);
            }

            let results = join_all(
                runnable
                    .iter()
                    .map(|name| self.run_step(run_id, name, &outputs)),
            )
            .await;

            for (report, output) in results {
                if let Some(output) = output {
                    outputs.insert(report.step.clone(), output);
                }
                states.insert(report.step.clone(), report.state.clone());
                reports.push(report);
            }
        }

        let terminal: Vec<&StepState> = self
            .graph
            .descriptors()
            .iter()
            .filter(|d| self.graph.is_terminal(&d.name))
            .filter_map(|d| states.get(&d.name))
            .collect();
        let any_unsuccessful = reports
            .iter()
            .any(|r| !matches!(r.state, StepState::Succeeded));
        let outcome = classify_outcome(terminal, any_unsuccessful);

        tracing::info!(?outcome, "pipeline run finished");

        RunReport {
            pipeline: self.name.clone(),
            run_id,
            outcome,
            steps: reports,
        }
    }

    async fn run_step(
        &self,
        run_id: PipelineRunId,
        name: &StepName,
        outputs: &HashMap<StepName, StepOutput>,
    ) -> (StepReport, Option<StepOutput>) {
        let span = tracing::info_span!("step", step = %name);
        async {
            let started = Instant::now();
            let mut attempts = 0;
            let result = loop {
                attempts += 1;
                let result = self.attempt(run_id, name, outputs).await;
                let err = match result {
                    Ok(output) => break Ok(output),
                    Err(err) => err,
                };
                let delay = match err.retry_policy() {
                    RetryPolicy::Retryable { after } if attempts <= self.retry.max_retries => {
                        after.unwrap_or(self.retry.delay)
                    }
                    _ => break Err(err),
                };
                tracing::warn!(attempt = attempts, error = %err, ?delay, "step failed; retrying");
                tokio::time::sleep(delay).await;
            };

            let elapsed = started.elapsed();
            let (state, output) = match result {
                Ok(output) => {
                    tracing::info!(attempts, elapsed_ms = elapsed.as_millis() as u64, "step succeeded");
                    (StepState::Succeeded, Some(output))
                }
                Err(error) => {
                    tracing::error!(attempts, %error, "step failed");
                    (StepState::Failed { error }, None)
                }
            };

            (
                StepReport {
                    step: name.clone(),
                    state,
                    attempts,
                    elapsed,
                },
                output,
            )
        }
        .instrument(span)
        .await
    }

    async fn attempt(
        &self,
        run_id: PipelineRunId,
        name: &StepName,
        outputs: &HashMap<StepName, StepOutput>,
    ) -> Result<StepOutput, PipelineError> {
        let (Some(step), Some(config)) = (self.steps.get(name), self.configs.get(name)) else {
            return Err(PipelineError::Configuration {
                step: name.clone(),
                message: "step is not registered with this executor".into(),
            });
        };
        let ctx = StepContext::new(run_id, step.descriptor(), outputs, &self.resources, config);
        step.execute(ctx).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    use async_trait::async_trait;
    use parking_lot::Mutex;
    use pipeline::{Capability, ResourceError, RunOutcome, StepDescriptor};
    use serde_json::json;

    fn name(value: &'static str) -> StepName {
        StepName::from_static(value)
    }

    /// A step that produces `Unit` or fails a fixed number of times first.
    struct Probe {
        descriptor: StepDescriptor,
        failures: u32,
        error: PipelineError,
        calls: Arc<AtomicU32>,
        runs: Arc<Mutex<Vec<PipelineRunId>>>,
    }

    impl Probe {
        fn ok(step: &'static str, inputs: &[&'static str]) -> Self {
            let mut descriptor = StepDescriptor::new(name(step));
            for input in inputs {
                descriptor = descriptor.with_input(name(input));
            }
            Self {
                descriptor,
                failures: 0,
                error: PipelineError::EmptyBatch,
                calls: Arc::new(AtomicU32::new(0)),
                runs: Arc::default(),
            }
        }

        fn failing(mut self, failures: u32, error: PipelineError) -> Self {
            self.failures = failures;
            self.error = error;
            self
        }
    }

    #[async_trait]
    impl Step for Probe {
        fn descriptor(&self) -> &StepDescriptor {
            &self.descriptor
        }

        async fn execute(&self, ctx: StepContext<'_>) -> Result<StepOutput, PipelineError> {
            self.runs.lock().push(ctx.run_id());
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.failures {
                Err(self.error.clone())
            } else {
                Ok(StepOutput::Unit)
            }
        }
    }

    fn backend_down() -> PipelineError {
        PipelineError::resource(
            &ResourceName::from_static("redis"),
            ResourceError::Backend("connection refused".into()),
        )
    }

    fn pipeline() -> PipelineName {
        PipelineName::from_static("test")
    }

    #[tokio::test]
    async fn runs_every_step_once_in_dependency_order() {
        let a = Probe::ok("a", &[]);
        let b = Probe::ok("b", &["a"]);
        let (a_calls, b_calls) = (a.calls.clone(), b.calls.clone());

        let executor = PipelineExecutor::builder(pipeline())
            .step(b)
            .step(a)
            .build()
            .unwrap();
        let report = executor.run().await;

        assert_eq!(report.outcome, RunOutcome::Succeeded);
        assert_eq!(a_calls.load(Ordering::SeqCst), 1);
        assert_eq!(b_calls.load(Ordering::SeqCst), 1);
        let order: Vec<&str> = report.steps.iter().map(|r| r.step.as_str()).collect();
        assert_eq!(order, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn steps_see_the_run_id_of_their_run() {
        let a = Probe::ok("a", &[]);
        let b = Probe::ok("b", &["a"]);
        let (a_runs, b_runs) = (a.runs.clone(), b.runs.clone());

        let executor = PipelineExecutor::builder(pipeline())
            .step(a)
            .step(b)
            .build()
            .unwrap();
        let first = executor.run().await;
        let second = executor.run().await;

        assert_ne!(first.run_id, second.run_id);
        assert_eq!(*a_runs.lock(), vec![first.run_id, second.run_id]);
        assert_eq!(*b_runs.lock(), vec![first.run_id, second.run_id]);
    }

    #[tokio::test]
    async fn failure_skips_transitive_dependents() {
        let executor = PipelineExecutor::builder(pipeline())
            .step(Probe::ok("a", &[]).failing(1, PipelineError::EmptyBatch))
            .step(Probe::ok("b", &["a"]))
            .step(Probe::ok("c", &["b"]))
            .build()
            .unwrap();
        let report = executor.run().await;

        assert_eq!(report.outcome, RunOutcome::Failed);
        assert_eq!(report.first_error(), Some(&PipelineError::EmptyBatch));
        assert_eq!(
            report.step("b").unwrap().state,
            StepState::Skipped { blocked_by: name("a") }
        );
        assert_eq!(
            report.step("c").unwrap().state,
            StepState::Skipped { blocked_by: name("b") }
        );
        assert_eq!(report.step("c").unwrap().attempts, 0);
    }

    #[tokio::test]
    async fn one_failing_branch_is_a_partial_failure() {
        let executor = PipelineExecutor::builder(pipeline())
            .step(Probe::ok("root", &[]))
            .step(Probe::ok("left", &["root"]))
            .step(Probe::ok("right", &["root"]).failing(1, backend_down()))
            .build()
            .unwrap();
        let report = executor.run().await;

        assert_eq!(report.outcome, RunOutcome::PartialFailure);
        assert_eq!(report.step("left").unwrap().state, StepState::Succeeded);
        assert!(matches!(
            report.step("right").unwrap().state,
            StepState::Failed { .. }
        ));
    }

    #[tokio::test]
    async fn retryable_errors_are_retried_up_to_the_limit() {
        let flaky = Probe::ok("flaky", &[]).failing(2, backend_down());
        let calls = flaky.calls.clone();
        let executor = PipelineExecutor::builder(pipeline())
            .step(flaky)
            .retry_policy(StepRetryPolicy {
                max_retries: 2,
                delay: Duration::ZERO,
            })
            .build()
            .unwrap();
        let report = executor.run().await;

        assert_eq!(report.outcome, RunOutcome::Succeeded);
        assert_eq!(report.step("flaky").unwrap().attempts, 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn non_retryable_errors_fail_on_first_attempt() {
        let executor = PipelineExecutor::builder(pipeline())
            .step(Probe::ok("a", &[]).failing(5, PipelineError::EmptyBatch))
            .retry_policy(StepRetryPolicy {
                max_retries: 3,
                delay: Duration::ZERO,
            })
            .build()
            .unwrap();
        let report = executor.run().await;

        assert_eq!(report.step("a").unwrap().attempts, 1);
        assert_eq!(report.outcome, RunOutcome::Failed);
    }

    #[tokio::test]
    async fn no_retries_by_default() {
        let executor = PipelineExecutor::builder(pipeline())
            .step(Probe::ok("a", &[]).failing(1, backend_down()))
            .build()
            .unwrap();
        let report = executor.run().await;
        assert_eq!(report.step("a").unwrap().attempts, 1);
    }

    #[test]
    fn missing_resources_fail_the_build() {
        let mut probe = Probe::ok("ingest", &[]);
        probe.descriptor = probe
            .descriptor
            .with_resource(ResourceName::from_static("s3"), Capability::ColdStoreRead);
        let err = PipelineExecutor::builder(pipeline())
            .step(probe)
            .build()
            .unwrap_err();
        assert_eq!(
            err,
            PipelineError::MissingResource {
                step: name("ingest"),
                resource: ResourceName::from_static("s3"),
                capability: Capability::ColdStoreRead,
            }
        );
    }

    #[test]
    fn configuration_for_unknown_steps_fails_the_build() {
        let err = PipelineExecutor::builder(pipeline())
            .step(Probe::ok("a", &[]))
            .config(name("typo"), json!({ "source_key": "x" }))
            .build()
            .unwrap_err();
        assert!(matches!(err, PipelineError::Configuration { step, .. } if step == name("typo")));
    }

    #[test]
    fn graph_errors_fail_the_build() {
        let err = PipelineExecutor::builder(pipeline())
            .step(Probe::ok("a", &["missing"]))
            .build()
            .unwrap_err();
        assert!(matches!(err, PipelineError::UnknownDependency { .. }));
    }

    #[test]
    fn retry_policy_reads_delay_in_milliseconds() {
        let policy: StepRetryPolicy =
            serde_json::from_value(json!({ "max_retries": 10, "delay_ms": 1000 })).unwrap();
        assert_eq!(policy.max_retries, 10);
        assert_eq!(policy.delay, Duration::from_secs(1));
    }
}
