//! Step states and the per-run report.
//!
//! Every step ends a run in exactly one terminal state. The report enumerates
//! all of them so a partial failure (one sink written, the other not) is
//! distinguishable from a total failure.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{PipelineError, PipelineName, PipelineRunId, StepName};

/// Lifecycle state of one step within one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum StepState {
    /// Waiting for upstream steps.
    Pending,
    /// Currently executing.
    Running,
    /// Produced its output.
    Succeeded,
    /// Returned an error.
    Failed { error: PipelineError },
    /// Never ran because an upstream step did not succeed.
    Skipped { blocked_by: StepName },
}

impl StepState {
    /// Returns `true` for `Succeeded`, `Failed` and `Skipped`.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            StepState::Succeeded | StepState::Failed { .. } | StepState::Skipped { .. }
        )
    }
}

/// Terminal record of one step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepReport {
    pub step: StepName,
    #[serde(flatten)]
    pub state: StepState,
    /// Number of times the step was invoked (0 when skipped).
    pub attempts: u32,
    /// Wall-clock time spent across all attempts.
    pub elapsed: Duration,
}

/// Overall result of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunOutcome {
    /// Every step succeeded.
    Succeeded,
    /// At least one terminal step succeeded and at least one did not.
    PartialFailure,
    /// No terminal step succeeded.
    Failed,
}

/// Report of one pipeline execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    pub pipeline: PipelineName,
    pub run_id: PipelineRunId,
    pub outcome: RunOutcome,
    /// One entry per step, in execution order.
    pub steps: Vec<StepReport>,
}

impl RunReport {
    /// Looks up the report for `step`.
    pub fn step(&self, step: &str) -> Option<&StepReport> {
        self.steps.iter().find(|r| r.step.as_str() == step)
    }

    /// The error of the first step that failed, in execution order.
    pub fn first_error(&self) -> Option<&PipelineError> {
        self.steps.iter().find_map(|r| match &r.state {
            StepState::Failed { error } => Some(error),
            _ => None,
        })
    }

    /// Returns `true` if the outcome is [`RunOutcome::Succeeded`].
    pub fn is_success(&self) -> bool {
        self.outcome == RunOutcome::Succeeded
    }
}

/// Classifies a run from the terminal states of its terminal (leaf) steps and
/// whether any step at all failed or was skipped.
pub fn classify_outcome<'a>(
    terminal_states: impl IntoIterator<Item = &'a StepState>,
    any_unsuccessful: bool,
) -> RunOutcome {
    if !any_unsuccessful {
        return RunOutcome::Succeeded;
    }
    let any_terminal_succeeded = terminal_states
        .into_iter()
        .any(|s| matches!(s, StepState::Succeeded));
    if any_terminal_succeeded {
        RunOutcome::PartialFailure
    } else {
        RunOutcome::Failed
    }
}
