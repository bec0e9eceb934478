use core::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use thiserror::Error;

use replenish_core::{AlertId, DomainError, ExecutionId};

pub mod step_names {
    pub const ROOT_CAUSE_ANALYSIS: &str = "root_cause_analysis";
    pub const REPLENISHMENT_PLANNING: &str = "replenishment_planning";

    /// Name of a provider step: `<action>:<provider>`.
    pub fn provider(action: &str, provider: &str) -> String {
        format!("{action}:{provider}")
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Running,
    Completed,
    PartialSuccess,
    Failed,
}

impl ExecutionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionStatus::Running => "running",
            ExecutionStatus::Completed => "completed",
            ExecutionStatus::PartialSuccess => "partial_success",
            ExecutionStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, ExecutionStatus::Running)
    }
}

impl core::fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExecutionStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "running" => Ok(ExecutionStatus::Running),
            "completed" => Ok(ExecutionStatus::Completed),
            "partial_success" => Ok(ExecutionStatus::PartialSuccess),
            "failed" => Ok(ExecutionStatus::Failed),
            other => Err(DomainError::validation(format!(
                "unknown execution status: {other}"
            ))),
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl StepStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            StepStatus::Pending => "pending",
            StepStatus::Running => "running",
            StepStatus::Completed => "completed",
            StepStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, StepStatus::Completed | StepStatus::Failed)
    }
}

impl FromStr for StepStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(StepStatus::Pending),
            "running" => Ok(StepStatus::Running),
            "completed" => Ok(StepStatus::Completed),
            "failed" => Ok(StepStatus::Failed),
            other => Err(DomainError::validation(format!("unknown step status: {other}"))),
        }
    }
}

/// Class of the last error seen by a step.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorClass {
    Transient,
    Timeout,
    Permanent,
    /// Failure inside the engine itself (history read, planning).
    Internal,
}

/// Why a step gave up.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepErrorKind {
    /// Every allowed attempt failed with a retryable error.
    RetriesExhausted,
    /// The error could not be fixed by retrying.
    NonRetryable,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepError {
    pub kind: StepErrorKind,
    pub class: ErrorClass,
    pub attempts: u32,
    pub message: String,
}

/// One recorded stage (or provider sub-step) of an Execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowStep {
    pub step_number: u32,
    pub step_name: String,
    pub status: StepStatus,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub output: JsonValue,
    pub error: Option<StepError>,
    pub attempts: u32,
}

impl WorkflowStep {
    pub fn pending(step_number: u32, step_name: impl Into<String>) -> Self {
        Self {
            step_number,
            step_name: step_name.into(),
            status: StepStatus::Pending,
            started_at: None,
            completed_at: None,
            output: JsonValue::Null,
            error: None,
            attempts: 0,
        }
    }

    pub fn running(step_number: u32, step_name: impl Into<String>, at: DateTime<Utc>) -> Self {
        let mut step = Self::pending(step_number, step_name);
        step.status = StepStatus::Running;
        step.started_at = Some(at);
        step
    }

    pub fn complete(mut self, output: JsonValue, attempts: u32, at: DateTime<Utc>) -> Self {
        self.status = StepStatus::Completed;
        self.output = output;
        self.attempts = attempts;
        self.completed_at = Some(at);
        self
    }

    pub fn fail(mut self, error: StepError, at: DateTime<Utc>) -> Self {
        self.status = StepStatus::Failed;
        self.attempts = error.attempts;
        self.error = Some(error);
        self.completed_at = Some(at);
        self
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

/// Human-readable digest attached when an Execution finishes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecutionSummary {
    pub root_cause: Option<String>,
    pub confidence: Option<f64>,
    pub replenishment_quantity: Option<u64>,
    pub steps_completed: usize,
    pub steps_total: usize,
    pub successful_actions: Vec<String>,
    pub failure_reason: Option<String>,
}

impl ExecutionSummary {
    /// `"n/m"` steps completed.
    pub fn progress(&self) -> String {
        format!("{}/{}", self.steps_completed, self.steps_total)
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ExecutionError {
    #[error("execution {0} already finished")]
    AlreadyFinished(ExecutionId),

    #[error("execution {execution_id}: step {step_number} is terminal")]
    StepImmutable {
        execution_id: ExecutionId,
        step_number: u32,
    },

    #[error("execution {0} cannot finish as running")]
    NotATerminalStatus(ExecutionId),
}

/// One pipeline run for one Alert.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Execution {
    pub id: ExecutionId,
    pub alert_id: AlertId,
    pub status: ExecutionStatus,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    /// Ordered by `step_number`.
    pub steps: Vec<WorkflowStep>,
    pub summary: Option<ExecutionSummary>,
}

impl Execution {
    pub fn start(id: ExecutionId, alert_id: AlertId, started_at: DateTime<Utc>) -> Self {
        Self {
            id,
            alert_id,
            status: ExecutionStatus::Running,
            started_at,
            completed_at: None,
            steps: Vec::new(),
            summary: None,
        }
    }

    pub fn step(&self, step_number: u32) -> Option<&WorkflowStep> {
        self.steps.iter().find(|s| s.step_number == step_number)
    }

    /// Insert a step or advance a non-terminal one.
    pub fn record_step(&mut self, step: WorkflowStep) -> Result<(), ExecutionError> {
        if self.status.is_terminal() {
            return Err(ExecutionError::AlreadyFinished(self.id));
        }
        match self
            .steps
            .binary_search_by_key(&step.step_number, |s| s.step_number)
        {
            Ok(idx) => {
                if self.steps[idx].is_terminal() {
                    return Err(ExecutionError::StepImmutable {
                        execution_id: self.id,
                        step_number: step.step_number,
                    });
                }
                self.steps[idx] = step;
            }
            Err(idx) => self.steps.insert(idx, step),
        }
        Ok(())
    }

    pub fn finish(
        &mut self,
        status: ExecutionStatus,
        summary: ExecutionSummary,
        at: DateTime<Utc>,
    ) -> Result<(), ExecutionError> {
        if self.status.is_terminal() {
            return Err(ExecutionError::AlreadyFinished(self.id));
        }
        if !status.is_terminal() {
            return Err(ExecutionError::NotATerminalStatus(self.id));
        }
        self.status = status;
        self.summary = Some(summary);
        self.completed_at = Some(at);
        Ok(())
    }
}

/// Fan-in of the provider stage.
///
/// `completed` when every step completed (including when there are none),
/// `failed` when every step failed, `partial_success` otherwise.
pub fn aggregate_status<I>(outcomes: I) -> ExecutionStatus
where
    I: IntoIterator<Item = StepStatus>,
{
    let (mut ok, mut failed, mut total) = (0usize, 0usize, 0usize);
    for status in outcomes {
        total += 1;
        match status {
            StepStatus::Completed => ok += 1,
            StepStatus::Failed => failed += 1,
            StepStatus::Pending | StepStatus::Running => {}
        }
    }

    if ok == total {
        ExecutionStatus::Completed
    } else if failed == total {
        ExecutionStatus::Failed
    } else {
        ExecutionStatus::PartialSuccess
    }
}
