//! Workflow execution model.
//!
//! - [`Execution`] / [`WorkflowStep`]: the audit record of one pipeline run.
//! - [`aggregate_status`]: fan-in of the concurrent provider stage.
//! - [`RetryPolicy`]: bounded retry with backoff for transient provider errors.
//! - [`CapabilityProvider`]: the contract every external integration implements.

pub mod execution;
pub mod provider;
pub mod retry;

pub use execution::{
    ErrorClass, Execution, ExecutionError, ExecutionStatus, ExecutionSummary, StepError,
    StepErrorKind, StepStatus, WorkflowStep, aggregate_status, step_names,
};
pub use provider::{CapabilityAction, CapabilityProvider, ProviderError, ProviderResponse};
pub use retry::{BackoffStrategy, RetryPolicy};
