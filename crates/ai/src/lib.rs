//! `replenish-ai`
//!
//! **Responsibility:** analysis stages of the replenishment workflow.
//!
//! - The Diagnostic Engine scores likely root causes of a shortage from
//!   consumption history.
//! - The Solution Planner turns a diagnosis into a replenishment plan.
//!
//! Both are deterministic and side-effect free: they read an [`Alert`]
//! snapshot plus inputs supplied by callers and never mutate Alert state.
//!
//! [`Alert`]: replenish_alerts::Alert

pub mod diagnosis;
pub mod error;
pub mod history;
pub mod job;
pub mod planner;
pub mod scheduler;

pub use diagnosis::{
    DiagnosticConfig, DiagnosticJob, DiagnosticWeights, Diagnosis, RootCause, SupportingMetrics,
    diagnose,
};
pub use error::AiError;
pub use history::{ConsumptionHistory, ConsumptionRecord, PendingOrder};
pub use job::AiJob;
pub use planner::{
    ActionItem, ActionKind, PlannerConfig, PlanningJob, ReplenishmentPlan, ShippingMethod,
    SourceKind, SourcingSplit, plan,
};
pub use scheduler::{AiScheduler, CompanyScope, LocalAiScheduler};
