//! Execution Ledger: the append-only audit trail of Alerts, Executions and
//! WorkflowSteps.
//!
//! - [`Ledger`] owns writes and point lookups. Alert creation is an atomic
//!   check-and-create per `(company_id, product_id)`, and each Alert owns at
//!   most one Execution.
//! - [`LedgerQuery`] is the read-only, paginated query surface.
//!
//! Nothing is ever deleted; Alerts and Executions only move forward through
//! their state machines.

pub mod in_memory;
pub mod postgres;
pub mod query;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use replenish_alerts::{Alert, AlertError};
use replenish_core::{AlertId, CompanyId, ExecutionId, ProductId};
use replenish_workflow::{
    Execution, ExecutionError, ExecutionStatus, ExecutionSummary, WorkflowStep,
};

pub use in_memory::InMemoryLedger;
pub use postgres::PostgresLedger;
pub use query::{AlertFilter, EngineStatus, ExecutionFilter, Page, Pagination};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LedgerError {
    #[error("an active alert already exists for this product: {existing}")]
    ActiveAlertExists { existing: AlertId },

    #[error("alert {alert_id} already has execution {existing}")]
    ExecutionExists {
        alert_id: AlertId,
        existing: ExecutionId,
    },

    #[error("alert not found: {0}")]
    AlertNotFound(AlertId),

    #[error("execution not found: {0}")]
    ExecutionNotFound(ExecutionId),

    #[error(transparent)]
    Transition(#[from] AlertError),

    #[error(transparent)]
    Execution(#[from] ExecutionError),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("storage backend error: {0}")]
    Backend(String),
}

/// State change applied to a stored Alert under the store's lock/transaction.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum AlertTransition {
    StartAnalysis,
    Ignore,
    Resolve { at: DateTime<Utc> },
}

impl AlertTransition {
    pub fn apply(self, alert: &mut Alert) -> Result<(), AlertError> {
        match self {
            AlertTransition::StartAnalysis => alert.start_analysis(),
            AlertTransition::Ignore => alert.ignore(),
            AlertTransition::Resolve { at } => alert.resolve(at),
        }
    }
}

#[async_trait]
pub trait Ledger: Send + Sync {
    /// Persist a new Alert unless the product already has a non-resolved one.
    async fn create_alert(&self, alert: Alert) -> Result<Alert, LedgerError>;

    async fn get_alert(&self, alert_id: AlertId) -> Result<Option<Alert>, LedgerError>;

    async fn active_alert(
        &self,
        company_id: CompanyId,
        product_id: ProductId,
    ) -> Result<Option<Alert>, LedgerError>;

    /// Apply a state transition atomically and return the updated Alert.
    async fn transition_alert(
        &self,
        alert_id: AlertId,
        transition: AlertTransition,
    ) -> Result<Alert, LedgerError>;

    /// Persist a new running Execution; fails if the Alert already has one.
    async fn create_execution(&self, execution: Execution) -> Result<Execution, LedgerError>;

    /// Insert a step or advance a non-terminal one.
    async fn record_step(
        &self,
        execution_id: ExecutionId,
        step: WorkflowStep,
    ) -> Result<(), LedgerError>;

    async fn finish_execution(
        &self,
        execution_id: ExecutionId,
        status: ExecutionStatus,
        summary: ExecutionSummary,
        at: DateTime<Utc>,
    ) -> Result<Execution, LedgerError>;

    async fn get_execution(
        &self,
        execution_id: ExecutionId,
    ) -> Result<Option<Execution>, LedgerError>;

    async fn execution_for_alert(
        &self,
        alert_id: AlertId,
    ) -> Result<Option<Execution>, LedgerError>;
}

#[async_trait]
pub trait LedgerQuery: Send + Sync {
    /// Newest first.
    async fn list_alerts(
        &self,
        filter: AlertFilter,
        pagination: Pagination,
    ) -> Result<Page<Alert>, LedgerError>;

    /// Newest first, steps nested and ordered by step number.
    async fn list_executions(
        &self,
        filter: ExecutionFilter,
        pagination: Pagination,
    ) -> Result<Page<Execution>, LedgerError>;

    async fn engine_status(&self) -> Result<EngineStatus, LedgerError>;
}

/// A complete ledger backend (writes + queries), usable as a trait object.
pub trait LedgerBackend: Ledger + LedgerQuery {}

impl<T> LedgerBackend for T where T: Ledger + LedgerQuery {}
