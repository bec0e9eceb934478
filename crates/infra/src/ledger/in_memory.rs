use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use replenish_alerts::Alert;
use replenish_core::{AlertId, CompanyId, ExecutionId, ProductId};
use replenish_workflow::{Execution, ExecutionStatus, ExecutionSummary, WorkflowStep};

use super::query::{AlertFilter, EngineStatus, ExecutionFilter, Page, Pagination};
use super::{AlertTransition, Ledger, LedgerError, LedgerQuery};

#[derive(Debug, Default)]
struct State {
    alerts: HashMap<AlertId, Alert>,
    /// Non-resolved Alert per product.
    active: HashMap<(CompanyId, ProductId), AlertId>,
    executions: HashMap<ExecutionId, Execution>,
    by_alert: HashMap<AlertId, ExecutionId>,
}

/// In-memory ledger for tests/dev.
///
/// A single lock guards all maps, which makes the dedup check-and-create and
/// the one-execution-per-alert rule atomic.
#[derive(Debug, Default)]
pub struct InMemoryLedger {
    inner: Mutex<State>,
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, State>, LedgerError> {
        self.inner
            .lock()
            .map_err(|_| LedgerError::Backend("ledger lock poisoned".to_string()))
    }
}

#[async_trait]
impl Ledger for InMemoryLedger {
    async fn create_alert(&self, alert: Alert) -> Result<Alert, LedgerError> {
        let mut state = self.lock()?;
        let key = (alert.company_id, alert.product_id);
        if let Some(existing) = state.active.get(&key) {
            return Err(LedgerError::ActiveAlertExists {
                existing: *existing,
            });
        }
        if alert.is_active() {
            state.active.insert(key, alert.id);
        }
        state.alerts.insert(alert.id, alert.clone());
        Ok(alert)
    }

    async fn get_alert(&self, alert_id: AlertId) -> Result<Option<Alert>, LedgerError> {
        Ok(self.lock()?.alerts.get(&alert_id).cloned())
    }

    async fn active_alert(
        &self,
        company_id: CompanyId,
        product_id: ProductId,
    ) -> Result<Option<Alert>, LedgerError> {
        let state = self.lock()?;
        Ok(state
            .active
            .get(&(company_id, product_id))
            .and_then(|id| state.alerts.get(id))
            .cloned())
    }

    async fn transition_alert(
        &self,
        alert_id: AlertId,
        transition: AlertTransition,
    ) -> Result<Alert, LedgerError> {
        let mut state = self.lock()?;
        let alert = state
            .alerts
            .get_mut(&alert_id)
            .ok_or(LedgerError::AlertNotFound(alert_id))?;
        transition.apply(alert)?;
        let updated = alert.clone();
        if !updated.is_active() {
            state
                .active
                .remove(&(updated.company_id, updated.product_id));
        }
        Ok(updated)
    }

    async fn create_execution(&self, execution: Execution) -> Result<Execution, LedgerError> {
        let mut state = self.lock()?;
        if !state.alerts.contains_key(&execution.alert_id) {
            return Err(LedgerError::AlertNotFound(execution.alert_id));
        }
        if let Some(existing) = state.by_alert.get(&execution.alert_id) {
            return Err(LedgerError::ExecutionExists {
                alert_id: execution.alert_id,
                existing: *existing,
            });
        }
        state.by_alert.insert(execution.alert_id, execution.id);
        state.executions.insert(execution.id, execution.clone());
        Ok(execution)
    }

    async fn record_step(
        &self,
        execution_id: ExecutionId,
        step: WorkflowStep,
    ) -> Result<(), LedgerError> {
        let mut state = self.lock()?;
        let execution = state
            .executions
            .get_mut(&execution_id)
            .ok_or(LedgerError::ExecutionNotFound(execution_id))?;
        execution.record_step(step)?;
        Ok(())
    }

    async fn finish_execution(
        &self,
        execution_id: ExecutionId,
        status: ExecutionStatus,
        summary: ExecutionSummary,
        at: DateTime<Utc>,
    ) -> Result<Execution, LedgerError> {
        let mut state = self.lock()?;
        let execution = state
            .executions
            .get_mut(&execution_id)
            .ok_or(LedgerError::ExecutionNotFound(execution_id))?;
        execution.finish(status, summary, at)?;
        Ok(execution.clone())
    }

    async fn get_execution(
        &self,
        execution_id: ExecutionId,
    ) -> Result<Option<Execution>, LedgerError> {
        Ok(self.lock()?.executions.get(&execution_id).cloned())
    }

    async fn execution_for_alert(
        &self,
        alert_id: AlertId,
    ) -> Result<Option<Execution>, LedgerError> {
        let state = self.lock()?;
        Ok(state
            .by_alert
            .get(&alert_id)
            .and_then(|id| state.executions.get(id))
            .cloned())
    }
}

#[async_trait]
impl LedgerQuery for InMemoryLedger {
    async fn list_alerts(
        &self,
        filter: AlertFilter,
        pagination: Pagination,
    ) -> Result<Page<Alert>, LedgerError> {
        let state = self.lock()?;
        let mut alerts: Vec<Alert> = state
            .alerts
            .values()
            .filter(|a| filter.matches(a))
            .cloned()
            .collect();
        alerts.sort_by(|a, b| b.detected_at.cmp(&a.detected_at).then(b.id.cmp(&a.id)));
        Ok(pagination.apply(alerts))
    }

    async fn list_executions(
        &self,
        filter: ExecutionFilter,
        pagination: Pagination,
    ) -> Result<Page<Execution>, LedgerError> {
        let state = self.lock()?;
        let mut executions: Vec<Execution> = state
            .executions
            .values()
            .filter(|e| {
                let company = state.alerts.get(&e.alert_id).map(|a| a.company_id);
                filter.matches(e, company)
            })
            .cloned()
            .collect();
        executions.sort_by(|a, b| b.started_at.cmp(&a.started_at).then(b.id.cmp(&a.id)));
        Ok(pagination.apply(executions))
    }

    async fn engine_status(&self) -> Result<EngineStatus, LedgerError> {
        let state = self.lock()?;
        let mut status = EngineStatus::default();
        for alert in state.alerts.values() {
            status.record_alert(alert);
        }
        for execution in state.executions.values() {
            status.record_execution(execution);
        }
        Ok(status.finalize())
    }
}
