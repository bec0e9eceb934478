//! Read-only query types for the ledger.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use replenish_alerts::{Alert, AlertStatus};
use replenish_core::{AlertId, CompanyId, ProductId};
use replenish_inventory::Priority;
use replenish_workflow::{Execution, ExecutionStatus};

/// Pagination parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pagination {
    pub limit: u32,
    pub offset: u32,
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            limit: 50,
            offset: 0,
        }
    }
}

impl Pagination {
    pub fn new(limit: Option<u32>, offset: Option<u32>) -> Self {
        Self {
            limit: limit.unwrap_or(50).min(1000),
            offset: offset.unwrap_or(0),
        }
    }

    /// Slice an already ordered, already filtered list.
    pub fn apply<T>(&self, items: Vec<T>) -> Page<T> {
        let total = items.len() as u64;
        let items: Vec<T> = items
            .into_iter()
            .skip(self.offset as usize)
            .take(self.limit as usize)
            .collect();
        let has_more = u64::from(self.offset) + (items.len() as u64) < total;
        Page {
            items,
            total,
            pagination: *self,
            has_more,
        }
    }
}

/// A page of results.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    /// Matches across all pages.
    pub total: u64,
    pub pagination: Pagination,
    pub has_more: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertFilter {
    pub company_id: Option<CompanyId>,
    pub product_id: Option<ProductId>,
    pub priority: Option<Priority>,
    pub status: Option<AlertStatus>,
    pub detected_after: Option<DateTime<Utc>>,
    pub detected_before: Option<DateTime<Utc>>,
}

impl AlertFilter {
    pub fn matches(&self, alert: &Alert) -> bool {
        self.company_id.is_none_or(|c| c == alert.company_id)
            && self.product_id.is_none_or(|p| p == alert.product_id)
            && self.priority.is_none_or(|p| p == alert.priority)
            && self.status.is_none_or(|s| s == alert.status)
            && self.detected_after.is_none_or(|t| alert.detected_at >= t)
            && self.detected_before.is_none_or(|t| alert.detected_at < t)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionFilter {
    pub alert_id: Option<AlertId>,
    /// Company of the Execution's Alert.
    pub company_id: Option<CompanyId>,
    pub status: Option<ExecutionStatus>,
    pub started_after: Option<DateTime<Utc>>,
    pub started_before: Option<DateTime<Utc>>,
}

impl ExecutionFilter {
    /// `alert_company` is the company of the Execution's Alert, if known.
    pub fn matches(&self, execution: &Execution, alert_company: Option<CompanyId>) -> bool {
        self.alert_id.is_none_or(|a| a == execution.alert_id)
            && self.company_id.is_none_or(|c| alert_company == Some(c))
            && self.status.is_none_or(|s| s == execution.status)
            && self.started_after.is_none_or(|t| execution.started_at >= t)
            && self.started_before.is_none_or(|t| execution.started_at < t)
    }
}

/// Engine health snapshot.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EngineStatus {
    pub total_alerts: u64,
    pub active_alerts: u64,
    pub alerts_by_status: BTreeMap<String, u64>,
    pub total_executions: u64,
    pub running_executions: u64,
    pub completed_executions: u64,
    pub partial_success_executions: u64,
    pub failed_executions: u64,
    /// `completed / finished`; `None` before any Execution finished.
    pub success_rate: Option<f64>,
    pub last_activity: Option<DateTime<Utc>>,
}

impl EngineStatus {
    pub fn record_alert(&mut self, alert: &Alert) {
        self.total_alerts += 1;
        if alert.is_active() {
            self.active_alerts += 1;
        }
        *self
            .alerts_by_status
            .entry(alert.status.as_str().to_string())
            .or_insert(0) += 1;
        self.touch(Some(alert.detected_at));
        self.touch(alert.resolved_at);
    }

    pub fn record_execution(&mut self, execution: &Execution) {
        self.total_executions += 1;
        match execution.status {
            ExecutionStatus::Running => self.running_executions += 1,
            ExecutionStatus::Completed => self.completed_executions += 1,
            ExecutionStatus::PartialSuccess => self.partial_success_executions += 1,
            ExecutionStatus::Failed => self.failed_executions += 1,
        }
        self.touch(Some(execution.started_at));
        self.touch(execution.completed_at);
    }

    /// Compute derived fields once every record has been added.
    pub fn finalize(mut self) -> Self {
        let finished =
            self.completed_executions + self.partial_success_executions + self.failed_executions;
        self.success_rate = if finished == 0 {
            None
        } else {
            Some(self.completed_executions as f64 / finished as f64)
        };
        self
    }

    pub fn touch(&mut self, at: Option<DateTime<Utc>>) {
        if let Some(at) = at {
            self.last_activity = Some(self.last_activity.map_or(at, |cur| cur.max(at)));
        }
    }
}
