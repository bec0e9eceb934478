use chrono::{DateTime, Utc};
use serde::Deserialize;

use replenish_alerts::AlertStatus;
use replenish_core::{AlertId, CompanyId, ProductId};
use replenish_infra::{AlertFilter, ExecutionFilter, Pagination};
use replenish_inventory::{Priority, StockObservation};
use replenish_workflow::ExecutionStatus;

// -------------------------
// Request DTOs
// -------------------------

/// A stock reading pushed by the inventory system.
#[derive(Debug, Deserialize)]
pub struct ObservationRequest {
    pub company_id: CompanyId,
    pub product_id: ProductId,
    pub available_quantity: i64,
    #[serde(default)]
    pub pending_replenishment: i64,
    pub observed_at: Option<DateTime<Utc>>,
}

impl ObservationRequest {
    /// Quantities are stock counts and must not be negative.
    pub fn validate(&self) -> Result<(), String> {
        if self.available_quantity < 0 {
            return Err(format!(
                "available_quantity must be >= 0, got {}",
                self.available_quantity
            ));
        }
        if self.pending_replenishment < 0 {
            return Err(format!(
                "pending_replenishment must be >= 0, got {}",
                self.pending_replenishment
            ));
        }
        Ok(())
    }

    pub fn into_observation(self) -> StockObservation {
        StockObservation {
            product_id: self.product_id,
            company_id: self.company_id,
            available_quantity: self.available_quantity,
            pending_replenishment: self.pending_replenishment,
            observed_at: self.observed_at.unwrap_or_else(Utc::now),
        }
    }
}

// -------------------------
// Query DTOs
// -------------------------

#[derive(Debug, Default, Deserialize)]
pub struct AlertQuery {
    pub company_id: Option<CompanyId>,
    pub product_id: Option<ProductId>,
    pub priority: Option<Priority>,
    pub status: Option<AlertStatus>,
    pub detected_after: Option<DateTime<Utc>>,
    pub detected_before: Option<DateTime<Utc>>,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

impl AlertQuery {
    pub fn into_parts(self) -> (AlertFilter, Pagination) {
        (
            AlertFilter {
                company_id: self.company_id,
                product_id: self.product_id,
                priority: self.priority,
                status: self.status,
                detected_after: self.detected_after,
                detected_before: self.detected_before,
            },
            Pagination::new(self.limit, self.offset),
        )
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct ExecutionQuery {
    pub alert_id: Option<AlertId>,
    pub company_id: Option<CompanyId>,
    pub status: Option<ExecutionStatus>,
    pub started_after: Option<DateTime<Utc>>,
    pub started_before: Option<DateTime<Utc>>,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

impl ExecutionQuery {
    pub fn into_parts(self) -> (ExecutionFilter, Pagination) {
        (
            ExecutionFilter {
                alert_id: self.alert_id,
                company_id: self.company_id,
                status: self.status,
                started_after: self.started_after,
                started_before: self.started_before,
            },
            Pagination::new(self.limit, self.offset),
        )
    }
}
