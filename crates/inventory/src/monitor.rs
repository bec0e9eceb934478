use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use replenish_core::{CompanyId, ProductId};

use crate::priority::{Priority, classify};
use crate::threshold::ThresholdConfig;

/// A stock-level reading for one product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockObservation {
    pub product_id: ProductId,
    pub company_id: CompanyId,
    pub available_quantity: i64,
    /// Quantity already on order and not yet received.
    #[serde(default)]
    pub pending_replenishment: i64,
    pub observed_at: DateTime<Utc>,
}

impl StockObservation {
    pub fn new(product_id: ProductId, company_id: CompanyId, available_quantity: i64) -> Self {
        Self {
            product_id,
            company_id,
            available_quantity,
            pending_replenishment: 0,
            observed_at: Utc::now(),
        }
    }

    pub fn with_pending(mut self, pending_replenishment: i64) -> Self {
        self.pending_replenishment = pending_replenishment;
        self
    }

    pub fn at(mut self, observed_at: DateTime<Utc>) -> Self {
        self.observed_at = observed_at;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BreachSignal {
    pub product_id: ProductId,
    pub company_id: CompanyId,
    pub available_quantity: i64,
    pub threshold: i64,
    pub priority: Priority,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecoverySignal {
    pub product_id: ProductId,
    pub company_id: CompanyId,
    pub available_quantity: i64,
    pub threshold: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MonitorSignal {
    Breach(BreachSignal),
    Recovery(RecoverySignal),
}

/// Evaluate one observation.
///
/// `active_alert_threshold` is the threshold recorded on the product's
/// non-resolved Alert, if there is one. A breach is only signalled when there
/// is no such Alert; a recovery only when there is one and the quantity has
/// risen above its threshold.
pub fn evaluate(
    observation: &StockObservation,
    config: &ThresholdConfig,
    active_alert_threshold: Option<i64>,
) -> Option<MonitorSignal> {
    match active_alert_threshold {
        Some(threshold) if observation.available_quantity > threshold => {
            Some(MonitorSignal::Recovery(RecoverySignal {
                product_id: observation.product_id,
                company_id: observation.company_id,
                available_quantity: observation.available_quantity,
                threshold,
            }))
        }
        Some(_) => None,
        None => {
            let priority = classify(
                observation.available_quantity,
                observation.pending_replenishment,
                config,
            )?;
            Some(MonitorSignal::Breach(BreachSignal {
                product_id: observation.product_id,
                company_id: observation.company_id,
                available_quantity: observation.available_quantity,
                threshold: config.alert_level(),
                priority,
            }))
        }
    }
}

/// Worst shortage first; ties broken by company then product for a stable order.
pub fn order_by_urgency(observations: &mut [StockObservation]) {
    observations.sort_by(|a, b| {
        a.available_quantity
            .cmp(&b.available_quantity)
            .then_with(|| a.company_id.cmp(&b.company_id))
            .then_with(|| a.product_id.cmp(&b.product_id))
    });
}
