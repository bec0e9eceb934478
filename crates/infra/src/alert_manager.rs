//! Alert Manager: owns the Alert lifecycle on top of the ledger.
//!
//! Deduplication is delegated to [`Ledger::create_alert`], which performs the
//! check-and-create atomically per product; this type only shapes the result.

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, instrument};

use replenish_alerts::{Alert, AlertError, AlertStatus};
use replenish_core::{AlertId, CompanyId, ProductId};
use replenish_inventory::BreachSignal;

use crate::error::EngineError;
use crate::ledger::{AlertTransition, LedgerBackend, LedgerError};

#[derive(Clone)]
pub struct AlertManager {
    ledger: Arc<dyn LedgerBackend>,
}

impl AlertManager {
    pub fn new(ledger: Arc<dyn LedgerBackend>) -> Self {
        Self { ledger }
    }

    /// Create a `detected` Alert for a breach.
    ///
    /// Returns [`EngineError::DuplicateAlert`] when the product already has a
    /// non-resolved Alert. That outcome is expected under concurrent
    /// observations and is logged at debug level only.
    #[instrument(skip(self, signal), fields(product_id = %signal.product_id, company_id = %signal.company_id))]
    pub async fn on_breach(&self, signal: &BreachSignal) -> Result<Alert, EngineError> {
        let alert = Alert::from_breach(AlertId::new(), signal, Utc::now());
        match self.ledger.create_alert(alert).await {
            Ok(alert) => {
                info!(
                    alert_id = %alert.id,
                    priority = %alert.priority,
                    current_inventory = alert.current_inventory,
                    threshold = alert.threshold,
                    "alert detected"
                );
                Ok(alert)
            }
            Err(LedgerError::ActiveAlertExists { existing }) => {
                debug!(existing = %existing, "breach ignored: product already has an active alert");
                Err(EngineError::DuplicateAlert { existing })
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Resolve the product's active Alert, if any. Idempotent.
    #[instrument(skip(self))]
    pub async fn on_recovery(
        &self,
        company_id: CompanyId,
        product_id: ProductId,
    ) -> Result<Option<Alert>, EngineError> {
        let Some(active) = self.ledger.active_alert(company_id, product_id).await? else {
            return Ok(None);
        };

        match self
            .ledger
            .transition_alert(active.id, AlertTransition::Resolve { at: Utc::now() })
            .await
        {
            Ok(alert) => {
                info!(alert_id = %alert.id, "alert resolved on recovery");
                Ok(Some(alert))
            }
            // Resolved concurrently by another observation.
            Err(LedgerError::Transition(AlertError::InvalidTransition {
                to: AlertStatus::Resolved,
                ..
            })) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// `detected -> analyzing`.
    pub async fn mark_analyzing(&self, alert_id: AlertId) -> Result<Alert, EngineError> {
        Ok(self
            .ledger
            .transition_alert(alert_id, AlertTransition::StartAnalysis)
            .await?)
    }

    /// Manual override `detected -> ignored`.
    #[instrument(skip(self))]
    pub async fn ignore(&self, alert_id: AlertId) -> Result<Alert, EngineError> {
        let alert = self
            .ledger
            .transition_alert(alert_id, AlertTransition::Ignore)
            .await?;
        info!(alert_id = %alert.id, "alert ignored by operator");
        Ok(alert)
    }

    pub async fn get(&self, alert_id: AlertId) -> Result<Alert, EngineError> {
        self.ledger
            .get_alert(alert_id)
            .await?
            .ok_or(EngineError::AlertNotFound(alert_id))
    }

    pub async fn active_alert(
        &self,
        company_id: CompanyId,
        product_id: ProductId,
    ) -> Result<Option<Alert>, EngineError> {
        Ok(self.ledger.active_alert(company_id, product_id).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::InMemoryLedger;
    use replenish_inventory::Priority;

    fn manager() -> AlertManager {
        AlertManager::new(Arc::new(InMemoryLedger::new()))
    }

    fn breach(company_id: CompanyId, product_id: ProductId) -> BreachSignal {
        BreachSignal {
            product_id,
            company_id,
            available_quantity: 8,
            threshold: 10,
            priority: Priority::Critical,
        }
    }

    #[tokio::test]
    async fn duplicate_breach_returns_existing_alert_id() {
        let manager = manager();
        let (c, p) = (CompanyId::new(), ProductId::new());
        let alert = manager.on_breach(&breach(c, p)).await.unwrap();
        assert_eq!(alert.status, AlertStatus::Detected);

        let err = manager.on_breach(&breach(c, p)).await.unwrap_err();
        assert_eq!(err, EngineError::DuplicateAlert { existing: alert.id });
    }

    #[tokio::test]
    async fn recovery_is_idempotent() {
        let manager = manager();
        let (c, p) = (CompanyId::new(), ProductId::new());
        let alert = manager.on_breach(&breach(c, p)).await.unwrap();

        let resolved = manager.on_recovery(c, p).await.unwrap().unwrap();
        assert_eq!(resolved.id, alert.id);
        assert_eq!(resolved.status, AlertStatus::Resolved);
        assert!(resolved.resolved_at.is_some());

        assert!(manager.on_recovery(c, p).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn mark_analyzing_only_from_detected() {
        let manager = manager();
        let (c, p) = (CompanyId::new(), ProductId::new());
        let alert = manager.on_breach(&breach(c, p)).await.unwrap();

        let analyzing = manager.mark_analyzing(alert.id).await.unwrap();
        assert_eq!(analyzing.status, AlertStatus::Analyzing);

        let err = manager.mark_analyzing(alert.id).await.unwrap_err();
        assert!(matches!(err, EngineError::InvalidTransition(_)));
    }

    #[tokio::test]
    async fn analyzing_alert_cannot_be_ignored() {
        let manager = manager();
        let alert = manager
            .on_breach(&breach(CompanyId::new(), ProductId::new()))
            .await
            .unwrap();
        manager.mark_analyzing(alert.id).await.unwrap();

        assert!(matches!(
            manager.ignore(alert.id).await,
            Err(EngineError::InvalidTransition(_))
        ));
    }

    #[tokio::test]
    async fn unknown_alert_is_not_found() {
        let id = AlertId::new();
        assert_eq!(manager().get(id).await.unwrap_err(), EngineError::AlertNotFound(id));
    }
}
