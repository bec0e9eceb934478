//! Engine facade: wires the Monitor, Alert Manager, Orchestrator and ledger
//! together and exposes the operations callers use.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, warn};

use replenish_alerts::{Alert, AlertError, AlertStatus};
use replenish_core::{AlertId, CompanyId, ExecutionId, ProductId};
use replenish_inventory::{
    BreachSignal, MonitorSignal, StockObservation, ThresholdConfig, evaluate, order_by_urgency,
};
use replenish_workflow::Execution;

use crate::alert_manager::AlertManager;
use crate::collaborators::{HistoryReader, InMemoryProductStore, ProductStore};
use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::ledger::{
    AlertFilter, EngineStatus, ExecutionFilter, InMemoryLedger, LedgerBackend, Page, Pagination,
};
use crate::monitor_runner::{MonitorHandle, MonitorRunner, PollReport, PollTarget};
use crate::orchestrator::{Orchestrator, OrchestratorSettings};
use crate::providers::ProviderRegistry;

struct EngineInner {
    config: EngineConfig,
    ledger: Arc<dyn LedgerBackend>,
    products: Arc<dyn ProductStore>,
    alerts: AlertManager,
    orchestrator: Orchestrator,
    workflows: Mutex<Vec<JoinHandle<()>>>,
}

/// The replenishment engine. Cheap to clone.
#[derive(Clone)]
pub struct ReplenishmentEngine {
    inner: Arc<EngineInner>,
}

impl ReplenishmentEngine {
    pub fn new(
        config: EngineConfig,
        ledger: Arc<dyn LedgerBackend>,
        products: Arc<dyn ProductStore>,
        history: Arc<dyn HistoryReader>,
        providers: ProviderRegistry,
    ) -> Self {
        let orchestrator = Orchestrator::new(
            Arc::clone(&ledger),
            history,
            providers,
            OrchestratorSettings::from(&config),
        )
        .with_products(Arc::clone(&products));
        Self {
            inner: Arc::new(EngineInner {
                config,
                alerts: AlertManager::new(Arc::clone(&ledger)),
                ledger,
                products,
                orchestrator,
                workflows: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Engine over an in-memory ledger and product store.
    ///
    /// The returned store is also the history reader; feed it observations
    /// with [`InMemoryProductStore::apply_observation`].
    pub fn in_memory(
        config: EngineConfig,
        providers: ProviderRegistry,
    ) -> (Self, Arc<InMemoryProductStore>) {
        let store = Arc::new(
            InMemoryProductStore::new().with_default_thresholds(config.default_thresholds.clone()),
        );
        let engine = Self::new(
            config,
            Arc::new(InMemoryLedger::new()),
            Arc::clone(&store) as Arc<dyn ProductStore>,
            Arc::clone(&store) as Arc<dyn HistoryReader>,
            providers,
        );
        (engine, store)
    }

    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }

    /// Hand an observation to a background task and return immediately.
    pub fn report_observation(
        &self,
        observation: StockObservation,
    ) -> JoinHandle<Result<Option<MonitorSignal>, EngineError>> {
        let engine = self.clone();
        tokio::spawn(async move {
            let result = engine.handle_observation(&observation).await;
            if let Err(e) = &result {
                warn!(
                    product_id = %observation.product_id,
                    company_id = %observation.company_id,
                    error = %e,
                    "observation not processed"
                );
            }
            result
        })
    }

    /// Evaluate one observation and act on the resulting signal.
    ///
    /// A breach creates an Alert and dispatches its workflow (unless the
    /// product requires approval); a recovery resolves the active Alert.
    /// Losing a dedup race returns `Ok(None)`.
    #[instrument(skip(self, observation), fields(product_id = %observation.product_id, company_id = %observation.company_id))]
    pub async fn handle_observation(
        &self,
        observation: &StockObservation,
    ) -> Result<Option<MonitorSignal>, EngineError> {
        let product = self
            .inner
            .products
            .get_product(observation.company_id, observation.product_id)
            .await?
            .ok_or(EngineError::UnknownProduct {
                company_id: observation.company_id,
                product_id: observation.product_id,
            })?;
        self.process(observation, &product.thresholds).await
    }

    async fn process(
        &self,
        observation: &StockObservation,
        thresholds: &ThresholdConfig,
    ) -> Result<Option<MonitorSignal>, EngineError> {
        let active = self
            .inner
            .alerts
            .active_alert(observation.company_id, observation.product_id)
            .await?;
        let signal = evaluate(observation, thresholds, active.as_ref().map(|a| a.threshold));

        match &signal {
            Some(MonitorSignal::Breach(breach)) => match self.inner.alerts.on_breach(breach).await {
                Ok(alert) => self.after_alert_created(&alert, thresholds),
                Err(EngineError::DuplicateAlert { .. }) => return Ok(None),
                Err(e) => return Err(e),
            },
            Some(MonitorSignal::Recovery(_)) => {
                self.inner
                    .alerts
                    .on_recovery(observation.company_id, observation.product_id)
                    .await?;
            }
            None => {}
        }
        Ok(signal)
    }

    fn after_alert_created(&self, alert: &Alert, thresholds: &ThresholdConfig) {
        if thresholds.requires_manual_approval() {
            info!(alert_id = %alert.id, "alert awaiting operator approval");
        } else {
            self.dispatch_workflow(alert.id);
        }
    }

    fn dispatch_workflow(&self, alert_id: AlertId) {
        let orchestrator = self.inner.orchestrator.clone();
        let handle = tokio::spawn(async move {
            match orchestrator.run(alert_id).await {
                Ok(execution) => {
                    debug!(alert_id = %alert_id, execution_id = %execution.id, status = %execution.status, "workflow done")
                }
                Err(e) => error!(alert_id = %alert_id, error = %e, "workflow not run"),
            }
        });

        let mut workflows = self
            .inner
            .workflows
            .lock()
            .unwrap_or_else(|e| e.into_inner());
        workflows.retain(|h| !h.is_finished());
        workflows.push(handle);
    }

    /// Manual trigger: check one product now.
    ///
    /// Returns the breach when one was found (an Alert has been created and,
    /// unless approval is required, its workflow started) or `None` when the
    /// stock level is fine.
    #[instrument(skip(self))]
    pub async fn check_product(
        &self,
        company_id: CompanyId,
        product_id: ProductId,
    ) -> Result<Option<BreachSignal>, EngineError> {
        let product = self
            .inner
            .products
            .get_product(company_id, product_id)
            .await?
            .ok_or(EngineError::UnknownProduct {
                company_id,
                product_id,
            })?;

        if let Some(active) = self.inner.alerts.active_alert(company_id, product_id).await? {
            return Err(EngineError::ActiveAlertExists {
                alert_id: active.id,
            });
        }

        let observation = product.to_observation();
        match evaluate(&observation, &product.thresholds, None) {
            Some(MonitorSignal::Breach(breach)) => match self.inner.alerts.on_breach(&breach).await {
                Ok(alert) => {
                    self.after_alert_created(&alert, &product.thresholds);
                    Ok(Some(breach))
                }
                Err(EngineError::DuplicateAlert { existing }) => {
                    Err(EngineError::ActiveAlertExists { alert_id: existing })
                }
                Err(e) => Err(e),
            },
            _ => Ok(None),
        }
    }

    /// Start the workflow of an Alert held for approval.
    #[instrument(skip(self))]
    pub async fn approve(&self, alert_id: AlertId) -> Result<Alert, EngineError> {
        let alert = self.inner.alerts.get(alert_id).await?;
        if alert.status != AlertStatus::Detected {
            return Err(EngineError::InvalidTransition(AlertError::InvalidTransition {
                alert_id,
                from: alert.status,
                to: AlertStatus::Analyzing,
            }));
        }
        if let Some(execution) = self.inner.ledger.execution_for_alert(alert_id).await? {
            return Err(EngineError::ExecutionAlreadyExists {
                alert_id,
                execution_id: execution.id,
            });
        }
        info!(alert_id = %alert_id, "alert approved");
        self.dispatch_workflow(alert_id);
        Ok(alert)
    }

    /// Manual override `detected -> ignored`. Ignored Alerts never get a workflow.
    pub async fn ignore(&self, alert_id: AlertId) -> Result<Alert, EngineError> {
        self.inner.alerts.ignore(alert_id).await
    }

    /// Run an Alert's workflow on the caller's task.
    pub async fn run_workflow(&self, alert_id: AlertId) -> Result<Execution, EngineError> {
        self.inner.orchestrator.run(alert_id).await
    }

    /// Wait for every workflow dispatched so far.
    pub async fn drain_workflows(&self) {
        loop {
            let handles: Vec<JoinHandle<()>> = {
                let mut workflows = self
                    .inner
                    .workflows
                    .lock()
                    .unwrap_or_else(|e| e.into_inner());
                workflows.drain(..).collect()
            };
            if handles.is_empty() {
                return;
            }
            for handle in handles {
                if let Err(e) = handle.await {
                    error!(error = %e, "workflow task panicked");
                }
            }
        }
    }

    /// Poll the product store once, worst shortage first.
    pub async fn poll_once(&self) -> Result<PollReport, EngineError> {
        let products = self.inner.products.list_products().await?;
        let mut thresholds: HashMap<(CompanyId, ProductId), ThresholdConfig> =
            HashMap::with_capacity(products.len());
        let mut observations = Vec::with_capacity(products.len());
        for product in products {
            observations.push(product.to_observation());
            thresholds.insert((product.company_id, product.product_id), product.thresholds);
        }
        order_by_urgency(&mut observations);

        let mut report = PollReport::default();
        for observation in &observations {
            let Some(config) = thresholds.get(&(observation.company_id, observation.product_id))
            else {
                continue;
            };
            report.products_checked += 1;
            match self.process(observation, config).await {
                Ok(Some(MonitorSignal::Breach(_))) => report.breaches += 1,
                Ok(Some(MonitorSignal::Recovery(_))) => report.recoveries += 1,
                Ok(None) => {}
                Err(e) => {
                    report.errors += 1;
                    warn!(product_id = %observation.product_id, error = %e, "product check failed");
                }
            }
        }
        Ok(report)
    }

    /// Start the background polling loop at the configured interval.
    pub fn spawn_monitor(&self) -> MonitorHandle {
        MonitorRunner::new(self.inner.config.check_interval).spawn(Arc::new(self.clone()))
    }

    pub async fn get_alert(&self, alert_id: AlertId) -> Result<Alert, EngineError> {
        self.inner.alerts.get(alert_id).await
    }

    pub async fn list_alerts(
        &self,
        filter: AlertFilter,
        pagination: Pagination,
    ) -> Result<Page<Alert>, EngineError> {
        Ok(self.inner.ledger.list_alerts(filter, pagination).await?)
    }

    pub async fn list_executions(
        &self,
        filter: ExecutionFilter,
        pagination: Pagination,
    ) -> Result<Page<Execution>, EngineError> {
        Ok(self.inner.ledger.list_executions(filter, pagination).await?)
    }

    pub async fn get_execution(&self, execution_id: ExecutionId) -> Result<Execution, EngineError> {
        self.inner
            .ledger
            .get_execution(execution_id)
            .await?
            .ok_or(EngineError::ExecutionNotFound(execution_id))
    }

    pub async fn execution_for_alert(
        &self,
        alert_id: AlertId,
    ) -> Result<Option<Execution>, EngineError> {
        Ok(self.inner.ledger.execution_for_alert(alert_id).await?)
    }

    pub async fn engine_status(&self) -> Result<EngineStatus, EngineError> {
        Ok(self.inner.ledger.engine_status().await?)
    }
}

#[async_trait]
impl PollTarget for ReplenishmentEngine {
    async fn poll_once(&self) -> Result<PollReport, EngineError> {
        ReplenishmentEngine::poll_once(self).await
    }
}
