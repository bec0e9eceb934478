//! Orchestrator: runs the diagnosis → planning → provider dispatch pipeline
//! for one Alert and records it as an Execution.
//!
//! Stage layout (reflected in `step_number`):
//!
//! | step | stage | concurrency |
//! |---|---|---|
//! | 1 | root cause analysis | inline |
//! | 2 | replenishment planning | inline |
//! | 3.. | one step per registered provider | concurrent, each with its own timeout and retries |
//!
//! A failure in stage 1 or 2 fails the Execution. Provider failures are
//! contained in their own step and only affect the fan-in status. The
//! Orchestrator never resolves the Alert; recovery does.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use serde_json::{Value as JsonValue, json};
use tokio::task::JoinSet;
use tracing::{debug, error, info, instrument, warn};

use replenish_ai::{
    AiError, AiScheduler, DiagnosticConfig, DiagnosticJob, Diagnosis, LocalAiScheduler,
    PlannerConfig, PlanningJob, ReplenishmentPlan,
};
use replenish_alerts::{Alert, AlertError, AlertStatus};
use replenish_core::{AlertId, ExecutionId};
use replenish_workflow::{
    CapabilityProvider, ErrorClass, Execution, ExecutionStatus, ExecutionSummary, ProviderError,
    ProviderResponse, RetryPolicy, StepError, StepErrorKind, StepStatus, WorkflowStep,
    aggregate_status, step_names,
};

use crate::collaborators::{HistoryReader, ProductStore};
use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::ledger::{AlertTransition, LedgerBackend};
use crate::providers::ProviderRegistry;

const FIRST_PROVIDER_STEP: u32 = 3;

/// Orchestrator tuning taken from [`EngineConfig`].
#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    pub provider_timeout: Duration,
    pub retry: RetryPolicy,
    pub history_window_days: u32,
    pub diagnostic: DiagnosticConfig,
    pub planner: PlannerConfig,
}

impl From<&EngineConfig> for OrchestratorSettings {
    fn from(config: &EngineConfig) -> Self {
        Self {
            provider_timeout: config.provider_timeout,
            retry: config.retry.clone(),
            history_window_days: config.history_window_days,
            diagnostic: config.diagnostic.clone(),
            planner: config.planner.clone(),
        }
    }
}

#[derive(Clone)]
pub struct Orchestrator {
    ledger: Arc<dyn LedgerBackend>,
    history: Arc<dyn HistoryReader>,
    providers: ProviderRegistry,
    products: Option<Arc<dyn ProductStore>>,
    settings: OrchestratorSettings,
}

impl Orchestrator {
    pub fn new(
        ledger: Arc<dyn LedgerBackend>,
        history: Arc<dyn HistoryReader>,
        providers: ProviderRegistry,
        settings: OrchestratorSettings,
    ) -> Self {
        Self {
            ledger,
            history,
            providers,
            products: None,
            settings,
        }
    }

    /// Product store used to resolve each product's notification targets.
    pub fn with_products(mut self, products: Arc<dyn ProductStore>) -> Self {
        self.products = Some(products);
        self
    }

    pub fn providers(&self) -> &ProviderRegistry {
        &self.providers
    }

    /// Run the full pipeline for `alert_id` and return the finished Execution.
    ///
    /// Errors are returned only when the Execution cannot be started (unknown
    /// Alert, Alert ignored or resolved, Execution already exists) or cannot
    /// be finished. Stage failures and ledger write failures in between end
    /// in a `failed` Execution with any open step closed as failed.
    #[instrument(skip(self), fields(alert_id = %alert_id))]
    pub async fn run(&self, alert_id: AlertId) -> Result<Execution, EngineError> {
        let alert = self
            .ledger
            .get_alert(alert_id)
            .await?
            .ok_or(EngineError::AlertNotFound(alert_id))?;
        if matches!(alert.status, AlertStatus::Ignored | AlertStatus::Resolved) {
            return Err(EngineError::InvalidTransition(AlertError::InvalidTransition {
                alert_id,
                from: alert.status,
                to: AlertStatus::Analyzing,
            }));
        }

        let execution = self
            .ledger
            .create_execution(Execution::start(ExecutionId::new(), alert.id, Utc::now()))
            .await?;
        let execution_id = execution.id;
        info!(execution_id = %execution_id, providers = self.providers.len(), "execution started");

        let mut summary = ExecutionSummary {
            steps_total: 2 + self.providers.len(),
            ..ExecutionSummary::default()
        };

        // From here on the Execution always reaches a terminal status.
        let status = match self.run_stages(execution_id, alert, &mut summary).await {
            Ok(status) => status,
            Err(e) => {
                error!(execution_id = %execution_id, error = %e, "ledger write failed, failing execution");
                summary.failure_reason = Some(e.to_string());
                self.close_open_steps(execution_id).await;
                ExecutionStatus::Failed
            }
        };

        self.finish(execution_id, status, summary).await
    }

    /// Stages 1-3. `Err` only for ledger failures; stage failures are `Ok(Failed)`.
    async fn run_stages(
        &self,
        execution_id: ExecutionId,
        alert: Alert,
        summary: &mut ExecutionSummary,
    ) -> Result<ExecutionStatus, EngineError> {
        let alert = if alert.status == AlertStatus::Detected {
            match self
                .ledger
                .transition_alert(alert.id, AlertTransition::StartAnalysis)
                .await
            {
                Ok(alert) => alert,
                Err(e) => {
                    warn!(execution_id = %execution_id, error = %e, "alert changed before analysis started");
                    summary.failure_reason = Some(e.to_string());
                    return Ok(ExecutionStatus::Failed);
                }
            }
        } else {
            alert
        };

        // Stage 1
        let Some(diagnosis) = self.run_diagnosis(execution_id, &alert).await? else {
            summary.failure_reason = Some("root cause analysis failed".to_string());
            return Ok(ExecutionStatus::Failed);
        };
        summary.root_cause = Some(diagnosis.root_cause.as_str().to_string());
        summary.confidence = Some(diagnosis.confidence);
        summary.steps_completed += 1;

        // Stage 2
        let Some(plan) = self.run_planning(execution_id, &alert, &diagnosis).await? else {
            summary.failure_reason = Some("replenishment planning failed".to_string());
            return Ok(ExecutionStatus::Failed);
        };
        summary.replenishment_quantity = Some(plan.total_quantity);
        summary.steps_completed += 1;

        // Stage 3
        let notification_targets = self.notification_targets(&alert).await;
        let payload = json!({
            "alert": alert,
            "diagnosis": {
                "root_cause": diagnosis.root_cause,
                "confidence": diagnosis.confidence,
                "recommendations": diagnosis.recommendations,
            },
            "plan": plan,
            "notification_targets": notification_targets,
        });
        let outcomes = self.dispatch(execution_id, payload).await?;

        let status = aggregate_status(outcomes.iter().map(|step| step.status));
        for step in &outcomes {
            if step.status == StepStatus::Completed {
                summary.steps_completed += 1;
                summary.successful_actions.push(step.step_name.clone());
            }
        }
        if status == ExecutionStatus::Failed {
            summary.failure_reason = Some("every provider step failed".to_string());
        }
        Ok(status)
    }

    /// Recipients configured for the Alert's product; empty when unknown.
    async fn notification_targets(&self, alert: &Alert) -> Vec<String> {
        let Some(products) = &self.products else {
            return Vec::new();
        };
        match products.get_product(alert.company_id, alert.product_id).await {
            Ok(Some(product)) => product.thresholds.notification_targets,
            Ok(None) => Vec::new(),
            Err(e) => {
                warn!(alert_id = %alert.id, error = %e, "could not resolve notification targets");
                Vec::new()
            }
        }
    }

    /// Best effort: fail every step a ledger error left non-terminal.
    async fn close_open_steps(&self, execution_id: ExecutionId) {
        let execution = match self.ledger.get_execution(execution_id).await {
            Ok(Some(execution)) => execution,
            Ok(None) => return,
            Err(e) => {
                warn!(execution_id = %execution_id, error = %e, "could not load execution to close steps");
                return;
            }
        };
        for step in execution.steps.into_iter().filter(|s| !s.is_terminal()) {
            let step_number = step.step_number;
            let failed = step.fail(
                internal_error("execution failed before step finished".to_string()),
                Utc::now(),
            );
            if let Err(e) = self.ledger.record_step(execution_id, failed).await {
                warn!(execution_id = %execution_id, step_number, error = %e, "could not close step");
            }
        }
    }

    async fn finish(
        &self,
        execution_id: ExecutionId,
        status: ExecutionStatus,
        summary: ExecutionSummary,
    ) -> Result<Execution, EngineError> {
        let execution = self
            .ledger
            .finish_execution(execution_id, status, summary, Utc::now())
            .await?;
        let progress = execution
            .summary
            .as_ref()
            .map(ExecutionSummary::progress)
            .unwrap_or_default();
        match status {
            ExecutionStatus::Failed => {
                warn!(execution_id = %execution_id, progress = %progress, "execution failed")
            }
            _ => info!(execution_id = %execution_id, status = %status, progress = %progress, "execution finished"),
        }
        Ok(execution)
    }

    /// Returns `None` when the stage failed; the failure is recorded on the step.
    async fn run_diagnosis(
        &self,
        execution_id: ExecutionId,
        alert: &Alert,
    ) -> Result<Option<Diagnosis>, EngineError> {
        let step = WorkflowStep::running(1, step_names::ROOT_CAUSE_ANALYSIS, Utc::now());
        self.ledger.record_step(execution_id, step.clone()).await?;

        let history = self
            .history
            .read_history(
                alert.company_id,
                alert.product_id,
                self.settings.history_window_days,
                alert.detected_at.date_naive(),
            )
            .await;

        let outcome = match history {
            Err(e) => Err(format!("history read failed: {e}")),
            Ok(history) => {
                let job = DiagnosticJob::new(alert.clone(), history.clone())
                    .with_config(self.settings.diagnostic.clone());
                match LocalAiScheduler::for_company(alert.company_id).run(job) {
                    Ok(diagnosis) => Ok(diagnosis),
                    Err(AiError::InsufficientData(reason)) => {
                        debug!(execution_id = %execution_id, reason = %reason, "insufficient history, diagnosing as unknown");
                        Ok(Diagnosis::insufficient_history(alert, &history))
                    }
                    Err(e) => Err(e.to_string()),
                }
            }
        };

        match outcome {
            Ok(diagnosis) => {
                let output = step_output(execution_id, &diagnosis);
                self.ledger
                    .record_step(execution_id, step.complete(output, 1, Utc::now()))
                    .await?;
                info!(
                    execution_id = %execution_id,
                    root_cause = %diagnosis.root_cause,
                    confidence = diagnosis.confidence,
                    "root cause analysis completed"
                );
                Ok(Some(diagnosis))
            }
            Err(message) => {
                error!(execution_id = %execution_id, error = %message, "root cause analysis failed");
                self.ledger
                    .record_step(execution_id, step.fail(internal_error(message), Utc::now()))
                    .await?;
                Ok(None)
            }
        }
    }

    async fn run_planning(
        &self,
        execution_id: ExecutionId,
        alert: &Alert,
        diagnosis: &Diagnosis,
    ) -> Result<Option<ReplenishmentPlan>, EngineError> {
        let step = WorkflowStep::running(2, step_names::REPLENISHMENT_PLANNING, Utc::now());
        self.ledger.record_step(execution_id, step.clone()).await?;

        let job = PlanningJob::new(alert.clone(), diagnosis.clone())
            .with_config(self.settings.planner.clone());
        match LocalAiScheduler::for_company(alert.company_id).run(job) {
            Ok(plan) => {
                let output = step_output(execution_id, &plan);
                self.ledger
                    .record_step(execution_id, step.complete(output, 1, Utc::now()))
                    .await?;
                info!(
                    execution_id = %execution_id,
                    total_quantity = plan.total_quantity,
                    splits = plan.sourcing_splits.len(),
                    "replenishment plan ready"
                );
                Ok(Some(plan))
            }
            Err(e) => {
                error!(execution_id = %execution_id, error = %e, "replenishment planning failed");
                self.ledger
                    .record_step(execution_id, step.fail(internal_error(e.to_string()), Utc::now()))
                    .await?;
                Ok(None)
            }
        }
    }

    /// Fan out to every provider and fan back in. Each terminal step is
    /// recorded as soon as its provider finishes.
    async fn dispatch(
        &self,
        execution_id: ExecutionId,
        payload: JsonValue,
    ) -> Result<Vec<WorkflowStep>, EngineError> {
        let providers: Vec<Arc<dyn CapabilityProvider>> = self.providers.iter().cloned().collect();
        let started = Utc::now();

        let mut steps: Vec<WorkflowStep> = providers
            .iter()
            .enumerate()
            .map(|(i, p)| {
                WorkflowStep::running(
                    FIRST_PROVIDER_STEP + i as u32,
                    step_names::provider(p.action().as_str(), p.name()),
                    started,
                )
            })
            .collect();
        for step in &steps {
            self.ledger.record_step(execution_id, step.clone()).await?;
        }

        let payload = Arc::new(payload);
        let mut tasks = JoinSet::new();
        for (i, provider) in providers.into_iter().enumerate() {
            let payload = Arc::clone(&payload);
            let retry = self.settings.retry.clone();
            let timeout = self.settings.provider_timeout;
            tasks.spawn(async move {
                let outcome = call_with_retry(provider.as_ref(), &payload, &retry, timeout).await;
                (i, outcome)
            });
        }

        // A failed terminal write must not abandon the other providers.
        let mut unrecorded = Vec::new();
        let mut done = vec![false; steps.len()];
        while let Some(joined) = tasks.join_next().await {
            let (i, outcome) = match joined {
                Ok(result) => result,
                Err(e) => {
                    error!(execution_id = %execution_id, error = %e, "provider task aborted");
                    continue;
                }
            };
            let step = steps[i].clone();
            let step = match outcome {
                Ok((response, attempts)) => {
                    info!(execution_id = %execution_id, step = %step.step_name, attempts, "provider step completed");
                    step.complete(response.data, attempts, Utc::now())
                }
                Err(err) => {
                    warn!(
                        execution_id = %execution_id,
                        step = %step.step_name,
                        attempts = err.attempts,
                        error = %err.message,
                        "provider step failed"
                    );
                    step.fail(err, Utc::now())
                }
            };
            if let Err(e) = self.ledger.record_step(execution_id, step.clone()).await {
                warn!(execution_id = %execution_id, step = %step.step_name, error = %e, "could not record provider step");
                unrecorded.push(i);
            }
            steps[i] = step;
            done[i] = true;
        }

        // A provider task that panicked never reported back.
        for (i, finished) in done.iter().enumerate() {
            if !finished {
                let step = steps[i]
                    .clone()
                    .fail(internal_error("provider task aborted".to_string()), Utc::now());
                if let Err(e) = self.ledger.record_step(execution_id, step.clone()).await {
                    warn!(execution_id = %execution_id, step = %step.step_name, error = %e, "could not record provider step");
                    unrecorded.push(i);
                }
                steps[i] = step;
            }
        }

        for i in unrecorded {
            self.ledger.record_step(execution_id, steps[i].clone()).await?;
        }

        Ok(steps)
    }
}

/// Call one provider with a per-attempt timeout, retrying transient errors
/// and timeouts until the policy's attempts run out.
///
/// Returns the response and the number of attempts used.
pub async fn call_with_retry(
    provider: &dyn CapabilityProvider,
    payload: &JsonValue,
    retry: &RetryPolicy,
    timeout: Duration,
) -> Result<(ProviderResponse, u32), StepError> {
    let max_attempts = retry.attempts();
    let mut attempt = 0;
    loop {
        attempt += 1;
        let (class, message) =
            match tokio::time::timeout(timeout, provider.execute(provider.action(), payload)).await {
                Ok(Ok(response)) => return Ok((response, attempt)),
                Ok(Err(ProviderError::Permanent(message))) => {
                    return Err(StepError {
                        kind: StepErrorKind::NonRetryable,
                        class: ErrorClass::Permanent,
                        attempts: attempt,
                        message,
                    });
                }
                Ok(Err(ProviderError::Transient(message))) => (ErrorClass::Transient, message),
                Err(_) => (
                    ErrorClass::Timeout,
                    format!("no response within {} ms", timeout.as_millis()),
                ),
            };

        if attempt >= max_attempts {
            return Err(StepError {
                kind: StepErrorKind::RetriesExhausted,
                class,
                attempts: attempt,
                message,
            });
        }

        let delay = retry.delay_for_attempt(attempt);
        debug!(provider = %provider.name(), attempt, delay_ms = delay.as_millis() as u64, error = %message, "retrying provider call");
        tokio::time::sleep(delay).await;
    }
}

/// Step output for a stage result; a value that cannot be serialized is
/// recorded as an error object rather than silently dropped.
fn step_output<T: Serialize>(execution_id: ExecutionId, value: &T) -> JsonValue {
    match serde_json::to_value(value) {
        Ok(output) => output,
        Err(e) => {
            warn!(execution_id = %execution_id, error = %e, "step output could not be serialized");
            json!({ "serialization_error": e.to_string() })
        }
    }
}

fn internal_error(message: String) -> StepError {
    StepError {
        kind: StepErrorKind::NonRetryable,
        class: ErrorClass::Internal,
        attempts: 1,
        message,
    }
}
