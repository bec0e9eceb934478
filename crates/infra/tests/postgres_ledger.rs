//! Runs only when `DATABASE_URL` points at a disposable Postgres database.

use chrono::Utc;

use replenish_alerts::{Alert, AlertStatus};
use replenish_core::{AlertId, CompanyId, ExecutionId, ProductId};
use replenish_infra::ledger::AlertTransition;
use replenish_infra::{
    AlertFilter, ExecutionFilter, Ledger, LedgerError, LedgerQuery, Pagination, PostgresLedger,
};
use replenish_inventory::{BreachSignal, Priority};
use replenish_workflow::{
    Execution, ExecutionStatus, ExecutionSummary, StepStatus, WorkflowStep, step_names,
};

async fn ledger() -> Option<PostgresLedger> {
    let url = std::env::var("DATABASE_URL").ok()?;
    let ledger = PostgresLedger::connect(&url).await.unwrap();
    ledger.ensure_schema().await.unwrap();
    Some(ledger)
}

fn alert(company_id: CompanyId, product_id: ProductId) -> Alert {
    let signal = BreachSignal {
        product_id,
        company_id,
        available_quantity: 8,
        threshold: 10,
        priority: Priority::Critical,
    };
    Alert::from_breach(AlertId::new(), &signal, Utc::now())
}

#[tokio::test]
async fn partial_unique_index_enforces_one_active_alert() {
    let Some(ledger) = ledger().await else {
        return;
    };
    let (c, p) = (CompanyId::new(), ProductId::new());

    let first = ledger.create_alert(alert(c, p)).await.unwrap();
    let err = ledger.create_alert(alert(c, p)).await.unwrap_err();
    assert_eq!(err, LedgerError::ActiveAlertExists { existing: first.id });

    let resolved = ledger
        .transition_alert(first.id, AlertTransition::Resolve { at: Utc::now() })
        .await
        .unwrap();
    assert_eq!(resolved.status, AlertStatus::Resolved);
    ledger.create_alert(alert(c, p)).await.unwrap();

    let page = ledger
        .list_alerts(
            AlertFilter {
                product_id: Some(p),
                ..AlertFilter::default()
            },
            Pagination::default(),
        )
        .await
        .unwrap();
    assert_eq!(page.total, 2);
}

#[tokio::test]
async fn execution_steps_round_trip_and_stay_immutable() {
    let Some(ledger) = ledger().await else {
        return;
    };
    let alert = ledger
        .create_alert(alert(CompanyId::new(), ProductId::new()))
        .await
        .unwrap();
    let execution = ledger
        .create_execution(Execution::start(ExecutionId::new(), alert.id, Utc::now()))
        .await
        .unwrap();
    assert!(matches!(
        ledger
            .create_execution(Execution::start(ExecutionId::new(), alert.id, Utc::now()))
            .await,
        Err(LedgerError::ExecutionExists { .. })
    ));

    let step = WorkflowStep::running(1, step_names::ROOT_CAUSE_ANALYSIS, Utc::now());
    ledger.record_step(execution.id, step.clone()).await.unwrap();
    let done = step.complete(serde_json::json!({"root_cause": "unknown"}), 1, Utc::now());
    ledger.record_step(execution.id, done.clone()).await.unwrap();
    assert!(ledger.record_step(execution.id, done).await.is_err());

    let finished = ledger
        .finish_execution(
            execution.id,
            ExecutionStatus::Completed,
            ExecutionSummary::default(),
            Utc::now(),
        )
        .await
        .unwrap();
    assert_eq!(finished.steps.len(), 1);

    let page = ledger
        .list_executions(
            ExecutionFilter {
                alert_id: Some(alert.id),
                ..ExecutionFilter::default()
            },
            Pagination::default(),
        )
        .await
        .unwrap();
    assert_eq!(page.items[0].steps[0].status, StepStatus::Completed);
    assert_eq!(page.items[0].status, ExecutionStatus::Completed);
}
