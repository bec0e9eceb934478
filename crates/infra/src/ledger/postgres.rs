//! Postgres-backed ledger.
//!
//! ## Error Mapping
//!
//! | SQLx error | Code | LedgerError | Scenario |
//! |------------|------|-------------|----------|
//! | unique violation on `replenishment_alerts_one_active` | `23505` | `ActiveAlertExists` | concurrent breach for the same product |
//! | unique violation on `replenishment_executions_one_per_alert` | `23505` | `ExecutionExists` | orchestrator re-invoked for an alert |
//! | foreign key violation | `23503` | `AlertNotFound` | execution for an unknown alert |
//! | anything else | | `Backend` | connectivity, pool closed, ... |
//!
//! The partial unique index makes the dedup check-and-create atomic across
//! engine instances sharing one database.

use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgConnection, PgPool, Postgres, QueryBuilder, Row};
use tracing::instrument;
use uuid::Uuid;

use replenish_alerts::{Alert, AlertStatus, AlertType};
use replenish_core::{AlertId, CompanyId, ExecutionId, ProductId};
use replenish_inventory::Priority;
use replenish_workflow::{
    Execution, ExecutionStatus, ExecutionSummary, StepError, StepStatus, WorkflowStep,
};

use super::query::{AlertFilter, EngineStatus, ExecutionFilter, Page, Pagination};
use super::{AlertTransition, Ledger, LedgerError, LedgerQuery};

/// Schema applied by [`PostgresLedger::ensure_schema`].
pub const SCHEMA: &str = include_str!("../../migrations/0001_replenishment_ledger.sql");

const ALERT_COLUMNS: &str = "alert_id, company_id, product_id, alert_type, priority, status, \
     current_inventory, threshold, detected_at, resolved_at";

const EXECUTION_COLUMNS: &str =
    "e.execution_id, e.alert_id, e.status, e.started_at, e.completed_at, e.summary";

#[derive(Debug, Clone)]
pub struct PostgresLedger {
    pool: Arc<PgPool>,
}

impl PostgresLedger {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    pub async fn connect(database_url: &str) -> Result<Self, LedgerError> {
        let pool = PgPool::connect(database_url)
            .await
            .map_err(|e| map_sqlx_error("connect", e))?;
        Ok(Self::new(pool))
    }

    /// Create tables and indexes if they do not exist.
    pub async fn ensure_schema(&self) -> Result<(), LedgerError> {
        sqlx::raw_sql(SCHEMA)
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("ensure_schema", e))?;
        Ok(())
    }

    async fn active_alert_id(
        &self,
        company_id: CompanyId,
        product_id: ProductId,
    ) -> Result<Option<AlertId>, LedgerError> {
        let row = sqlx::query(
            "SELECT alert_id FROM replenishment_alerts \
             WHERE company_id = $1 AND product_id = $2 AND status <> 'resolved'",
        )
        .bind(company_id.as_uuid())
        .bind(product_id.as_uuid())
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("active_alert_id", e))?;

        row.map(|r| r.try_get::<Uuid, _>("alert_id").map(AlertId::from_uuid))
            .transpose()
            .map_err(|e| map_sqlx_error("active_alert_id", e))
    }
}

#[async_trait]
impl Ledger for PostgresLedger {
    #[instrument(skip(self, alert), fields(alert_id = %alert.id, product_id = %alert.product_id), err)]
    async fn create_alert(&self, alert: Alert) -> Result<Alert, LedgerError> {
        let result = sqlx::query(
            r#"
            INSERT INTO replenishment_alerts (
                alert_id, company_id, product_id, alert_type, priority, status,
                current_inventory, threshold, detected_at, resolved_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(alert.id.as_uuid())
        .bind(alert.company_id.as_uuid())
        .bind(alert.product_id.as_uuid())
        .bind(alert.alert_type.as_str())
        .bind(alert.priority.as_str())
        .bind(alert.status.as_str())
        .bind(alert.current_inventory)
        .bind(alert.threshold)
        .bind(alert.detected_at)
        .bind(alert.resolved_at)
        .execute(&*self.pool)
        .await;

        match result {
            Ok(_) => Ok(alert),
            Err(e) if is_unique_violation(&e) => {
                let existing = self
                    .active_alert_id(alert.company_id, alert.product_id)
                    .await?
                    .ok_or_else(|| map_sqlx_error("create_alert", e))?;
                Err(LedgerError::ActiveAlertExists { existing })
            }
            Err(e) => Err(map_sqlx_error("create_alert", e)),
        }
    }

    async fn get_alert(&self, alert_id: AlertId) -> Result<Option<Alert>, LedgerError> {
        let row = sqlx::query(&format!(
            "SELECT {ALERT_COLUMNS} FROM replenishment_alerts WHERE alert_id = $1"
        ))
        .bind(alert_id.as_uuid())
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("get_alert", e))?;

        row.as_ref().map(alert_from_row).transpose()
    }

    async fn active_alert(
        &self,
        company_id: CompanyId,
        product_id: ProductId,
    ) -> Result<Option<Alert>, LedgerError> {
        let row = sqlx::query(&format!(
            "SELECT {ALERT_COLUMNS} FROM replenishment_alerts \
             WHERE company_id = $1 AND product_id = $2 AND status <> 'resolved'"
        ))
        .bind(company_id.as_uuid())
        .bind(product_id.as_uuid())
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("active_alert", e))?;

        row.as_ref().map(alert_from_row).transpose()
    }

    #[instrument(skip(self), fields(alert_id = %alert_id), err)]
    async fn transition_alert(
        &self,
        alert_id: AlertId,
        transition: AlertTransition,
    ) -> Result<Alert, LedgerError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("transition_alert", e))?;

        let row = sqlx::query(&format!(
            "SELECT {ALERT_COLUMNS} FROM replenishment_alerts WHERE alert_id = $1 FOR UPDATE"
        ))
        .bind(alert_id.as_uuid())
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("transition_alert", e))?
        .ok_or(LedgerError::AlertNotFound(alert_id))?;

        let mut alert = alert_from_row(&row)?;
        transition.apply(&mut alert)?;

        sqlx::query(
            "UPDATE replenishment_alerts SET status = $2, resolved_at = $3 WHERE alert_id = $1",
        )
        .bind(alert.id.as_uuid())
        .bind(alert.status.as_str())
        .bind(alert.resolved_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("transition_alert", e))?;

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("transition_alert", e))?;
        Ok(alert)
    }

    #[instrument(skip(self, execution), fields(execution_id = %execution.id, alert_id = %execution.alert_id), err)]
    async fn create_execution(&self, execution: Execution) -> Result<Execution, LedgerError> {
        let result = sqlx::query(
            r#"
            INSERT INTO replenishment_executions (execution_id, alert_id, status, started_at, completed_at, summary)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(execution.id.as_uuid())
        .bind(execution.alert_id.as_uuid())
        .bind(execution.status.as_str())
        .bind(execution.started_at)
        .bind(execution.completed_at)
        .bind(to_json_opt(execution.summary.as_ref())?)
        .execute(&*self.pool)
        .await;

        match result {
            Ok(_) => Ok(execution),
            Err(e) if is_unique_violation(&e) => {
                let existing = self
                    .execution_for_alert(execution.alert_id)
                    .await?
                    .map(|e| e.id)
                    .ok_or_else(|| map_sqlx_error("create_execution", e))?;
                Err(LedgerError::ExecutionExists {
                    alert_id: execution.alert_id,
                    existing,
                })
            }
            Err(e) if is_foreign_key_violation(&e) => {
                Err(LedgerError::AlertNotFound(execution.alert_id))
            }
            Err(e) => Err(map_sqlx_error("create_execution", e)),
        }
    }

    #[instrument(skip(self, step), fields(execution_id = %execution_id, step_number = step.step_number), err)]
    async fn record_step(
        &self,
        execution_id: ExecutionId,
        step: WorkflowStep,
    ) -> Result<(), LedgerError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("record_step", e))?;

        let mut execution = load_execution(&mut tx, execution_id, true)
            .await?
            .ok_or(LedgerError::ExecutionNotFound(execution_id))?;
        // Validates ordering and step immutability.
        execution.record_step(step.clone())?;

        sqlx::query(
            r#"
            INSERT INTO replenishment_workflow_steps (
                execution_id, step_number, step_name, status, started_at, completed_at,
                output, error, attempts
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ON CONFLICT (execution_id, step_number)
            DO UPDATE SET
                step_name = EXCLUDED.step_name,
                status = EXCLUDED.status,
                started_at = EXCLUDED.started_at,
                completed_at = EXCLUDED.completed_at,
                output = EXCLUDED.output,
                error = EXCLUDED.error,
                attempts = EXCLUDED.attempts
            "#,
        )
        .bind(execution_id.as_uuid())
        .bind(step.step_number as i32)
        .bind(&step.step_name)
        .bind(step.status.as_str())
        .bind(step.started_at)
        .bind(step.completed_at)
        .bind(&step.output)
        .bind(to_json_opt(step.error.as_ref())?)
        .bind(step.attempts as i32)
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("record_step", e))?;

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("record_step", e))?;
        Ok(())
    }

    #[instrument(skip(self, summary), fields(execution_id = %execution_id, status = %status), err)]
    async fn finish_execution(
        &self,
        execution_id: ExecutionId,
        status: ExecutionStatus,
        summary: ExecutionSummary,
        at: DateTime<Utc>,
    ) -> Result<Execution, LedgerError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("finish_execution", e))?;

        let mut execution = load_execution(&mut tx, execution_id, true)
            .await?
            .ok_or(LedgerError::ExecutionNotFound(execution_id))?;
        execution.finish(status, summary, at)?;

        sqlx::query(
            "UPDATE replenishment_executions SET status = $2, completed_at = $3, summary = $4 \
             WHERE execution_id = $1",
        )
        .bind(execution_id.as_uuid())
        .bind(execution.status.as_str())
        .bind(execution.completed_at)
        .bind(to_json_opt(execution.summary.as_ref())?)
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("finish_execution", e))?;

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("finish_execution", e))?;
        Ok(execution)
    }

    async fn get_execution(
        &self,
        execution_id: ExecutionId,
    ) -> Result<Option<Execution>, LedgerError> {
        let mut conn = self
            .pool
            .acquire()
            .await
            .map_err(|e| map_sqlx_error("get_execution", e))?;
        load_execution(&mut conn, execution_id, false).await
    }

    async fn execution_for_alert(
        &self,
        alert_id: AlertId,
    ) -> Result<Option<Execution>, LedgerError> {
        let row = sqlx::query("SELECT execution_id FROM replenishment_executions WHERE alert_id = $1")
            .bind(alert_id.as_uuid())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("execution_for_alert", e))?;

        match row {
            Some(row) => {
                let id: Uuid = row
                    .try_get("execution_id")
                    .map_err(|e| map_sqlx_error("execution_for_alert", e))?;
                self.get_execution(ExecutionId::from_uuid(id)).await
            }
            None => Ok(None),
        }
    }
}

#[async_trait]
impl LedgerQuery for PostgresLedger {
    #[instrument(skip(self), err)]
    async fn list_alerts(
        &self,
        filter: AlertFilter,
        pagination: Pagination,
    ) -> Result<Page<Alert>, LedgerError> {
        let mut count = QueryBuilder::<Postgres>::new(
            "SELECT COUNT(*) AS total FROM replenishment_alerts WHERE TRUE",
        );
        push_alert_filters(&mut count, &filter);
        let total: i64 = count
            .build()
            .fetch_one(&*self.pool)
            .await
            .and_then(|r| r.try_get("total"))
            .map_err(|e| map_sqlx_error("list_alerts", e))?;

        let mut select = QueryBuilder::<Postgres>::new(format!(
            "SELECT {ALERT_COLUMNS} FROM replenishment_alerts WHERE TRUE"
        ));
        push_alert_filters(&mut select, &filter);
        select
            .push(" ORDER BY detected_at DESC, alert_id DESC LIMIT ")
            .push_bind(i64::from(pagination.limit))
            .push(" OFFSET ")
            .push_bind(i64::from(pagination.offset));

        let rows = select
            .build()
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("list_alerts", e))?;
        let items = rows.iter().map(alert_from_row).collect::<Result<Vec<_>, _>>()?;

        Ok(page(items, total, pagination))
    }

    #[instrument(skip(self), err)]
    async fn list_executions(
        &self,
        filter: ExecutionFilter,
        pagination: Pagination,
    ) -> Result<Page<Execution>, LedgerError> {
        let mut count = QueryBuilder::<Postgres>::new(
            "SELECT COUNT(*) AS total FROM replenishment_executions e \
             JOIN replenishment_alerts a ON a.alert_id = e.alert_id WHERE TRUE",
        );
        push_execution_filters(&mut count, &filter);
        let total: i64 = count
            .build()
            .fetch_one(&*self.pool)
            .await
            .and_then(|r| r.try_get("total"))
            .map_err(|e| map_sqlx_error("list_executions", e))?;

        let mut select = QueryBuilder::<Postgres>::new(format!(
            "SELECT {EXECUTION_COLUMNS} FROM replenishment_executions e \
             JOIN replenishment_alerts a ON a.alert_id = e.alert_id WHERE TRUE"
        ));
        push_execution_filters(&mut select, &filter);
        select
            .push(" ORDER BY e.started_at DESC, e.execution_id DESC LIMIT ")
            .push_bind(i64::from(pagination.limit))
            .push(" OFFSET ")
            .push_bind(i64::from(pagination.offset));

        let rows = select
            .build()
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("list_executions", e))?;
        let mut items = rows
            .iter()
            .map(execution_from_row)
            .collect::<Result<Vec<_>, _>>()?;

        let ids: Vec<Uuid> = items.iter().map(|e| *e.id.as_uuid()).collect();
        let step_rows = sqlx::query(
            "SELECT execution_id, step_number, step_name, status, started_at, completed_at, \
             output, error, attempts FROM replenishment_workflow_steps \
             WHERE execution_id = ANY($1) ORDER BY execution_id, step_number",
        )
        .bind(&ids)
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("list_executions", e))?;

        for row in &step_rows {
            let execution_id: Uuid = row
                .try_get("execution_id")
                .map_err(|e| map_sqlx_error("list_executions", e))?;
            let step = step_from_row(row)?;
            if let Some(execution) = items.iter_mut().find(|e| *e.id.as_uuid() == execution_id) {
                execution.steps.push(step);
            }
        }

        Ok(page(items, total, pagination))
    }

    #[instrument(skip(self), err)]
    async fn engine_status(&self) -> Result<EngineStatus, LedgerError> {
        let mut status = EngineStatus::default();

        let alert_rows = sqlx::query(
            "SELECT status, COUNT(*) AS n, \
             MAX(GREATEST(detected_at, COALESCE(resolved_at, detected_at))) AS last \
             FROM replenishment_alerts GROUP BY status",
        )
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("engine_status", e))?;

        for row in &alert_rows {
            let (name, n, last) = status_row(row)?;
            let alert_status = parse::<AlertStatus>(&name)?;
            status.total_alerts += n;
            if alert_status.is_active() {
                status.active_alerts += n;
            }
            status.alerts_by_status.insert(name, n);
            status.touch(last);
        }

        let execution_rows = sqlx::query(
            "SELECT status, COUNT(*) AS n, \
             MAX(GREATEST(started_at, COALESCE(completed_at, started_at))) AS last \
             FROM replenishment_executions GROUP BY status",
        )
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("engine_status", e))?;

        for row in &execution_rows {
            let (name, n, last) = status_row(row)?;
            status.total_executions += n;
            match parse::<ExecutionStatus>(&name)? {
                ExecutionStatus::Running => status.running_executions += n,
                ExecutionStatus::Completed => status.completed_executions += n,
                ExecutionStatus::PartialSuccess => status.partial_success_executions += n,
                ExecutionStatus::Failed => status.failed_executions += n,
            }
            status.touch(last);
        }

        Ok(status.finalize())
    }
}

async fn load_execution(
    conn: &mut PgConnection,
    execution_id: ExecutionId,
    for_update: bool,
) -> Result<Option<Execution>, LedgerError> {
    let lock = if for_update { " FOR UPDATE OF e" } else { "" };
    let row = sqlx::query(&format!(
        "SELECT {EXECUTION_COLUMNS} FROM replenishment_executions e WHERE e.execution_id = $1{lock}"
    ))
    .bind(execution_id.as_uuid())
    .fetch_optional(&mut *conn)
    .await
    .map_err(|e| map_sqlx_error("load_execution", e))?;

    let Some(row) = row else {
        return Ok(None);
    };
    let mut execution = execution_from_row(&row)?;

    let step_rows = sqlx::query(
        "SELECT step_number, step_name, status, started_at, completed_at, output, error, attempts \
         FROM replenishment_workflow_steps WHERE execution_id = $1 ORDER BY step_number",
    )
    .bind(execution_id.as_uuid())
    .fetch_all(&mut *conn)
    .await
    .map_err(|e| map_sqlx_error("load_execution", e))?;

    execution.steps = step_rows
        .iter()
        .map(step_from_row)
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Some(execution))
}

fn push_alert_filters(qb: &mut QueryBuilder<'_, Postgres>, filter: &AlertFilter) {
    if let Some(company_id) = filter.company_id {
        qb.push(" AND company_id = ").push_bind(*company_id.as_uuid());
    }
    if let Some(product_id) = filter.product_id {
        qb.push(" AND product_id = ").push_bind(*product_id.as_uuid());
    }
    if let Some(priority) = filter.priority {
        qb.push(" AND priority = ").push_bind(priority.as_str());
    }
    if let Some(status) = filter.status {
        qb.push(" AND status = ").push_bind(status.as_str());
    }
    if let Some(after) = filter.detected_after {
        qb.push(" AND detected_at >= ").push_bind(after);
    }
    if let Some(before) = filter.detected_before {
        qb.push(" AND detected_at < ").push_bind(before);
    }
}

fn push_execution_filters(qb: &mut QueryBuilder<'_, Postgres>, filter: &ExecutionFilter) {
    if let Some(alert_id) = filter.alert_id {
        qb.push(" AND e.alert_id = ").push_bind(*alert_id.as_uuid());
    }
    if let Some(company_id) = filter.company_id {
        qb.push(" AND a.company_id = ").push_bind(*company_id.as_uuid());
    }
    if let Some(status) = filter.status {
        qb.push(" AND e.status = ").push_bind(status.as_str());
    }
    if let Some(after) = filter.started_after {
        qb.push(" AND e.started_at >= ").push_bind(after);
    }
    if let Some(before) = filter.started_before {
        qb.push(" AND e.started_at < ").push_bind(before);
    }
}

fn page<T>(items: Vec<T>, total: i64, pagination: Pagination) -> Page<T> {
    let total = total.max(0) as u64;
    let has_more = u64::from(pagination.offset) + (items.len() as u64) < total;
    Page {
        items,
        total,
        pagination,
        has_more,
    }
}

fn alert_from_row(row: &sqlx::postgres::PgRow) -> Result<Alert, LedgerError> {
    let get = |e: sqlx::Error| map_sqlx_error("alert_from_row", e);
    let alert_type: String = row.try_get("alert_type").map_err(get)?;
    if alert_type != AlertType::LowInventory.as_str() {
        return Err(LedgerError::Serialization(format!(
            "unknown alert type: {alert_type}"
        )));
    }
    let priority: String = row.try_get("priority").map_err(get)?;
    let status: String = row.try_get("status").map_err(get)?;

    Ok(Alert {
        id: AlertId::from_uuid(row.try_get("alert_id").map_err(get)?),
        company_id: CompanyId::from_uuid(row.try_get("company_id").map_err(get)?),
        product_id: ProductId::from_uuid(row.try_get("product_id").map_err(get)?),
        alert_type: AlertType::LowInventory,
        priority: parse::<Priority>(&priority)?,
        status: parse::<AlertStatus>(&status)?,
        current_inventory: row.try_get("current_inventory").map_err(get)?,
        threshold: row.try_get("threshold").map_err(get)?,
        detected_at: row.try_get("detected_at").map_err(get)?,
        resolved_at: row.try_get("resolved_at").map_err(get)?,
    })
}

fn execution_from_row(row: &sqlx::postgres::PgRow) -> Result<Execution, LedgerError> {
    let get = |e: sqlx::Error| map_sqlx_error("execution_from_row", e);
    let status: String = row.try_get("status").map_err(get)?;
    let summary: Option<serde_json::Value> = row.try_get("summary").map_err(get)?;

    Ok(Execution {
        id: ExecutionId::from_uuid(row.try_get("execution_id").map_err(get)?),
        alert_id: AlertId::from_uuid(row.try_get("alert_id").map_err(get)?),
        status: parse::<ExecutionStatus>(&status)?,
        started_at: row.try_get("started_at").map_err(get)?,
        completed_at: row.try_get("completed_at").map_err(get)?,
        steps: Vec::new(),
        summary: from_json_opt::<ExecutionSummary>(summary)?,
    })
}

fn step_from_row(row: &sqlx::postgres::PgRow) -> Result<WorkflowStep, LedgerError> {
    let get = |e: sqlx::Error| map_sqlx_error("step_from_row", e);
    let status: String = row.try_get("status").map_err(get)?;
    let step_number: i32 = row.try_get("step_number").map_err(get)?;
    let attempts: i32 = row.try_get("attempts").map_err(get)?;
    let error: Option<serde_json::Value> = row.try_get("error").map_err(get)?;

    Ok(WorkflowStep {
        step_number: step_number.max(0) as u32,
        step_name: row.try_get("step_name").map_err(get)?,
        status: parse::<StepStatus>(&status)?,
        started_at: row.try_get("started_at").map_err(get)?,
        completed_at: row.try_get("completed_at").map_err(get)?,
        output: row.try_get("output").map_err(get)?,
        error: from_json_opt::<StepError>(error)?,
        attempts: attempts.max(0) as u32,
    })
}

fn status_row(
    row: &sqlx::postgres::PgRow,
) -> Result<(String, u64, Option<DateTime<Utc>>), LedgerError> {
    let get = |e: sqlx::Error| map_sqlx_error("engine_status", e);
    let name: String = row.try_get("status").map_err(get)?;
    let n: i64 = row.try_get("n").map_err(get)?;
    let last: Option<DateTime<Utc>> = row.try_get("last").map_err(get)?;
    Ok((name, n.max(0) as u64, last))
}

fn parse<T>(s: &str) -> Result<T, LedgerError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    T::from_str(s).map_err(|e| LedgerError::Serialization(e.to_string()))
}

fn to_json_opt<T: serde::Serialize>(
    value: Option<&T>,
) -> Result<Option<serde_json::Value>, LedgerError> {
    value
        .map(serde_json::to_value)
        .transpose()
        .map_err(|e| LedgerError::Serialization(e.to_string()))
}

fn from_json_opt<T: serde::de::DeserializeOwned>(
    value: Option<serde_json::Value>,
) -> Result<Option<T>, LedgerError> {
    match value {
        None | Some(serde_json::Value::Null) => Ok(None),
        Some(v) => serde_json::from_value(v)
            .map(Some)
            .map_err(|e| LedgerError::Serialization(e.to_string())),
    }
}

fn map_sqlx_error(operation: &str, err: sqlx::Error) -> LedgerError {
    match err {
        sqlx::Error::Database(db_err) => LedgerError::Backend(format!(
            "database error in {}: {}",
            operation,
            db_err.message()
        )),
        sqlx::Error::PoolClosed => {
            LedgerError::Backend(format!("connection pool closed during {}", operation))
        }
        other => LedgerError::Backend(format!("sqlx error in {}: {}", operation, other)),
    }
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    has_code(err, "23505")
}

fn is_foreign_key_violation(err: &sqlx::Error) -> bool {
    has_code(err, "23503")
}

fn has_code(err: &sqlx::Error, expected: &str) -> bool {
    if let sqlx::Error::Database(db_err) = err {
        if let Some(code) = db_err.code() {
            return code.as_ref() == expected;
        }
    }
    false
}
