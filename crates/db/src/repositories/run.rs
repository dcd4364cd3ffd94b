use sqlx::{sqlite::SqliteRow, Row};

use rfpflow_core::domain::rfp::RfpId;
use rfpflow_core::domain::workflow::{RunStatus, TriggerType, WorkflowRun, WorkflowRunId};

use super::codec::{parse_enum, parse_optional_timestamp, parse_timestamp, parse_u32};
use super::{RepositoryError, WorkflowRunRepository};
use crate::DbPool;

const RUN_COLUMNS: &str = "id, rfp_id, run_number, trigger_type, trigger_reason, triggered_by,
    status, total_steps, completed_steps, failed_steps, started_at, completed_at, duration_ms,
    error";

pub struct SqlWorkflowRunRepository {
    pool: DbPool,
}

impl SqlWorkflowRunRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    async fn bump_step(&self, id: &WorkflowRunId, column: &str) -> Result<(), RepositoryError> {
        let result = sqlx::query(&format!(
            "UPDATE workflow_run SET {column} = {column} + 1
             WHERE id = ? AND completed_steps + failed_steps < total_steps"
        ))
        .bind(&id.0)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 1 {
            return Ok(());
        }

        let exists: i64 = sqlx::query_scalar("SELECT COUNT(1) FROM workflow_run WHERE id = ?")
            .bind(&id.0)
            .fetch_one(&self.pool)
            .await?;
        if exists == 0 {
            Err(RepositoryError::NotFound(format!("workflow run `{}`", id.0)))
        } else {
            Err(RepositoryError::Conflict(format!(
                "workflow run `{}` already accounts for every step",
                id.0
            )))
        }
    }
}

#[async_trait::async_trait]
impl WorkflowRunRepository for SqlWorkflowRunRepository {
    async fn create(&self, run: WorkflowRun) -> Result<WorkflowRun, RepositoryError> {
        let run_number: i64 = sqlx::query_scalar(
            "INSERT INTO workflow_run (id, rfp_id, run_number, trigger_type, trigger_reason,
                                       triggered_by, status, total_steps, completed_steps,
                                       failed_steps, started_at, completed_at, duration_ms, error)
             SELECT ?, ?, COALESCE(MAX(run_number), 0) + 1, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?
             FROM workflow_run WHERE rfp_id = ?
             RETURNING run_number",
        )
        .bind(&run.id.0)
        .bind(&run.rfp_id.0)
        .bind(run.trigger_type.as_str())
        .bind(run.trigger_reason.as_deref())
        .bind(run.triggered_by.as_deref())
        .bind(run.status.as_str())
        .bind(i64::from(run.total_steps))
        .bind(i64::from(run.completed_steps))
        .bind(i64::from(run.failed_steps))
        .bind(run.started_at.to_rfc3339())
        .bind(run.completed_at.map(|value| value.to_rfc3339()))
        .bind(run.duration_ms)
        .bind(run.error.as_deref())
        .bind(&run.rfp_id.0)
        .fetch_one(&self.pool)
        .await
        .map_err(|error| {
            RepositoryError::from_write(error, || {
                format!("rfp `{}` already has an active workflow run", run.rfp_id.0)
            })
        })?;

        Ok(WorkflowRun { run_number: parse_u32("run_number", run_number)?, ..run })
    }

    async fn find_by_id(&self, id: &WorkflowRunId) -> Result<Option<WorkflowRun>, RepositoryError> {
        let row = sqlx::query(&format!("SELECT {RUN_COLUMNS} FROM workflow_run WHERE id = ?"))
            .bind(&id.0)
            .fetch_optional(&self.pool)
            .await?;

        row.map(run_from_row).transpose()
    }

    async fn save(&self, run: WorkflowRun) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            "UPDATE workflow_run SET
                 status = ?,
                 completed_steps = ?,
                 failed_steps = ?,
                 completed_at = ?,
                 duration_ms = ?,
                 error = ?
             WHERE id = ?",
        )
        .bind(run.status.as_str())
        .bind(i64::from(run.completed_steps))
        .bind(i64::from(run.failed_steps))
        .bind(run.completed_at.map(|value| value.to_rfc3339()))
        .bind(run.duration_ms)
        .bind(run.error.as_deref())
        .bind(&run.id.0)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound(format!("workflow run `{}`", run.id.0)));
        }
        Ok(())
    }

    async fn record_step_completed(&self, id: &WorkflowRunId) -> Result<(), RepositoryError> {
        self.bump_step(id, "completed_steps").await
    }

    async fn record_step_failed(&self, id: &WorkflowRunId) -> Result<(), RepositoryError> {
        self.bump_step(id, "failed_steps").await
    }

    async fn list_for_rfp(&self, rfp_id: &RfpId) -> Result<Vec<WorkflowRun>, RepositoryError> {
        let rows = sqlx::query(&format!(
            "SELECT {RUN_COLUMNS} FROM workflow_run WHERE rfp_id = ? ORDER BY run_number ASC"
        ))
        .bind(&rfp_id.0)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(run_from_row).collect()
    }
}

fn run_from_row(row: SqliteRow) -> Result<WorkflowRun, RepositoryError> {
    let trigger_raw = row.try_get::<String, _>("trigger_type")?;
    let status_raw = row.try_get::<String, _>("status")?;

    Ok(WorkflowRun {
        id: WorkflowRunId(row.try_get("id")?),
        rfp_id: RfpId(row.try_get("rfp_id")?),
        run_number: parse_u32("run_number", row.try_get("run_number")?)?,
        trigger_type: parse_enum("trigger_type", &trigger_raw, TriggerType::parse)?,
        trigger_reason: row.try_get("trigger_reason")?,
        triggered_by: row.try_get("triggered_by")?,
        status: parse_enum("status", &status_raw, RunStatus::parse)?,
        total_steps: parse_u32("total_steps", row.try_get("total_steps")?)?,
        completed_steps: parse_u32("completed_steps", row.try_get("completed_steps")?)?,
        failed_steps: parse_u32("failed_steps", row.try_get("failed_steps")?)?,
        started_at: parse_timestamp("started_at", row.try_get("started_at")?)?,
        completed_at: parse_optional_timestamp("completed_at", row.try_get("completed_at")?)?,
        duration_ms: row.try_get("duration_ms")?,
        error: row.try_get("error")?,
    })
}
