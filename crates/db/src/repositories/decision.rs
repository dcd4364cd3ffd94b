use sqlx::{sqlite::SqliteRow, Row};

use rfpflow_core::domain::workflow::{
    AgentActivityId, ModelDecision, ModelDecisionId, TaskComplexity, WorkflowRunId,
};

use super::codec::{parse_enum, parse_optional_u32, parse_timestamp, parse_u32};
use super::{ModelDecisionRepository, RepositoryError};
use crate::DbPool;

pub struct SqlModelDecisionRepository {
    pool: DbPool,
}

impl SqlModelDecisionRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl ModelDecisionRepository for SqlModelDecisionRepository {
    async fn create(&self, decision: ModelDecision) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO model_decision (id, workflow_run_id, agent_activity_id, primary_model,
                                         chosen_model, is_fallback, reason, task_type,
                                         task_complexity, estimated_tokens, actual_tokens_used,
                                         was_successful, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&decision.id.0)
        .bind(&decision.workflow_run_id.0)
        .bind(&decision.agent_activity_id.0)
        .bind(&decision.primary_model)
        .bind(&decision.chosen_model)
        .bind(decision.is_fallback)
        .bind(&decision.reason)
        .bind(&decision.task_type)
        .bind(decision.task_complexity.as_str())
        .bind(i64::from(decision.estimated_tokens))
        .bind(decision.actual_tokens_used.map(i64::from))
        .bind(decision.was_successful)
        .bind(decision.created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn save(&self, decision: ModelDecision) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            "UPDATE model_decision SET
                 chosen_model = ?,
                 is_fallback = ?,
                 reason = ?,
                 actual_tokens_used = ?,
                 was_successful = ?
             WHERE id = ?",
        )
        .bind(&decision.chosen_model)
        .bind(decision.is_fallback)
        .bind(&decision.reason)
        .bind(decision.actual_tokens_used.map(i64::from))
        .bind(decision.was_successful)
        .bind(&decision.id.0)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound(format!("model decision `{}`", decision.id.0)));
        }
        Ok(())
    }

    async fn list_for_run(
        &self,
        run_id: &WorkflowRunId,
    ) -> Result<Vec<ModelDecision>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT id, workflow_run_id, agent_activity_id, primary_model, chosen_model,
                    is_fallback, reason, task_type, task_complexity, estimated_tokens,
                    actual_tokens_used, was_successful, created_at
             FROM model_decision
             WHERE workflow_run_id = ?
             ORDER BY created_at ASC",
        )
        .bind(&run_id.0)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(decision_from_row).collect()
    }
}

fn decision_from_row(row: SqliteRow) -> Result<ModelDecision, RepositoryError> {
    let complexity_raw = row.try_get::<String, _>("task_complexity")?;

    Ok(ModelDecision {
        id: ModelDecisionId(row.try_get("id")?),
        workflow_run_id: WorkflowRunId(row.try_get("workflow_run_id")?),
        agent_activity_id: AgentActivityId(row.try_get("agent_activity_id")?),
        primary_model: row.try_get("primary_model")?,
        chosen_model: row.try_get("chosen_model")?,
        is_fallback: row.try_get("is_fallback")?,
        reason: row.try_get("reason")?,
        task_type: row.try_get("task_type")?,
        task_complexity: parse_enum("task_complexity", &complexity_raw, TaskComplexity::parse)?,
        estimated_tokens: parse_u32("estimated_tokens", row.try_get("estimated_tokens")?)?,
        actual_tokens_used: parse_optional_u32(
            "actual_tokens_used",
            row.try_get("actual_tokens_used")?,
        )?,
        was_successful: row.try_get("was_successful")?,
        created_at: parse_timestamp("created_at", row.try_get("created_at")?)?,
    })
}
