use sqlx::{sqlite::SqliteRow, Row};

use rfpflow_core::domain::workflow::{
    ActivityStatus, AgentActivity, AgentActivityId, AgentType, WorkflowRunId,
};

use super::codec::{
    parse_enum, parse_json, parse_optional_timestamp, parse_timestamp, parse_u32, to_json,
};
use super::{AgentActivityRepository, RepositoryError};
use crate::DbPool;

pub struct SqlAgentActivityRepository {
    pool: DbPool,
}

impl SqlAgentActivityRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl AgentActivityRepository for SqlAgentActivityRepository {
    async fn create(&self, activity: AgentActivity) -> Result<(), RepositoryError> {
        let input_data =
            activity.input_data.as_ref().map(|value| to_json("input_data", value)).transpose()?;
        let output_data =
            activity.output_data.as_ref().map(|value| to_json("output_data", value)).transpose()?;

        sqlx::query(
            "INSERT INTO agent_activity (id, workflow_run_id, agent_type, status, step_number,
                                         input_data, output_data, error, retry_count, max_retries,
                                         started_at, completed_at, duration_ms)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&activity.id.0)
        .bind(&activity.workflow_run_id.0)
        .bind(activity.agent_type.as_str())
        .bind(activity.status.as_str())
        .bind(i64::from(activity.step_number))
        .bind(input_data)
        .bind(output_data)
        .bind(activity.error.as_deref())
        .bind(i64::from(activity.retry_count))
        .bind(i64::from(activity.max_retries))
        .bind(activity.started_at.to_rfc3339())
        .bind(activity.completed_at.map(|value| value.to_rfc3339()))
        .bind(activity.duration_ms)
        .execute(&self.pool)
        .await
        .map_err(|error| {
            RepositoryError::from_write(error, || {
                format!("agent activity `{}` already exists", activity.id.0)
            })
        })?;

        Ok(())
    }

    async fn save(&self, activity: AgentActivity) -> Result<(), RepositoryError> {
        let output_data =
            activity.output_data.as_ref().map(|value| to_json("output_data", value)).transpose()?;

        let result = sqlx::query(
            "UPDATE agent_activity SET
                 status = ?,
                 output_data = ?,
                 error = ?,
                 retry_count = ?,
                 completed_at = ?,
                 duration_ms = ?
             WHERE id = ?",
        )
        .bind(activity.status.as_str())
        .bind(output_data)
        .bind(activity.error.as_deref())
        .bind(i64::from(activity.retry_count))
        .bind(activity.completed_at.map(|value| value.to_rfc3339()))
        .bind(activity.duration_ms)
        .bind(&activity.id.0)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound(format!("agent activity `{}`", activity.id.0)));
        }
        Ok(())
    }

    async fn list_for_run(
        &self,
        run_id: &WorkflowRunId,
    ) -> Result<Vec<AgentActivity>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT id, workflow_run_id, agent_type, status, step_number, input_data, output_data,
                    error, retry_count, max_retries, started_at, completed_at, duration_ms
             FROM agent_activity
             WHERE workflow_run_id = ?
             ORDER BY step_number ASC, started_at ASC",
        )
        .bind(&run_id.0)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(activity_from_row).collect()
    }
}

fn activity_from_row(row: SqliteRow) -> Result<AgentActivity, RepositoryError> {
    let agent_type_raw = row.try_get::<String, _>("agent_type")?;
    let status_raw = row.try_get::<String, _>("status")?;

    Ok(AgentActivity {
        id: AgentActivityId(row.try_get("id")?),
        workflow_run_id: WorkflowRunId(row.try_get("workflow_run_id")?),
        agent_type: parse_enum("agent_type", &agent_type_raw, AgentType::parse)?,
        status: parse_enum("status", &status_raw, ActivityStatus::parse)?,
        step_number: parse_u32("step_number", row.try_get("step_number")?)?,
        input_data: row
            .try_get::<Option<String>, _>("input_data")?
            .map(|raw| parse_json("input_data", &raw))
            .transpose()?,
        output_data: row
            .try_get::<Option<String>, _>("output_data")?
            .map(|raw| parse_json("output_data", &raw))
            .transpose()?,
        error: row.try_get("error")?,
        retry_count: parse_u32("retry_count", row.try_get("retry_count")?)?,
        max_retries: parse_u32("max_retries", row.try_get("max_retries")?)?,
        started_at: parse_timestamp("started_at", row.try_get("started_at")?)?,
        completed_at: parse_optional_timestamp("completed_at", row.try_get("completed_at")?)?,
        duration_ms: row.try_get("duration_ms")?,
    })
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use serde_json::json;

    use rfpflow_core::domain::rfp::{Rfp, RfpId, RfpStatus};
    use rfpflow_core::domain::workflow::{
        ActivityStatus, AgentActivity, AgentType, RunStatus, TriggerType, WorkflowRun,
    };

    use super::SqlAgentActivityRepository;
    use crate::repositories::{
        AgentActivityRepository, RfpRepository, SqlRfpRepository, SqlWorkflowRunRepository,
        WorkflowRunRepository,
    };
    use crate::{connect_with_settings, migrations};

    #[tokio::test]
    async fn retries_update_the_same_activity_row() {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");
        SqlRfpRepository::new(pool.clone())
            .save(Rfp {
                id: RfpId("RFP-A".to_string()),
                title: "Switchgear".to_string(),
                client_name: "Harbour Authority".to_string(),
                status: RfpStatus::InProgress,
                deadline: None,
                estimated_value: None,
                document_text: String::new(),
                created_at: Utc::now(),
            })
            .await
            .expect("seed rfp");
        let mut run =
            WorkflowRun::new(RfpId("RFP-A".to_string()), TriggerType::Manual, None, None);
        run.transition_to(RunStatus::Running).expect("start");
        let run = SqlWorkflowRunRepository::new(pool.clone()).create(run).await.expect("run");

        let repo = SqlAgentActivityRepository::new(pool);
        let mut activity = AgentActivity::start(
            run.id.clone(),
            AgentType::PricingSpecialist,
            3,
            Some(json!({"matches": 3})),
            3,
        );
        repo.create(activity.clone()).await.expect("create");

        activity.mark_retrying("model timed out");
        repo.save(activity.clone()).await.expect("save retrying");
        activity.begin_retry().expect("begin retry");
        activity.mark_completed(json!({"total_bid_price": "2695"}), Utc::now());
        repo.save(activity.clone()).await.expect("save completed");

        let stored = repo.list_for_run(&run.id).await.expect("list");
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].status, ActivityStatus::Completed);
        assert_eq!(stored[0].retry_count, 1);
        assert_eq!(stored[0].input_data, Some(json!({"matches": 3})));
        assert_eq!(stored[0].output_data, Some(json!({"total_bid_price": "2695"})));
    }
}
