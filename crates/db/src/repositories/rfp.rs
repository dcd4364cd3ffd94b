use chrono::Utc;
use sqlx::{sqlite::SqliteRow, Row};

use rfpflow_core::domain::rfp::{Requirement, RequirementId, Rfp, RfpId, RfpStatus};

use super::codec::{
    parse_decimal, parse_enum, parse_optional_timestamp, parse_optional_u32, parse_timestamp,
};
use super::{RepositoryError, RequirementRepository, RfpRepository};
use crate::DbPool;

pub struct SqlRfpRepository {
    pool: DbPool,
}

impl SqlRfpRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl RfpRepository for SqlRfpRepository {
    async fn find_by_id(&self, id: &RfpId) -> Result<Option<Rfp>, RepositoryError> {
        let row = sqlx::query(
            "SELECT id, title, client_name, status, deadline, estimated_value, document_text,
                    created_at
             FROM rfp WHERE id = ?",
        )
        .bind(&id.0)
        .fetch_optional(&self.pool)
        .await?;

        row.map(rfp_from_row).transpose()
    }

    async fn save(&self, rfp: Rfp) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO rfp (id, title, client_name, status, deadline, estimated_value,
                              document_text, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                 title = excluded.title,
                 client_name = excluded.client_name,
                 status = excluded.status,
                 deadline = excluded.deadline,
                 estimated_value = excluded.estimated_value,
                 document_text = excluded.document_text,
                 updated_at = excluded.updated_at",
        )
        .bind(&rfp.id.0)
        .bind(&rfp.title)
        .bind(&rfp.client_name)
        .bind(rfp.status.as_str())
        .bind(rfp.deadline.map(|value| value.to_rfc3339()))
        .bind(rfp.estimated_value.map(|value| value.to_string()))
        .bind(&rfp.document_text)
        .bind(rfp.created_at.to_rfc3339())
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn update_status(&self, id: &RfpId, status: RfpStatus) -> Result<(), RepositoryError> {
        let result = sqlx::query("UPDATE rfp SET status = ?, updated_at = ? WHERE id = ?")
            .bind(status.as_str())
            .bind(Utc::now().to_rfc3339())
            .bind(&id.0)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound(format!("rfp `{}`", id.0)));
        }
        Ok(())
    }
}

fn rfp_from_row(row: SqliteRow) -> Result<Rfp, RepositoryError> {
    let status_raw = row.try_get::<String, _>("status")?;

    Ok(Rfp {
        id: RfpId(row.try_get("id")?),
        title: row.try_get("title")?,
        client_name: row.try_get("client_name")?,
        status: parse_enum("status", &status_raw, RfpStatus::parse)?,
        deadline: parse_optional_timestamp("deadline", row.try_get("deadline")?)?,
        estimated_value: row
            .try_get::<Option<String>, _>("estimated_value")?
            .map(|value| parse_decimal("estimated_value", value))
            .transpose()?,
        document_text: row.try_get("document_text")?,
        created_at: parse_timestamp("created_at", row.try_get("created_at")?)?,
    })
}

pub struct SqlRequirementRepository {
    pool: DbPool,
}

impl SqlRequirementRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl RequirementRepository for SqlRequirementRepository {
    async fn list_for_rfp(&self, rfp_id: &RfpId) -> Result<Vec<Requirement>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT id, rfp_id, category, section, text, mandatory, quantity, unit
             FROM rfp_requirement
             WHERE rfp_id = ?
             ORDER BY ordinal ASC",
        )
        .bind(&rfp_id.0)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(requirement_from_row).collect()
    }

    async fn save_all(
        &self,
        rfp_id: &RfpId,
        requirements: Vec<Requirement>,
    ) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let next_ordinal: i64 = sqlx::query_scalar(
            "SELECT COALESCE(MAX(ordinal), -1) + 1 FROM rfp_requirement WHERE rfp_id = ?",
        )
        .bind(&rfp_id.0)
        .fetch_one(&mut *tx)
        .await?;

        for (offset, requirement) in requirements.iter().enumerate() {
            sqlx::query(
                "INSERT INTO rfp_requirement (id, rfp_id, ordinal, category, section, text,
                                              mandatory, quantity, unit)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
                 ON CONFLICT(id) DO UPDATE SET
                     category = excluded.category,
                     section = excluded.section,
                     text = excluded.text,
                     mandatory = excluded.mandatory,
                     quantity = excluded.quantity,
                     unit = excluded.unit",
            )
            .bind(&requirement.id.0)
            .bind(&rfp_id.0)
            .bind(next_ordinal + offset as i64)
            .bind(&requirement.category)
            .bind(requirement.section.as_deref())
            .bind(&requirement.text)
            .bind(requirement.mandatory)
            .bind(requirement.quantity.map(i64::from))
            .bind(requirement.unit.as_deref())
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }
}

fn requirement_from_row(row: SqliteRow) -> Result<Requirement, RepositoryError> {
    Ok(Requirement {
        id: RequirementId(row.try_get("id")?),
        rfp_id: RfpId(row.try_get("rfp_id")?),
        category: row.try_get("category")?,
        section: row.try_get("section")?,
        text: row.try_get("text")?,
        mandatory: row.try_get("mandatory")?,
        quantity: parse_optional_u32("quantity", row.try_get("quantity")?)?,
        unit: row.try_get("unit")?,
    })
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};
    use rust_decimal::Decimal;

    use rfpflow_core::domain::rfp::{Requirement, RequirementId, Rfp, RfpId, RfpStatus};

    use super::{SqlRequirementRepository, SqlRfpRepository};
    use crate::repositories::{RepositoryError, RequirementRepository, RfpRepository};
    use crate::{connect_with_settings, migrations, DbPool};

    async fn setup() -> DbPool {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");
        pool
    }

    fn sample_rfp(id: &str) -> Rfp {
        Rfp {
            id: RfpId(id.to_string()),
            title: "Substation cabling".to_string(),
            client_name: "Northgrid Utilities".to_string(),
            status: RfpStatus::New,
            deadline: Some(Utc::now() + Duration::days(30)),
            estimated_value: Some(Decimal::new(1_250_000, 2)),
            document_text: "The supplier must deliver 10 drums of armoured cable.".to_string(),
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn rfp_round_trip_and_status_update() {
        let pool = setup().await;
        let repo = SqlRfpRepository::new(pool);
        let rfp = sample_rfp("RFP-100");

        repo.save(rfp.clone()).await.expect("save");
        repo.update_status(&rfp.id, RfpStatus::InProgress).await.expect("update status");

        let found = repo.find_by_id(&rfp.id).await.expect("find").expect("rfp should exist");
        assert_eq!(found.status, RfpStatus::InProgress);
        assert_eq!(found.estimated_value, rfp.estimated_value);
        assert_eq!(found.client_name, "Northgrid Utilities");
    }

    #[tokio::test]
    async fn update_status_on_missing_rfp_is_not_found() {
        let pool = setup().await;
        let repo = SqlRfpRepository::new(pool);

        let error = repo
            .update_status(&RfpId("RFP-missing".to_string()), RfpStatus::Review)
            .await
            .expect_err("missing rfp");
        assert!(matches!(error, RepositoryError::NotFound(_)));
    }

    #[tokio::test]
    async fn requirements_keep_extraction_order() {
        let pool = setup().await;
        SqlRfpRepository::new(pool.clone()).save(sample_rfp("RFP-200")).await.expect("save rfp");
        let repo = SqlRequirementRepository::new(pool);
        let rfp_id = RfpId("RFP-200".to_string());

        let requirements = ["zeta", "alpha", "mid"]
            .into_iter()
            .enumerate()
            .map(|(index, text)| Requirement {
                id: RequirementId(format!("REQ-{index}")),
                rfp_id: rfp_id.clone(),
                category: "technical".to_string(),
                section: None,
                text: text.to_string(),
                mandatory: index == 0,
                quantity: (index == 0).then_some(10),
                unit: (index == 0).then(|| "drums".to_string()),
            })
            .collect::<Vec<_>>();

        repo.save_all(&rfp_id, requirements.clone()).await.expect("save requirements");
        let found = repo.list_for_rfp(&rfp_id).await.expect("list");

        assert_eq!(found, requirements);
    }
}
