use chrono::Utc;
use sqlx::{sqlite::SqliteRow, Row};

use rfpflow_core::domain::analysis::{
    AnalysisSource, Competitiveness, PricingAnalysis, PricingLine, Priority, RfpResponse,
    SalesAnalysis, SkuMatch, TechnicalAnalysis,
};
use rfpflow_core::domain::product::ProductId;
use rfpflow_core::domain::rfp::{RequirementId, RfpId};
use rfpflow_core::domain::workflow::WorkflowRunId;

use super::codec::{parse_decimal, parse_enum, parse_json, parse_u32, to_json};
use super::{AnalysisRepository, RepositoryError};
use crate::DbPool;

pub struct SqlAnalysisRepository {
    pool: DbPool,
}

impl SqlAnalysisRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn parse_source(column: &str, value: &str) -> Result<AnalysisSource, RepositoryError> {
    parse_enum(column, value, |raw| match raw {
        "model" => Some(AnalysisSource::Model),
        "heuristic" => Some(AnalysisSource::Heuristic),
        "sample" => Some(AnalysisSource::Sample),
        _ => None,
    })
}

#[async_trait::async_trait]
impl AnalysisRepository for SqlAnalysisRepository {
    async fn save_sales(&self, analysis: SalesAnalysis) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO sales_analysis (workflow_run_id, rfp_id, priority, strategic_value,
                                         win_probability, recommendations_json, risks_json,
                                         rationale, source, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(workflow_run_id) DO UPDATE SET
                 priority = excluded.priority,
                 strategic_value = excluded.strategic_value,
                 win_probability = excluded.win_probability,
                 recommendations_json = excluded.recommendations_json,
                 risks_json = excluded.risks_json,
                 rationale = excluded.rationale,
                 source = excluded.source",
        )
        .bind(&analysis.workflow_run_id.0)
        .bind(&analysis.rfp_id.0)
        .bind(analysis.priority.as_str())
        .bind(i64::from(analysis.strategic_value))
        .bind(analysis.win_probability)
        .bind(to_json("recommendations_json", &analysis.recommendations)?)
        .bind(to_json("risks_json", &analysis.risks)?)
        .bind(&analysis.rationale)
        .bind(analysis.source.as_str())
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn find_sales(
        &self,
        run_id: &WorkflowRunId,
    ) -> Result<Option<SalesAnalysis>, RepositoryError> {
        let row = sqlx::query(
            "SELECT workflow_run_id, rfp_id, priority, strategic_value, win_probability,
                    recommendations_json, risks_json, rationale, source
             FROM sales_analysis WHERE workflow_run_id = ?",
        )
        .bind(&run_id.0)
        .fetch_optional(&self.pool)
        .await?;

        row.map(sales_from_row).transpose()
    }

    async fn save_technical(&self, analysis: TechnicalAnalysis) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "INSERT INTO technical_analysis (workflow_run_id, rfp_id, requirements_analyzed,
                                             gaps_json, risks_json, confidence, extraction_source,
                                             source, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(workflow_run_id) DO UPDATE SET
                 requirements_analyzed = excluded.requirements_analyzed,
                 gaps_json = excluded.gaps_json,
                 risks_json = excluded.risks_json,
                 confidence = excluded.confidence,
                 extraction_source = excluded.extraction_source,
                 source = excluded.source",
        )
        .bind(&analysis.workflow_run_id.0)
        .bind(&analysis.rfp_id.0)
        .bind(i64::from(analysis.requirements_analyzed))
        .bind(to_json("gaps_json", &analysis.gaps)?)
        .bind(to_json("risks_json", &analysis.risks)?)
        .bind(analysis.confidence)
        .bind(analysis.extraction_source.map(|source| source.as_str()))
        .bind(analysis.source.as_str())
        .bind(Utc::now().to_rfc3339())
        .execute(&mut *tx)
        .await?;

        sqlx::query("DELETE FROM sku_match WHERE workflow_run_id = ?")
            .bind(&analysis.workflow_run_id.0)
            .execute(&mut *tx)
            .await?;

        for (rank, sku_match) in analysis.top_matches.iter().enumerate() {
            sqlx::query(
                "INSERT INTO sku_match (workflow_run_id, rank, requirement_id, product_id, sku,
                                        product_name, match_score, rationale, gaps_json)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(&analysis.workflow_run_id.0)
            .bind(rank as i64)
            .bind(sku_match.requirement_id.as_ref().map(|id| id.0.as_str()))
            .bind(&sku_match.product_id.0)
            .bind(&sku_match.sku)
            .bind(&sku_match.product_name)
            .bind(sku_match.match_score)
            .bind(&sku_match.rationale)
            .bind(to_json("gaps_json", &sku_match.gaps)?)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn find_technical(
        &self,
        run_id: &WorkflowRunId,
    ) -> Result<Option<TechnicalAnalysis>, RepositoryError> {
        let Some(row) = sqlx::query(
            "SELECT workflow_run_id, rfp_id, requirements_analyzed, gaps_json, risks_json,
                    confidence, extraction_source, source
             FROM technical_analysis WHERE workflow_run_id = ?",
        )
        .bind(&run_id.0)
        .fetch_optional(&self.pool)
        .await?
        else {
            return Ok(None);
        };

        let match_rows = sqlx::query(
            "SELECT requirement_id, product_id, sku, product_name, match_score, rationale,
                    gaps_json
             FROM sku_match WHERE workflow_run_id = ? ORDER BY rank ASC",
        )
        .bind(&run_id.0)
        .fetch_all(&self.pool)
        .await?;

        let mut analysis = technical_from_row(row)?;
        analysis.top_matches =
            match_rows.into_iter().map(sku_match_from_row).collect::<Result<Vec<_>, _>>()?;
        Ok(Some(analysis))
    }

    async fn save_pricing(&self, analysis: PricingAnalysis) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO pricing_analysis (workflow_run_id, rfp_id, line_items_json, products_cost,
                                           testing_cost, logistics_cost, compliance_cost,
                                           contingency, total_bid_price, competitiveness,
                                           assumptions_json, source, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(workflow_run_id) DO UPDATE SET
                 line_items_json = excluded.line_items_json,
                 products_cost = excluded.products_cost,
                 testing_cost = excluded.testing_cost,
                 logistics_cost = excluded.logistics_cost,
                 compliance_cost = excluded.compliance_cost,
                 contingency = excluded.contingency,
                 total_bid_price = excluded.total_bid_price,
                 competitiveness = excluded.competitiveness,
                 assumptions_json = excluded.assumptions_json,
                 source = excluded.source",
        )
        .bind(&analysis.workflow_run_id.0)
        .bind(&analysis.rfp_id.0)
        .bind(to_json("line_items_json", &analysis.line_items)?)
        .bind(analysis.products_cost.to_string())
        .bind(analysis.testing_cost.to_string())
        .bind(analysis.logistics_cost.to_string())
        .bind(analysis.compliance_cost.to_string())
        .bind(analysis.contingency.to_string())
        .bind(analysis.total_bid_price.to_string())
        .bind(analysis.competitiveness.as_str())
        .bind(to_json("assumptions_json", &analysis.assumptions)?)
        .bind(analysis.source.as_str())
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn find_pricing(
        &self,
        run_id: &WorkflowRunId,
    ) -> Result<Option<PricingAnalysis>, RepositoryError> {
        let row = sqlx::query(
            "SELECT workflow_run_id, rfp_id, line_items_json, products_cost, testing_cost,
                    logistics_cost, compliance_cost, contingency, total_bid_price,
                    competitiveness, assumptions_json, source
             FROM pricing_analysis WHERE workflow_run_id = ?",
        )
        .bind(&run_id.0)
        .fetch_optional(&self.pool)
        .await?;

        row.map(pricing_from_row).transpose()
    }

    async fn save_response(&self, response: RfpResponse) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO rfp_response (workflow_run_id, rfp_id, executive_summary,
                                       compliance_statement, delivery_timeline, payment_terms,
                                       validity_period, key_highlights_json, total_bid_price,
                                       is_fallback, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(workflow_run_id) DO UPDATE SET
                 executive_summary = excluded.executive_summary,
                 compliance_statement = excluded.compliance_statement,
                 delivery_timeline = excluded.delivery_timeline,
                 payment_terms = excluded.payment_terms,
                 validity_period = excluded.validity_period,
                 key_highlights_json = excluded.key_highlights_json,
                 total_bid_price = excluded.total_bid_price,
                 is_fallback = excluded.is_fallback",
        )
        .bind(&response.workflow_run_id.0)
        .bind(&response.rfp_id.0)
        .bind(&response.executive_summary)
        .bind(&response.compliance_statement)
        .bind(&response.delivery_timeline)
        .bind(&response.payment_terms)
        .bind(&response.validity_period)
        .bind(to_json("key_highlights_json", &response.key_highlights)?)
        .bind(response.total_bid_price.to_string())
        .bind(response.is_fallback)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn find_response(
        &self,
        run_id: &WorkflowRunId,
    ) -> Result<Option<RfpResponse>, RepositoryError> {
        let row = sqlx::query(
            "SELECT workflow_run_id, rfp_id, executive_summary, compliance_statement,
                    delivery_timeline, payment_terms, validity_period, key_highlights_json,
                    total_bid_price, is_fallback
             FROM rfp_response WHERE workflow_run_id = ?",
        )
        .bind(&run_id.0)
        .fetch_optional(&self.pool)
        .await?;

        row.map(response_from_row).transpose()
    }
}

fn sales_from_row(row: SqliteRow) -> Result<SalesAnalysis, RepositoryError> {
    let priority_raw = row.try_get::<String, _>("priority")?;
    let source_raw = row.try_get::<String, _>("source")?;
    let strategic_value = row.try_get::<i64, _>("strategic_value")?;

    Ok(SalesAnalysis {
        workflow_run_id: WorkflowRunId(row.try_get("workflow_run_id")?),
        rfp_id: RfpId(row.try_get("rfp_id")?),
        priority: parse_enum("priority", &priority_raw, Priority::parse)?,
        strategic_value: u8::try_from(strategic_value).map_err(|_| {
            RepositoryError::Decode(format!("invalid strategic_value: {strategic_value}"))
        })?,
        win_probability: row.try_get("win_probability")?,
        recommendations: parse_json(
            "recommendations_json",
            &row.try_get::<String, _>("recommendations_json")?,
        )?,
        risks: parse_json("risks_json", &row.try_get::<String, _>("risks_json")?)?,
        rationale: row.try_get("rationale")?,
        source: parse_source("source", &source_raw)?,
    })
}

fn technical_from_row(row: SqliteRow) -> Result<TechnicalAnalysis, RepositoryError> {
    let source_raw = row.try_get::<String, _>("source")?;

    Ok(TechnicalAnalysis {
        workflow_run_id: WorkflowRunId(row.try_get("workflow_run_id")?),
        rfp_id: RfpId(row.try_get("rfp_id")?),
        requirements_analyzed: parse_u32(
            "requirements_analyzed",
            row.try_get("requirements_analyzed")?,
        )?,
        top_matches: Vec::new(),
        gaps: parse_json("gaps_json", &row.try_get::<String, _>("gaps_json")?)?,
        risks: parse_json("risks_json", &row.try_get::<String, _>("risks_json")?)?,
        confidence: row.try_get("confidence")?,
        extraction_source: row
            .try_get::<Option<String>, _>("extraction_source")?
            .map(|raw| parse_source("extraction_source", &raw))
            .transpose()?,
        source: parse_source("source", &source_raw)?,
    })
}

fn sku_match_from_row(row: SqliteRow) -> Result<SkuMatch, RepositoryError> {
    Ok(SkuMatch {
        requirement_id: row.try_get::<Option<String>, _>("requirement_id")?.map(RequirementId),
        product_id: ProductId(row.try_get("product_id")?),
        sku: row.try_get("sku")?,
        product_name: row.try_get("product_name")?,
        match_score: row.try_get("match_score")?,
        rationale: row.try_get("rationale")?,
        gaps: parse_json("gaps_json", &row.try_get::<String, _>("gaps_json")?)?,
    })
}

fn pricing_from_row(row: SqliteRow) -> Result<PricingAnalysis, RepositoryError> {
    let competitiveness_raw = row.try_get::<String, _>("competitiveness")?;
    let source_raw = row.try_get::<String, _>("source")?;

    Ok(PricingAnalysis {
        workflow_run_id: WorkflowRunId(row.try_get("workflow_run_id")?),
        rfp_id: RfpId(row.try_get("rfp_id")?),
        line_items: parse_json::<Vec<PricingLine>>(
            "line_items_json",
            &row.try_get::<String, _>("line_items_json")?,
        )?,
        products_cost: parse_decimal("products_cost", row.try_get("products_cost")?)?,
        testing_cost: parse_decimal("testing_cost", row.try_get("testing_cost")?)?,
        logistics_cost: parse_decimal("logistics_cost", row.try_get("logistics_cost")?)?,
        compliance_cost: parse_decimal("compliance_cost", row.try_get("compliance_cost")?)?,
        contingency: parse_decimal("contingency", row.try_get("contingency")?)?,
        total_bid_price: parse_decimal("total_bid_price", row.try_get("total_bid_price")?)?,
        competitiveness: parse_enum(
            "competitiveness",
            &competitiveness_raw,
            Competitiveness::parse,
        )?,
        assumptions: parse_json(
            "assumptions_json",
            &row.try_get::<String, _>("assumptions_json")?,
        )?,
        source: parse_source("source", &source_raw)?,
    })
}

fn response_from_row(row: SqliteRow) -> Result<RfpResponse, RepositoryError> {
    Ok(RfpResponse {
        workflow_run_id: WorkflowRunId(row.try_get("workflow_run_id")?),
        rfp_id: RfpId(row.try_get("rfp_id")?),
        executive_summary: row.try_get("executive_summary")?,
        compliance_statement: row.try_get("compliance_statement")?,
        delivery_timeline: row.try_get("delivery_timeline")?,
        payment_terms: row.try_get("payment_terms")?,
        validity_period: row.try_get("validity_period")?,
        key_highlights: parse_json(
            "key_highlights_json",
            &row.try_get::<String, _>("key_highlights_json")?,
        )?,
        total_bid_price: parse_decimal("total_bid_price", row.try_get("total_bid_price")?)?,
        is_fallback: row.try_get("is_fallback")?,
    })
}
