use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use rfpflow_core::domain::analysis::{
    PricingAnalysis, RfpResponse, SalesAnalysis, TechnicalAnalysis,
};
use rfpflow_core::domain::product::{Product, ProductId};
use rfpflow_core::domain::rfp::{Requirement, Rfp, RfpId, RfpStatus};
use rfpflow_core::domain::workflow::{AgentActivity, ModelDecision, WorkflowRun, WorkflowRunId};

use crate::DbPool;

pub mod activity;
pub mod analysis;
pub mod decision;
pub mod memory;
pub mod product;
pub mod rfp;
pub mod run;

pub use activity::SqlAgentActivityRepository;
pub use analysis::SqlAnalysisRepository;
pub use decision::SqlModelDecisionRepository;
pub use memory::{
    InMemoryAgentActivityRepository, InMemoryAnalysisRepository, InMemoryModelDecisionRepository,
    InMemoryProductRepository, InMemoryRequirementRepository, InMemoryRfpRepository,
    InMemoryWorkflowRunRepository,
};
pub use product::SqlProductRepository;
pub use rfp::{SqlRequirementRepository, SqlRfpRepository};
pub use run::SqlWorkflowRunRepository;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("not found: {0}")]
    NotFound(String),
}

impl RepositoryError {
    pub(crate) fn from_write(error: sqlx::Error, conflict: impl FnOnce() -> String) -> Self {
        match &error {
            sqlx::Error::Database(db_error) if db_error.is_unique_violation() => {
                Self::Conflict(conflict())
            }
            _ => Self::Database(error),
        }
    }
}

#[async_trait]
pub trait RfpRepository: Send + Sync {
    async fn find_by_id(&self, id: &RfpId) -> Result<Option<Rfp>, RepositoryError>;
    async fn save(&self, rfp: Rfp) -> Result<(), RepositoryError>;
    async fn update_status(&self, id: &RfpId, status: RfpStatus) -> Result<(), RepositoryError>;
}

#[async_trait]
pub trait RequirementRepository: Send + Sync {
    /// Requirements in extraction order.
    async fn list_for_rfp(&self, rfp_id: &RfpId) -> Result<Vec<Requirement>, RepositoryError>;
    async fn save_all(
        &self,
        rfp_id: &RfpId,
        requirements: Vec<Requirement>,
    ) -> Result<(), RepositoryError>;
}

#[async_trait]
pub trait ProductRepository: Send + Sync {
    async fn find_by_id(&self, id: &ProductId) -> Result<Option<Product>, RepositoryError>;
    async fn save(&self, product: Product) -> Result<(), RepositoryError>;
    /// Active products ordered by sku.
    async fn list_active(&self) -> Result<Vec<Product>, RepositoryError>;
}

#[async_trait]
pub trait WorkflowRunRepository: Send + Sync {
    /// Inserts the run with the next run number for its RFP and returns the stored row.
    /// Fails with `Conflict` while another run for the same RFP is still active.
    async fn create(&self, run: WorkflowRun) -> Result<WorkflowRun, RepositoryError>;
    async fn find_by_id(&self, id: &WorkflowRunId) -> Result<Option<WorkflowRun>, RepositoryError>;
    async fn save(&self, run: WorkflowRun) -> Result<(), RepositoryError>;
    async fn record_step_completed(&self, id: &WorkflowRunId) -> Result<(), RepositoryError>;
    async fn record_step_failed(&self, id: &WorkflowRunId) -> Result<(), RepositoryError>;
    /// Runs ordered by run number.
    async fn list_for_rfp(&self, rfp_id: &RfpId) -> Result<Vec<WorkflowRun>, RepositoryError>;
}

#[async_trait]
pub trait AgentActivityRepository: Send + Sync {
    async fn create(&self, activity: AgentActivity) -> Result<(), RepositoryError>;
    async fn save(&self, activity: AgentActivity) -> Result<(), RepositoryError>;
    /// Activities ordered by step number, then start time.
    async fn list_for_run(
        &self,
        run_id: &WorkflowRunId,
    ) -> Result<Vec<AgentActivity>, RepositoryError>;
}

#[async_trait]
pub trait ModelDecisionRepository: Send + Sync {
    async fn create(&self, decision: ModelDecision) -> Result<(), RepositoryError>;
    async fn save(&self, decision: ModelDecision) -> Result<(), RepositoryError>;
    async fn list_for_run(
        &self,
        run_id: &WorkflowRunId,
    ) -> Result<Vec<ModelDecision>, RepositoryError>;
}

#[async_trait]
pub trait AnalysisRepository: Send + Sync {
    async fn save_sales(&self, analysis: SalesAnalysis) -> Result<(), RepositoryError>;
    async fn find_sales(
        &self,
        run_id: &WorkflowRunId,
    ) -> Result<Option<SalesAnalysis>, RepositoryError>;

    /// Replaces the analysis and its ranked SKU matches in one transaction.
    async fn save_technical(&self, analysis: TechnicalAnalysis) -> Result<(), RepositoryError>;
    async fn find_technical(
        &self,
        run_id: &WorkflowRunId,
    ) -> Result<Option<TechnicalAnalysis>, RepositoryError>;

    async fn save_pricing(&self, analysis: PricingAnalysis) -> Result<(), RepositoryError>;
    async fn find_pricing(
        &self,
        run_id: &WorkflowRunId,
    ) -> Result<Option<PricingAnalysis>, RepositoryError>;

    async fn save_response(&self, response: RfpResponse) -> Result<(), RepositoryError>;
    async fn find_response(
        &self,
        run_id: &WorkflowRunId,
    ) -> Result<Option<RfpResponse>, RepositoryError>;
}

/// Every store the workflow engine touches, shared behind `Arc`s.
#[derive(Clone)]
pub struct RepositorySet {
    pub rfps: Arc<dyn RfpRepository>,
    pub requirements: Arc<dyn RequirementRepository>,
    pub products: Arc<dyn ProductRepository>,
    pub runs: Arc<dyn WorkflowRunRepository>,
    pub activities: Arc<dyn AgentActivityRepository>,
    pub decisions: Arc<dyn ModelDecisionRepository>,
    pub analyses: Arc<dyn AnalysisRepository>,
}

impl RepositorySet {
    pub fn sqlite(pool: DbPool) -> Self {
        Self {
            rfps: Arc::new(SqlRfpRepository::new(pool.clone())),
            requirements: Arc::new(SqlRequirementRepository::new(pool.clone())),
            products: Arc::new(SqlProductRepository::new(pool.clone())),
            runs: Arc::new(SqlWorkflowRunRepository::new(pool.clone())),
            activities: Arc::new(SqlAgentActivityRepository::new(pool.clone())),
            decisions: Arc::new(SqlModelDecisionRepository::new(pool.clone())),
            analyses: Arc::new(SqlAnalysisRepository::new(pool)),
        }
    }

    pub fn in_memory() -> Self {
        Self {
            rfps: Arc::new(InMemoryRfpRepository::default()),
            requirements: Arc::new(InMemoryRequirementRepository::default()),
            products: Arc::new(InMemoryProductRepository::default()),
            runs: Arc::new(InMemoryWorkflowRunRepository::default()),
            activities: Arc::new(InMemoryAgentActivityRepository::default()),
            decisions: Arc::new(InMemoryModelDecisionRepository::default()),
            analyses: Arc::new(InMemoryAnalysisRepository::default()),
        }
    }
}

pub(crate) mod codec {
    use chrono::{DateTime, Utc};
    use rust_decimal::Decimal;
    use serde::{de::DeserializeOwned, Serialize};

    use super::RepositoryError;

    pub fn parse_u32(column: &str, value: i64) -> Result<u32, RepositoryError> {
        u32::try_from(value).map_err(|_| {
            RepositoryError::Decode(format!(
                "invalid value for `{column}` (expected non-negative u32): {value}"
            ))
        })
    }

    pub fn parse_optional_u32(
        column: &str,
        value: Option<i64>,
    ) -> Result<Option<u32>, RepositoryError> {
        value.map(|raw| parse_u32(column, raw)).transpose()
    }

    pub fn parse_timestamp(column: &str, value: String) -> Result<DateTime<Utc>, RepositoryError> {
        DateTime::parse_from_rfc3339(&value)
            .map(|timestamp| timestamp.with_timezone(&Utc))
            .map_err(|error| {
                RepositoryError::Decode(format!(
                    "invalid timestamp in `{column}`: `{value}` ({error})"
                ))
            })
    }

    pub fn parse_optional_timestamp(
        column: &str,
        value: Option<String>,
    ) -> Result<Option<DateTime<Utc>>, RepositoryError> {
        value.map(|timestamp| parse_timestamp(column, timestamp)).transpose()
    }

    pub fn parse_decimal(column: &str, value: String) -> Result<Decimal, RepositoryError> {
        value.parse::<Decimal>().map_err(|error| {
            RepositoryError::Decode(format!("invalid decimal in `{column}`: `{value}` ({error})"))
        })
    }

    pub fn parse_json<T: DeserializeOwned>(column: &str, value: &str) -> Result<T, RepositoryError> {
        serde_json::from_str(value).map_err(|error| {
            RepositoryError::Decode(format!("invalid json in `{column}`: {error}"))
        })
    }

    pub fn to_json<T: Serialize + ?Sized>(column: &str, value: &T) -> Result<String, RepositoryError> {
        serde_json::to_string(value).map_err(|error| {
            RepositoryError::Decode(format!("could not encode `{column}` as json: {error}"))
        })
    }

    pub fn parse_enum<T>(
        column: &str,
        value: &str,
        parse: impl FnOnce(&str) -> Option<T>,
    ) -> Result<T, RepositoryError> {
        parse(value)
            .ok_or_else(|| RepositoryError::Decode(format!("unknown `{column}` value `{value}`")))
    }
}
