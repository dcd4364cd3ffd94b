pub mod audit;
pub mod config;
pub mod domain;
pub mod errors;
pub mod pricing;

pub use chrono;
pub use rust_decimal;

pub use audit::{AuditCategory, AuditContext, AuditEvent, AuditOutcome, AuditSink};
pub use config::{AppConfig, ConfigError, LoadOptions};
pub use domain::analysis::{
    AnalysisSource, Competitiveness, PricingAnalysis, PricingLine, Priority, RfpResponse,
    SalesAnalysis, SkuMatch, TechnicalAnalysis,
};
pub use domain::product::{PricingTier, Product, ProductId};
pub use domain::rfp::{Requirement, RequirementId, Rfp, RfpId, RfpStatus};
pub use domain::workflow::{
    ActivityStatus, AgentActivity, AgentActivityId, AgentType, ModelDecision, ModelDecisionId,
    RunStatus, TaskComplexity, TriggerType, WorkflowRun, WorkflowRunId,
};
pub use errors::{ApplicationError, DomainError, InterfaceError};
