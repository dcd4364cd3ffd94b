use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::product::ProductId;
use crate::domain::rfp::{RequirementId, RfpId};
use crate::domain::workflow::WorkflowRunId;

/// Where an agent output came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisSource {
    Model,
    Heuristic,
    Sample,
}

impl AnalysisSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Model => "model",
            Self::Heuristic => "heuristic",
            Self::Sample => "sample",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Priority {
    High,
    Medium,
    Low,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::High => "high",
            Self::Medium => "medium",
            Self::Low => "low",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "high" => Some(Self::High),
            "medium" => Some(Self::Medium),
            "low" => Some(Self::Low),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SalesAnalysis {
    pub workflow_run_id: WorkflowRunId,
    pub rfp_id: RfpId,
    pub priority: Priority,
    /// 1..=10
    pub strategic_value: u8,
    /// 0.0..=1.0
    pub win_probability: f64,
    pub recommendations: Vec<String>,
    pub risks: Vec<String>,
    pub rationale: String,
    pub source: AnalysisSource,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SkuMatch {
    pub requirement_id: Option<RequirementId>,
    pub product_id: ProductId,
    pub sku: String,
    pub product_name: String,
    /// 0.0..=100.0
    pub match_score: f64,
    pub rationale: String,
    pub gaps: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TechnicalAnalysis {
    pub workflow_run_id: WorkflowRunId,
    pub rfp_id: RfpId,
    pub requirements_analyzed: u32,
    /// Ordered by descending match score.
    pub top_matches: Vec<SkuMatch>,
    pub gaps: Vec<String>,
    pub risks: Vec<String>,
    /// 0.0..=1.0
    pub confidence: f64,
    pub extraction_source: Option<AnalysisSource>,
    pub source: AnalysisSource,
}

impl TechnicalAnalysis {
    pub fn has_viable_matches(&self) -> bool {
        !self.top_matches.is_empty()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Competitiveness {
    High,
    Medium,
    Low,
}

impl Competitiveness {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::High => "high",
            Self::Medium => "medium",
            Self::Low => "low",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "high" => Some(Self::High),
            "medium" => Some(Self::Medium),
            "low" => Some(Self::Low),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PricingLine {
    pub product_id: ProductId,
    pub sku: String,
    pub requirement_id: Option<RequirementId>,
    pub quantity: u32,
    pub unit_price: Decimal,
    pub line_total: Decimal,
    pub tier_applied: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PricingAnalysis {
    pub workflow_run_id: WorkflowRunId,
    pub rfp_id: RfpId,
    pub line_items: Vec<PricingLine>,
    pub products_cost: Decimal,
    pub testing_cost: Decimal,
    pub logistics_cost: Decimal,
    pub compliance_cost: Decimal,
    pub contingency: Decimal,
    pub total_bid_price: Decimal,
    pub competitiveness: Competitiveness,
    pub assumptions: Vec<String>,
    pub source: AnalysisSource,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RfpResponse {
    pub workflow_run_id: WorkflowRunId,
    pub rfp_id: RfpId,
    pub executive_summary: String,
    pub compliance_statement: String,
    pub delivery_timeline: String,
    pub payment_terms: String,
    pub validity_period: String,
    pub key_highlights: Vec<String>,
    pub total_bid_price: Decimal,
    pub is_fallback: bool,
}
