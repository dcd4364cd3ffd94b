//! Step 3: bid pricing over the top technical matches.
//!
//! Product cost, totals and competitiveness are computed by `rfpflow_core::pricing`; the model
//! only estimates ancillary costs.

use std::collections::{BTreeSet, HashMap};

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::Deserialize;
use tracing::warn;

use rfpflow_core::domain::analysis::{
    AnalysisSource, PricingAnalysis, PricingLine, SkuMatch, TechnicalAnalysis,
};
use rfpflow_core::domain::rfp::RequirementId;
use rfpflow_core::domain::workflow::{AgentType, TaskComplexity};
use rfpflow_core::pricing::{
    competitiveness, line_total, resolve_unit_price, round_money, total_bid_price, CostBreakdown,
    FALLBACK_CONTINGENCY_PCT,
};
use rfpflow_db::RepositorySet;

use super::parse::{clean_list, parse_model_json, ParseError};
use crate::gateway::{ModelGateway, ModelRequest};
use crate::runtime::{PipelineStep, StepContext, StepError};

pub const PRICED_MATCHES: usize = 3;

const SYSTEM_PROMPT: &str = "You are a bid cost estimator. Product prices are already fixed; \
estimate only the ancillary costs. Reply with a single JSON object and nothing else.";

#[derive(Debug, Deserialize)]
struct CostReply {
    testing_cost: Option<Decimal>,
    logistics_cost: Option<Decimal>,
    compliance_cost: Option<Decimal>,
    contingency: Option<Decimal>,
    #[serde(default)]
    assumptions: Vec<String>,
}

pub struct PricingAgent {
    gateway: ModelGateway,
    repos: RepositorySet,
}

impl PricingAgent {
    pub fn new(gateway: ModelGateway, repos: RepositorySet) -> Self {
        Self { gateway, repos }
    }

    /// Prices each requirement once, with its best-scoring match among the top matches.
    async fn price_lines(
        &self,
        analysis: &TechnicalAnalysis,
        assumptions: &mut Vec<String>,
    ) -> Result<Vec<PricingLine>, StepError> {
        let quantities: HashMap<RequirementId, Option<u32>> = self
            .repos
            .requirements
            .list_for_rfp(&analysis.rfp_id)
            .await?
            .into_iter()
            .map(|requirement| (requirement.id, requirement.quantity))
            .collect();

        let mut priced_requirements = BTreeSet::new();
        let mut lines = Vec::new();
        for candidate in top_matches(&analysis.top_matches) {
            if let Some(requirement_id) = &candidate.requirement_id {
                if !priced_requirements.insert(requirement_id.0.clone()) {
                    continue;
                }
            }

            let Some(product) = self.repos.products.find_by_id(&candidate.product_id).await? else {
                assumptions.push(format!("{} is not in the catalog and was not priced", candidate.sku));
                continue;
            };

            let quantity = candidate
                .requirement_id
                .as_ref()
                .and_then(|id| quantities.get(id).copied().flatten())
                .filter(|quantity| *quantity > 0)
                .unwrap_or(1);
            let price = resolve_unit_price(&product, quantity);
            lines.push(PricingLine {
                product_id: product.id.clone(),
                sku: product.sku.clone(),
                requirement_id: candidate.requirement_id.clone(),
                quantity,
                unit_price: price.unit_price,
                line_total: line_total(price.unit_price, quantity),
                tier_applied: price.tier_applied,
            });
        }
        Ok(lines)
    }

    async fn estimate_costs(
        &self,
        ctx: &StepContext,
        lines: &[PricingLine],
        products_cost: Decimal,
    ) -> Result<(CostBreakdown, Vec<String>), String> {
        let mut listing = String::new();
        for line in lines {
            listing.push_str(&format!(
                "- {} x{} @ {} = {}\n",
                line.sku, line.quantity, line.unit_price, line.line_total
            ));
        }
        let prompt = format!(
            "Estimate ancillary costs for this bid.\n\nLine items:\n{listing}\nProducts cost: {products_cost}\n\n\
             Return JSON: {{\"testing_cost\": number, \"logistics_cost\": number, \
             \"compliance_cost\": number, \"contingency\": number, \"assumptions\": [string]}}"
        );
        let request = ModelRequest::new(prompt, "cost_estimation", TaskComplexity::Medium)
            .with_system_prompt(SYSTEM_PROMPT)
            .with_temperature(0.1)
            .for_activity(ctx.workflow_run_id.clone(), ctx.activity_id.clone());

        let text = self.gateway.execute(request).await.map_err(|error| error.to_string())?;
        let reply: CostReply = parse_model_json(&text).map_err(|error| error.to_string())?;
        validate_costs(reply, products_cost).map_err(|error| error.to_string())
    }
}

fn top_matches(matches: &[SkuMatch]) -> Vec<&SkuMatch> {
    let mut ranked: Vec<&SkuMatch> = matches.iter().collect();
    ranked.sort_by(|left, right| right.match_score.total_cmp(&left.match_score));
    ranked.truncate(PRICED_MATCHES);
    ranked
}

/// Each ancillary cost must be present and lie in `[0, products_cost]`.
fn validate_costs(
    reply: CostReply,
    products_cost: Decimal,
) -> Result<(CostBreakdown, Vec<String>), ParseError> {
    let field = |name: &str, value: Option<Decimal>| -> Result<Decimal, ParseError> {
        let value = value.ok_or_else(|| ParseError::Malformed(format!("missing `{name}`")))?;
        Ok(round_money(value.max(Decimal::ZERO).min(products_cost)))
    };
    let breakdown = CostBreakdown {
        testing: field("testing_cost", reply.testing_cost)?,
        logistics: field("logistics_cost", reply.logistics_cost)?,
        compliance: field("compliance_cost", reply.compliance_cost)?,
        contingency: field("contingency", reply.contingency)?,
    };
    Ok((breakdown, clean_list(reply.assumptions)))
}

#[async_trait]
impl PipelineStep for PricingAgent {
    type Input = TechnicalAnalysis;
    type Output = PricingAnalysis;

    fn agent_type(&self) -> AgentType {
        AgentType::PricingSpecialist
    }

    fn step_number(&self) -> u32 {
        3
    }

    fn name(&self) -> &'static str {
        "Pricing Agent"
    }

    async fn run(
        &self,
        ctx: &StepContext,
        technical: &TechnicalAnalysis,
    ) -> Result<PricingAnalysis, StepError> {
        let mut assumptions = Vec::new();
        let lines = self.price_lines(technical, &mut assumptions).await?;
        if lines.is_empty() {
            return Err(StepError::Invalid(
                "no top match could be priced against the catalog".to_string(),
            ));
        }

        let products_cost = round_money(lines.iter().map(|line| line.line_total).sum());
        let (breakdown, source) = match self.estimate_costs(ctx, &lines, products_cost).await {
            Ok((breakdown, model_assumptions)) => {
                assumptions.extend(model_assumptions);
                (breakdown, AnalysisSource::Model)
            }
            Err(reason) => {
                warn!(
                    event_name = "agent.pricing.estimate_fallback",
                    correlation_id = %ctx.workflow_run_id,
                    reason = %reason,
                    "cost estimate unavailable; applying flat contingency"
                );
                assumptions.push(format!(
                    "Ancillary cost estimate unavailable; applied a flat {FALLBACK_CONTINGENCY_PCT}% contingency on products cost"
                ));
                (CostBreakdown::flat_contingency(products_cost), AnalysisSource::Heuristic)
            }
        };

        let total = total_bid_price(products_cost, &breakdown);
        let analysis = PricingAnalysis {
            workflow_run_id: ctx.workflow_run_id.clone(),
            rfp_id: technical.rfp_id.clone(),
            line_items: lines,
            products_cost,
            testing_cost: breakdown.testing,
            logistics_cost: breakdown.logistics,
            compliance_cost: breakdown.compliance,
            contingency: breakdown.contingency,
            total_bid_price: total,
            competitiveness: competitiveness(breakdown.contingency, total),
            assumptions,
            source,
        };
        self.repos.analyses.save_pricing(analysis.clone()).await?;
        Ok(analysis)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use rust_decimal::Decimal;

    use rfpflow_core::audit::InMemoryAuditSink;
    use rfpflow_core::domain::analysis::{
        AnalysisSource, Competitiveness, SkuMatch, TechnicalAnalysis,
    };
    use rfpflow_core::domain::product::ProductId;
    use rfpflow_core::domain::rfp::{RequirementId, RfpId};
    use rfpflow_core::domain::workflow::{AgentActivityId, WorkflowRunId};
    use rfpflow_db::{DemoSeed, RepositorySet};

    use super::PricingAgent;
    use crate::gateway::ModelGateway;
    use crate::runtime::{PipelineStep, StepContext, StepError};
    use crate::test_support::ScriptedLlmClient;

    fn ctx() -> StepContext {
        StepContext {
            rfp_id: RfpId("rfp-demo-001".to_string()),
            workflow_run_id: WorkflowRunId("run-1".to_string()),
            step_number: 3,
            activity_id: AgentActivityId("act-3".to_string()),
            attempt: 0,
        }
    }

    fn sku_match(product: &str, sku: &str, score: f64, requirement: Option<&str>) -> SkuMatch {
        SkuMatch {
            requirement_id: requirement.map(|id| RequirementId(id.to_string())),
            product_id: ProductId(product.to_string()),
            sku: sku.to_string(),
            product_name: sku.to_string(),
            match_score: score,
            rationale: String::new(),
            gaps: Vec::new(),
        }
    }

    fn technical(matches: Vec<SkuMatch>) -> TechnicalAnalysis {
        TechnicalAnalysis {
            workflow_run_id: WorkflowRunId("run-1".to_string()),
            rfp_id: RfpId("rfp-demo-001".to_string()),
            requirements_analyzed: 1,
            top_matches: matches,
            gaps: Vec::new(),
            risks: Vec::new(),
            confidence: 0.9,
            extraction_source: None,
            source: AnalysisSource::Model,
        }
    }

    fn demo_matches() -> Vec<SkuMatch> {
        vec![
            sku_match("prod-cbl-11kv-cu", "CBL-11KV-XLPE-CU", 85.0, Some("req-demo-001")),
            sku_match("prod-cbl-11kv-al", "CBL-11KV-XLPE-AL", 70.0, Some("req-demo-001")),
            sku_match("prod-joint-kit", "JNT-11KV-HS", 40.0, Some("req-demo-001")),
        ]
    }

    async fn agent(primary: ScriptedLlmClient) -> (PricingAgent, RepositorySet, Arc<ScriptedLlmClient>) {
        let repos = RepositorySet::in_memory();
        DemoSeed::load(&repos).await.expect("seed");
        let primary = Arc::new(primary);
        let gateway = ModelGateway::new(
            primary.clone(),
            Arc::new(ScriptedLlmClient::new("economy")),
            repos.decisions.clone(),
            Arc::new(InMemoryAuditSink::default()),
        );
        (PricingAgent::new(gateway, repos.clone()), repos, primary)
    }

    #[tokio::test]
    async fn failed_estimate_applies_flat_contingency() {
        let (agent, repos, primary) = agent(ScriptedLlmClient::new("primary").respond("no idea")).await;

        let pricing = agent.run(&ctx(), &technical(demo_matches())).await.expect("run");

        assert_eq!(pricing.line_items.len(), 1);
        assert_eq!(pricing.line_items[0].sku, "CBL-11KV-XLPE-CU");
        assert_eq!(pricing.line_items[0].unit_price, Decimal::new(245, 0));
        assert_eq!(pricing.products_cost, Decimal::new(2450, 0));
        assert_eq!(pricing.contingency, Decimal::new(245, 0));
        assert_eq!(pricing.total_bid_price, Decimal::new(2695, 0));
        assert_eq!(pricing.competitiveness, Competitiveness::Medium);
        assert_eq!(pricing.source, AnalysisSource::Heuristic);
        assert!(pricing.assumptions.iter().any(|note| note.contains("flat 10% contingency")));
        let prompts = primary.prompts();
        assert_eq!(prompts.len(), 1);
        assert!(prompts[0].contains("- CBL-11KV-XLPE-CU x10 @ "));
        assert!(!prompts[0].contains("CBL-11KV-XLPE-AL"));
        assert!(prompts[0].contains(&format!("Products cost: {}", pricing.products_cost)));
        let stored = repos.analyses.find_pricing(&ctx().workflow_run_id).await.expect("find");
        assert_eq!(stored, Some(pricing));
    }

    #[tokio::test]
    async fn model_estimate_is_clamped_and_summed() {
        let reply = r#"{"testing_cost":"120.50","logistics_cost":300,"compliance_cost":-40,
            "contingency":99999,"assumptions":["Delivery to site"]}"#;
        let (agent, _repos, _primary) = agent(ScriptedLlmClient::new("primary").respond(reply)).await;

        let pricing = agent.run(&ctx(), &technical(demo_matches())).await.expect("run");

        assert_eq!(pricing.testing_cost, Decimal::new(12050, 2));
        assert_eq!(pricing.compliance_cost, Decimal::ZERO);
        assert_eq!(pricing.contingency, Decimal::new(2450, 0));
        assert_eq!(pricing.total_bid_price, Decimal::new(532050, 2));
        assert_eq!(pricing.competitiveness, Competitiveness::High);
        assert_eq!(pricing.source, AnalysisSource::Model);
    }

    #[tokio::test]
    async fn matches_without_requirements_are_priced_individually() {
        let (agent, _repos, _primary) = agent(ScriptedLlmClient::new("primary")).await;
        let matches = vec![
            sku_match("prod-joint-kit", "JNT-11KV-HS", 50.0, None),
            sku_match("prod-cbl-11kv-al", "CBL-11KV-XLPE-AL", 45.0, None),
        ];

        let pricing = agent.run(&ctx(), &technical(matches)).await.expect("run");

        assert_eq!(pricing.line_items.len(), 2);
        assert!(pricing.line_items.iter().all(|line| line.quantity == 1));
        assert_eq!(pricing.products_cost, Decimal::new(275, 0));
    }

    #[tokio::test]
    async fn unpriceable_matches_are_a_step_error() {
        let (agent, _repos, _primary) = agent(ScriptedLlmClient::new("primary")).await;
        let matches = vec![sku_match("sample-product-1", "SAMPLE-SKU-1", 70.0, None)];

        let error = agent.run(&ctx(), &technical(matches)).await.expect_err("fails");

        assert!(matches!(error, StepError::Invalid(_)));
    }
}
