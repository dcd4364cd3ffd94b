//! Step 4: final response synthesis from the three earlier outputs.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::warn;

use rfpflow_core::domain::analysis::{PricingAnalysis, RfpResponse, SalesAnalysis, TechnicalAnalysis};
use rfpflow_core::domain::rfp::Rfp;
use rfpflow_core::domain::workflow::{AgentType, TaskComplexity};
use rfpflow_db::RepositorySet;

use super::parse::{clean_list, parse_model_json, ParseError};
use crate::gateway::{ModelGateway, ModelRequest};
use crate::runtime::{PipelineStep, StepContext, StepError};

const SYSTEM_PROMPT: &str = "You write formal, concise RFP responses for an industrial supplier. \
Never invent prices; use the bid total you are given. Reply with a single JSON object and nothing else.";

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ResponseInput {
    pub rfp: Rfp,
    pub sales: SalesAnalysis,
    pub technical: TechnicalAnalysis,
    pub pricing: PricingAnalysis,
}

#[derive(Debug, Deserialize)]
struct ResponseReply {
    executive_summary: String,
    #[serde(default)]
    compliance_statement: String,
    #[serde(default)]
    delivery_timeline: String,
    #[serde(default)]
    payment_terms: String,
    #[serde(default)]
    validity_period: String,
    #[serde(default)]
    key_highlights: Vec<String>,
}

pub struct ResponseAgent {
    gateway: ModelGateway,
    repos: RepositorySet,
}

impl ResponseAgent {
    pub fn new(gateway: ModelGateway, repos: RepositorySet) -> Self {
        Self { gateway, repos }
    }

    fn prompt(input: &ResponseInput) -> String {
        let matches = input
            .technical
            .top_matches
            .iter()
            .take(3)
            .map(|candidate| format!("- {} ({:.0}/100)", candidate.sku, candidate.match_score))
            .collect::<Vec<_>>()
            .join("\n");
        let lines = input
            .pricing
            .line_items
            .iter()
            .map(|line| format!("- {} x{} @ {}", line.sku, line.quantity, line.unit_price))
            .collect::<Vec<_>>()
            .join("\n");

        format!(
            "Draft the response to this RFP.\n\nTitle: {}\nClient: {}\n\
             Priority: {} (strategic value {}/10, win probability {:.2})\n\
             Recommendations: {}\n\nTop product matches:\n{matches}\n\
             Technical gaps: {}\n\nPriced lines:\n{lines}\nTotal bid price: {} \
             (competitiveness {})\n\n\
             Return JSON with keys: executive_summary, compliance_statement, delivery_timeline, \
             payment_terms, validity_period (strings) and key_highlights (array of strings).",
            input.rfp.title,
            input.rfp.client_name,
            input.sales.priority.as_str(),
            input.sales.strategic_value,
            input.sales.win_probability,
            input.sales.recommendations.join("; "),
            if input.technical.gaps.is_empty() {
                "none reported".to_string()
            } else {
                input.technical.gaps.join("; ")
            },
            input.pricing.total_bid_price,
            input.pricing.competitiveness.as_str(),
        )
    }

    fn response_from_reply(
        ctx: &StepContext,
        input: &ResponseInput,
        reply: ResponseReply,
    ) -> Result<RfpResponse, ParseError> {
        if reply.executive_summary.trim().is_empty() {
            return Err(ParseError::Malformed("executive_summary is empty".to_string()));
        }
        let or_default = |value: String, default: &str| {
            let value = value.trim().to_string();
            if value.is_empty() {
                default.to_string()
            } else {
                value
            }
        };

        Ok(RfpResponse {
            workflow_run_id: ctx.workflow_run_id.clone(),
            rfp_id: input.rfp.id.clone(),
            executive_summary: reply.executive_summary.trim().to_string(),
            compliance_statement: or_default(reply.compliance_statement, COMPLIANCE_BOILERPLATE),
            delivery_timeline: or_default(reply.delivery_timeline, DELIVERY_BOILERPLATE),
            payment_terms: or_default(reply.payment_terms, PAYMENT_BOILERPLATE),
            validity_period: or_default(reply.validity_period, VALIDITY_BOILERPLATE),
            key_highlights: clean_list(reply.key_highlights),
            total_bid_price: input.pricing.total_bid_price,
            is_fallback: false,
        })
    }

    /// Fixed boilerplate persisted when synthesis output is unusable.
    pub fn fallback_response(ctx: &StepContext, input: &ResponseInput) -> RfpResponse {
        RfpResponse {
            workflow_run_id: ctx.workflow_run_id.clone(),
            rfp_id: input.rfp.id.clone(),
            executive_summary: format!(
                "We are pleased to submit our proposal to {} for \"{}\". Our offer covers the \
                 requirements identified in the tender documents at a total bid price of {}.",
                input.rfp.client_name, input.rfp.title, input.pricing.total_bid_price
            ),
            compliance_statement: COMPLIANCE_BOILERPLATE.to_string(),
            delivery_timeline: DELIVERY_BOILERPLATE.to_string(),
            payment_terms: PAYMENT_BOILERPLATE.to_string(),
            validity_period: VALIDITY_BOILERPLATE.to_string(),
            key_highlights: input
                .pricing
                .line_items
                .iter()
                .map(|line| format!("{} x{}", line.sku, line.quantity))
                .collect(),
            total_bid_price: input.pricing.total_bid_price,
            is_fallback: true,
        }
    }
}

const COMPLIANCE_BOILERPLATE: &str =
    "The offered products comply with the technical specifications stated in the RFP, subject to the clarifications listed in this response.";
const DELIVERY_BOILERPLATE: &str = "Delivery within 6 to 8 weeks from receipt of purchase order.";
const PAYMENT_BOILERPLATE: &str = "30% advance with order, 70% within 30 days of delivery.";
const VALIDITY_BOILERPLATE: &str = "This offer is valid for 90 days from the date of submission.";

#[async_trait]
impl PipelineStep for ResponseAgent {
    type Input = ResponseInput;
    type Output = RfpResponse;

    fn agent_type(&self) -> AgentType {
        AgentType::Orchestrator
    }

    fn step_number(&self) -> u32 {
        4
    }

    fn name(&self) -> &'static str {
        "Response Agent"
    }

    async fn run(&self, ctx: &StepContext, input: &ResponseInput) -> Result<RfpResponse, StepError> {
        let request =
            ModelRequest::new(Self::prompt(input), "response_synthesis", TaskComplexity::Critical)
                .with_system_prompt(SYSTEM_PROMPT)
                .with_temperature(0.3)
                .for_activity(ctx.workflow_run_id.clone(), ctx.activity_id.clone());

        let reason = match self.gateway.execute(request).await {
            Ok(text) => match parse_model_json::<ResponseReply>(&text)
                .and_then(|reply| Self::response_from_reply(ctx, input, reply))
            {
                Ok(response) => {
                    self.repos.analyses.save_response(response.clone()).await?;
                    return Ok(response);
                }
                Err(error) => error.to_string(),
            },
            Err(error) => error.to_string(),
        };

        warn!(
            event_name = "agent.response.fallback",
            correlation_id = %ctx.workflow_run_id,
            reason = %reason,
            "response synthesis unusable; persisting boilerplate response"
        );
        let response = Self::fallback_response(ctx, input);
        self.repos.analyses.save_response(response.clone()).await?;
        Ok(response)
    }
}
