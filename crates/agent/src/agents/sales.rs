//! Step 1: sales triage. Never blocks the pipeline; a bad model reply degrades to defaults.

use async_trait::async_trait;
use serde::Deserialize;
use tracing::warn;

use rfpflow_core::domain::analysis::{AnalysisSource, Priority, SalesAnalysis};
use rfpflow_core::domain::rfp::Rfp;
use rfpflow_core::domain::workflow::{AgentType, TaskComplexity};
use rfpflow_db::RepositorySet;

use super::parse::{clean_list, parse_model_json, validate_number, ParseError};
use crate::gateway::{ModelGateway, ModelRequest};
use crate::runtime::{PipelineStep, StepContext, StepError};

const EXCERPT_CHARS: usize = 4_000;
const SYSTEM_PROMPT: &str = "You are a bid manager triaging incoming RFPs for an industrial \
supplier. Reply with a single JSON object and nothing else.";

#[derive(Debug, Deserialize)]
struct SalesReply {
    priority: String,
    strategic_value: Option<f64>,
    win_probability: Option<f64>,
    #[serde(default)]
    recommendations: Vec<String>,
    #[serde(default)]
    risks: Vec<String>,
    #[serde(default)]
    rationale: String,
}

pub struct SalesAgent {
    gateway: ModelGateway,
    repos: RepositorySet,
}

impl SalesAgent {
    pub fn new(gateway: ModelGateway, repos: RepositorySet) -> Self {
        Self { gateway, repos }
    }

    fn prompt(rfp: &Rfp) -> String {
        let deadline = rfp.deadline.map_or("not stated".to_string(), |deadline| deadline.to_rfc3339());
        let value = rfp.estimated_value.map_or("not stated".to_string(), |value| value.to_string());
        format!(
            "Assess this RFP.\n\nTitle: {}\nClient: {}\nDeadline: {deadline}\nEstimated value: {value}\n\n\
             Document excerpt:\n{}\n\n\
             Return JSON with keys: priority (HIGH|MEDIUM|LOW), strategic_value (1-10), \
             win_probability (0-1), recommendations (array of strings), risks (array of strings), \
             rationale (string).",
            rfp.title,
            rfp.client_name,
            rfp.excerpt(EXCERPT_CHARS)
        )
    }

    fn analysis_from_reply(
        ctx: &StepContext,
        reply: SalesReply,
    ) -> Result<SalesAnalysis, ParseError> {
        let priority = Priority::parse(&reply.priority)
            .ok_or_else(|| ParseError::Malformed(format!("unknown priority `{}`", reply.priority)))?;
        let strategic_value = validate_number(reply.strategic_value, 1.0, 10.0, 5.0).round();

        Ok(SalesAnalysis {
            workflow_run_id: ctx.workflow_run_id.clone(),
            rfp_id: ctx.rfp_id.clone(),
            priority,
            strategic_value: strategic_value as u8,
            win_probability: validate_number(reply.win_probability, 0.0, 1.0, 0.5),
            recommendations: clean_list(reply.recommendations),
            risks: clean_list(reply.risks),
            rationale: reply.rationale.trim().to_string(),
            source: AnalysisSource::Model,
        })
    }

    /// MEDIUM priority, value 5, even odds.
    pub fn default_analysis(ctx: &StepContext, reason: &str) -> SalesAnalysis {
        SalesAnalysis {
            workflow_run_id: ctx.workflow_run_id.clone(),
            rfp_id: ctx.rfp_id.clone(),
            priority: Priority::Medium,
            strategic_value: 5,
            win_probability: 0.5,
            recommendations: vec!["Review the RFP manually before committing bid resources".to_string()],
            risks: Vec::new(),
            rationale: format!("Default triage applied: {reason}"),
            source: AnalysisSource::Heuristic,
        }
    }
}

#[async_trait]
impl PipelineStep for SalesAgent {
    type Input = Rfp;
    type Output = SalesAnalysis;

    fn agent_type(&self) -> AgentType {
        AgentType::SalesScout
    }

    fn step_number(&self) -> u32 {
        1
    }

    fn name(&self) -> &'static str {
        "Sales Agent"
    }

    async fn run(&self, ctx: &StepContext, rfp: &Rfp) -> Result<SalesAnalysis, StepError> {
        let request = ModelRequest::new(Self::prompt(rfp), "sales_triage", TaskComplexity::Medium)
            .with_system_prompt(SYSTEM_PROMPT)
            .with_temperature(0.2)
            .for_activity(ctx.workflow_run_id.clone(), ctx.activity_id.clone());

        let analysis = match self.gateway.execute(request).await {
            Ok(text) => match parse_model_json::<SalesReply>(&text)
                .and_then(|reply| Self::analysis_from_reply(ctx, reply))
            {
                Ok(analysis) => analysis,
                Err(error) => {
                    warn!(
                        event_name = "agent.sales.parse_failed",
                        correlation_id = %ctx.workflow_run_id,
                        error = %error,
                        "sales triage reply unusable; applying default triage"
                    );
                    Self::default_analysis(ctx, &error.to_string())
                }
            },
            Err(error) => {
                warn!(
                    event_name = "agent.sales.model_failed",
                    correlation_id = %ctx.workflow_run_id,
                    error = %error,
                    "sales triage model call failed; applying default triage"
                );
                Self::default_analysis(ctx, &error.to_string())
            }
        };

        self.repos.analyses.save_sales(analysis.clone()).await?;
        Ok(analysis)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use rfpflow_core::audit::InMemoryAuditSink;
    use rfpflow_core::domain::analysis::{AnalysisSource, Priority};
    use rfpflow_core::domain::rfp::RfpId;
    use rfpflow_core::domain::workflow::{AgentActivityId, WorkflowRunId};
    use rfpflow_db::{DemoSeed, RepositorySet};

    use super::SalesAgent;
    use crate::gateway::ModelGateway;
    use crate::runtime::{PipelineStep, StepContext};
    use crate::test_support::ScriptedLlmClient;

    fn ctx() -> StepContext {
        StepContext {
            rfp_id: RfpId("rfp-demo-001".to_string()),
            workflow_run_id: WorkflowRunId("run-1".to_string()),
            step_number: 1,
            activity_id: AgentActivityId("act-1".to_string()),
            attempt: 0,
        }
    }

    fn agent(repos: &RepositorySet, primary: ScriptedLlmClient) -> SalesAgent {
        let gateway = ModelGateway::new(
            Arc::new(primary),
            Arc::new(ScriptedLlmClient::new("economy")),
            repos.decisions.clone(),
            Arc::new(InMemoryAuditSink::default()),
        );
        SalesAgent::new(gateway, repos.clone())
    }

    #[tokio::test]
    async fn model_reply_is_clamped_and_persisted() {
        let repos = RepositorySet::in_memory();
        let reply = r#"{"priority":"high","strategic_value":14,"win_probability":1.7,
            "recommendations":["Bid with copper option"," "],"risks":[],"rationale":"Key account"}"#;
        let agent = agent(&repos, ScriptedLlmClient::new("primary").respond(reply));

        let analysis = agent.run(&ctx(), &DemoSeed::rfp()).await.expect("run");

        assert_eq!(analysis.priority, Priority::High);
        assert_eq!(analysis.strategic_value, 10);
        assert_eq!(analysis.win_probability, 1.0);
        assert_eq!(analysis.recommendations, vec!["Bid with copper option".to_string()]);
        assert_eq!(analysis.source, AnalysisSource::Model);
        let stored = repos.analyses.find_sales(&ctx().workflow_run_id).await.expect("find");
        assert_eq!(stored, Some(analysis));
    }

    #[tokio::test]
    async fn unusable_reply_degrades_to_default_triage() {
        let repos = RepositorySet::in_memory();
        let agent = agent(&repos, ScriptedLlmClient::new("primary").respond("I think it is good"));

        let analysis = agent.run(&ctx(), &DemoSeed::rfp()).await.expect("run");

        assert_eq!(analysis.priority, Priority::Medium);
        assert_eq!(analysis.strategic_value, 5);
        assert_eq!(analysis.win_probability, 0.5);
        assert_eq!(analysis.source, AnalysisSource::Heuristic);
    }

    #[tokio::test]
    async fn model_outage_still_produces_an_analysis() {
        let repos = RepositorySet::in_memory();
        let agent = agent(&repos, ScriptedLlmClient::new("primary").fail("503"));

        let analysis = agent.run(&ctx(), &DemoSeed::rfp()).await.expect("run");

        assert_eq!(analysis.source, AnalysisSource::Heuristic);
        assert!(analysis.rationale.contains("503"));
    }
}
