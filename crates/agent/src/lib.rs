//! Workflow engine for RFP responses.
//!
//! A run walks four steps in order: sales triage, technical matching, pricing and response
//! synthesis. Every step runs inside the [`runtime::AgentRuntime`], which owns activity records and
//! retry with backoff. Model calls go through the [`gateway::ModelGateway`], which routes by task
//! complexity and falls back once to the alternate provider tier.
//!
//! # Safety Principle
//!
//! The model never decides prices. Unit prices, totals and the competitiveness band come from
//! `rfpflow_core::pricing`; model output is validated and clamped before anything is persisted.

use std::sync::Arc;

use anyhow::{Context, Result};

use rfpflow_core::audit::AuditSink;
use rfpflow_core::config::AppConfig;
use rfpflow_db::RepositorySet;

pub mod agents;
pub mod gateway;
pub mod llm;
pub mod orchestrator;
pub mod providers;
pub mod runtime;

#[cfg(test)]
pub(crate) mod test_support;

pub use gateway::{ModelExecutionError, ModelGateway, ModelRequest};
pub use llm::{Completion, CompletionRequest, LlmClient};
pub use orchestrator::{
    Orchestrator, PipelineAgents, StartWorkflow, WorkflowError, WorkflowLaunch, WorkflowReceipt,
    WorkflowStatus, BUSINESS_STOP_MESSAGE,
};
pub use runtime::{AgentRuntime, PipelineStep, RetryPolicy, StepContext, StepError, StepOutcome};

/// Wires provider clients, gateway, runtime and agents from configuration.
pub fn build_orchestrator(
    config: &AppConfig,
    repos: RepositorySet,
    audit: Arc<dyn AuditSink>,
) -> Result<Orchestrator> {
    let primary = providers::build_client(&config.llm.primary, config.llm.timeout_secs)
        .context("failed to build primary model client")?;
    let fallback = providers::build_client(&config.llm.fallback, config.llm.timeout_secs)
        .context("failed to build fallback model client")?;

    let gateway = ModelGateway::new(primary, fallback, repos.decisions.clone(), audit);
    let runtime = AgentRuntime::new(
        repos.activities.clone(),
        repos.runs.clone(),
        RetryPolicy::from_config(&config.workflow),
        Arc::new(runtime::TokioSleeper),
    );
    let agents = PipelineAgents::new(gateway, repos.clone(), &config.workflow);

    Ok(Orchestrator::new(repos, runtime, agents))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use rfpflow_core::audit::InMemoryAuditSink;
    use rfpflow_core::config::AppConfig;
    use rfpflow_db::RepositorySet;

    use super::build_orchestrator;

    #[test]
    fn default_config_wires_an_orchestrator() {
        let result = build_orchestrator(
            &AppConfig::default(),
            RepositorySet::in_memory(),
            Arc::new(InMemoryAuditSink::default()),
        );
        assert!(result.is_ok());
    }

    #[test]
    fn hosted_provider_without_key_is_rejected() {
        let mut config = AppConfig::default();
        config.llm.primary.provider = rfpflow_core::config::LlmProvider::Anthropic;

        let error = build_orchestrator(
            &config,
            RepositorySet::in_memory(),
            Arc::new(InMemoryAuditSink::default()),
        )
        .err()
        .expect("missing key");
        assert!(format!("{error:#}").contains("api key"));
    }
}
