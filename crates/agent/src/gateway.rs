//! Model gateway: one call signature over the configured provider tiers.
//!
//! Complexity picks the tier (LOW runs on the economy fallback tier, everything else on the
//! primary tier). A failed primary call gets exactly one attempt on the alternate tier; a call
//! that already started on the fallback tier has nowhere left to go.

use std::sync::Arc;

use chrono::Utc;
use thiserror::Error;
use tracing::{info, warn};

use rfpflow_core::audit::{fingerprint, AuditCategory, AuditContext, AuditOutcome, AuditSink};
use rfpflow_core::domain::workflow::{
    AgentActivityId, ModelDecision, ModelDecisionId, TaskComplexity, WorkflowRunId,
};
use rfpflow_db::repositories::ModelDecisionRepository;

use crate::llm::{Completion, CompletionRequest, LlmClient};

#[derive(Clone, Debug, PartialEq)]
pub struct ModelRequest {
    pub prompt: String,
    pub task_type: String,
    pub complexity: TaskComplexity,
    pub system_prompt: Option<String>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    pub run_id: Option<WorkflowRunId>,
    pub activity_id: Option<AgentActivityId>,
}

impl ModelRequest {
    pub fn new(
        prompt: impl Into<String>,
        task_type: impl Into<String>,
        complexity: TaskComplexity,
    ) -> Self {
        Self {
            prompt: prompt.into(),
            task_type: task_type.into(),
            complexity,
            system_prompt: None,
            temperature: None,
            max_tokens: None,
            run_id: None,
            activity_id: None,
        }
    }

    pub fn with_system_prompt(mut self, system_prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(system_prompt.into());
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    /// Ties the call to a run step so the model decision is recorded.
    pub fn for_activity(mut self, run_id: WorkflowRunId, activity_id: AgentActivityId) -> Self {
        self.run_id = Some(run_id);
        self.activity_id = Some(activity_id);
        self
    }

    fn completion_request(&self) -> CompletionRequest {
        CompletionRequest {
            prompt: self.prompt.clone(),
            system_prompt: self.system_prompt.clone(),
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        }
    }

    /// Rough four-characters-per-token estimate recorded on the decision.
    fn estimated_tokens(&self) -> u32 {
        let chars = self.prompt.chars().count()
            + self.system_prompt.as_deref().map_or(0, |system| system.chars().count());
        u32::try_from(chars / 4).unwrap_or(u32::MAX)
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ModelExecutionError {
    #[error("model `{model}` failed: {message}")]
    Provider { model: String, message: String },
    #[error("model `{model}` returned an empty response")]
    EmptyResponse { model: String },
    #[error(
        "primary model `{primary}` failed ({primary_error}); fallback model `{fallback}` failed ({fallback_error})"
    )]
    Exhausted { primary: String, primary_error: String, fallback: String, fallback_error: String },
}

#[derive(Clone)]
pub struct ModelGateway {
    primary: Arc<dyn LlmClient>,
    fallback: Arc<dyn LlmClient>,
    decisions: Arc<dyn ModelDecisionRepository>,
    audit: Arc<dyn AuditSink>,
}

impl ModelGateway {
    pub fn new(
        primary: Arc<dyn LlmClient>,
        fallback: Arc<dyn LlmClient>,
        decisions: Arc<dyn ModelDecisionRepository>,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        Self { primary, fallback, decisions, audit }
    }

    pub fn primary_model(&self) -> &str {
        self.primary.model()
    }

    pub fn fallback_model(&self) -> &str {
        self.fallback.model()
    }

    /// Selected client plus the alternate to try once if it fails.
    fn route(&self, complexity: TaskComplexity) -> (&Arc<dyn LlmClient>, Option<&Arc<dyn LlmClient>>) {
        match complexity {
            TaskComplexity::Low => (&self.fallback, None),
            TaskComplexity::Medium | TaskComplexity::High | TaskComplexity::Critical => {
                (&self.primary, Some(&self.fallback))
            }
        }
    }

    pub async fn execute(&self, request: ModelRequest) -> Result<String, ModelExecutionError> {
        let (selected, alternate) = self.route(request.complexity);
        let mut decision = self.open_decision(&request, selected.model()).await;
        let completion_request = request.completion_request();

        let primary_error = match self.attempt(selected, &request, &completion_request).await {
            Ok(completion) => {
                self.close_decision(decision, true, completion.tokens_used).await;
                return Ok(completion.text);
            }
            Err(error) => error,
        };

        let Some(alternate) = alternate else {
            self.close_decision(decision, false, None).await;
            return Err(primary_error);
        };

        warn!(
            event_name = "model.call.fallback",
            correlation_id = correlation_id(&request),
            task_type = %request.task_type,
            primary_model = selected.model(),
            fallback_model = alternate.model(),
            error = %primary_error,
            "primary model failed; retrying once on fallback tier"
        );
        if let Some(decision) = decision.as_mut() {
            decision.switch_to(
                alternate.model(),
                format!("primary model `{}` failed: {primary_error}", selected.model()),
            );
        }

        match self.attempt(alternate, &request, &completion_request).await {
            Ok(completion) => {
                self.close_decision(decision, true, completion.tokens_used).await;
                Ok(completion.text)
            }
            Err(fallback_error) => {
                self.close_decision(decision, false, None).await;
                Err(ModelExecutionError::Exhausted {
                    primary: selected.model().to_string(),
                    primary_error: primary_error.to_string(),
                    fallback: alternate.model().to_string(),
                    fallback_error: fallback_error.to_string(),
                })
            }
        }
    }

    async fn attempt(
        &self,
        client: &Arc<dyn LlmClient>,
        request: &ModelRequest,
        completion_request: &CompletionRequest,
    ) -> Result<Completion, ModelExecutionError> {
        let started = Utc::now();
        let result = match client.complete(completion_request).await {
            Ok(completion) if completion.text.trim().is_empty() => {
                Err(ModelExecutionError::EmptyResponse { model: client.model().to_string() })
            }
            Ok(completion) => Ok(completion),
            Err(error) => Err(ModelExecutionError::Provider {
                model: client.model().to_string(),
                message: format!("{error:#}"),
            }),
        };
        let latency_ms = (Utc::now() - started).num_milliseconds().max(0);

        let outcome = if result.is_ok() { AuditOutcome::Success } else { AuditOutcome::Failed };
        let context = AuditContext::new(
            None,
            request.run_id.clone(),
            correlation_id(request),
            "model-gateway",
        );
        let mut event = context
            .event("model.call", AuditCategory::Model, outcome)
            .with_metadata("provider", client.provider())
            .with_metadata("model", client.model())
            .with_metadata("task_type", request.task_type.as_str())
            .with_metadata("complexity", request.complexity.as_str())
            .with_metadata("prompt_fingerprint", fingerprint(&request.prompt))
            .with_metadata("latency_ms", latency_ms.to_string());
        if let Err(error) = &result {
            event = event.with_metadata("error", error.to_string());
        }
        self.audit.emit(event);

        match &result {
            Ok(completion) => info!(
                event_name = "model.call.succeeded",
                correlation_id = correlation_id(request),
                provider = client.provider(),
                model = client.model(),
                task_type = %request.task_type,
                tokens_used = completion.tokens_used,
                latency_ms,
                "model call succeeded"
            ),
            Err(error) => warn!(
                event_name = "model.call.failed",
                correlation_id = correlation_id(request),
                provider = client.provider(),
                model = client.model(),
                task_type = %request.task_type,
                latency_ms,
                error = %error,
                "model call failed"
            ),
        }

        result
    }

    async fn open_decision(&self, request: &ModelRequest, model: &str) -> Option<ModelDecision> {
        let (Some(run_id), Some(activity_id)) = (&request.run_id, &request.activity_id) else {
            return None;
        };

        let decision = ModelDecision {
            id: ModelDecisionId::generate(),
            workflow_run_id: run_id.clone(),
            agent_activity_id: activity_id.clone(),
            primary_model: model.to_string(),
            chosen_model: model.to_string(),
            is_fallback: false,
            reason: routing_reason(request.complexity),
            task_type: request.task_type.clone(),
            task_complexity: request.complexity,
            estimated_tokens: request.estimated_tokens(),
            actual_tokens_used: None,
            was_successful: None,
            created_at: Utc::now(),
        };

        if let Err(error) = self.decisions.create(decision.clone()).await {
            warn!(
                event_name = "model.decision.persist_failed",
                correlation_id = %run_id,
                error = %error,
                "could not record model decision"
            );
            return None;
        }
        Some(decision)
    }

    async fn close_decision(
        &self,
        decision: Option<ModelDecision>,
        was_successful: bool,
        tokens_used: Option<u32>,
    ) {
        let Some(mut decision) = decision else {
            return;
        };
        decision.resolve(was_successful, tokens_used);
        if let Err(error) = self.decisions.save(decision.clone()).await {
            warn!(
                event_name = "model.decision.persist_failed",
                correlation_id = %decision.workflow_run_id,
                error = %error,
                "could not update model decision"
            );
        }
    }
}

fn routing_reason(complexity: TaskComplexity) -> String {
    match complexity {
        TaskComplexity::Low => "low complexity routed to economy tier".to_string(),
        other => format!("{} complexity routed to primary tier", other.as_str()),
    }
}

fn correlation_id(request: &ModelRequest) -> &str {
    request.run_id.as_ref().map_or("unscoped", |id| id.0.as_str())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use rfpflow_core::audit::{AuditOutcome, InMemoryAuditSink};
    use rfpflow_core::domain::workflow::{AgentActivityId, TaskComplexity, WorkflowRunId};
    use async_trait::async_trait;
    use rfpflow_core::domain::workflow::ModelDecision;
    use rfpflow_db::repositories::{
        InMemoryModelDecisionRepository, ModelDecisionRepository, RepositoryError,
    };

    use super::{ModelExecutionError, ModelGateway, ModelRequest};
    use crate::test_support::ScriptedLlmClient;

    struct Harness {
        gateway: ModelGateway,
        primary: Arc<ScriptedLlmClient>,
        fallback: Arc<ScriptedLlmClient>,
        decisions: Arc<InMemoryModelDecisionRepository>,
        audit: InMemoryAuditSink,
    }

    fn harness(primary: ScriptedLlmClient, fallback: ScriptedLlmClient) -> Harness {
        let primary = Arc::new(primary);
        let fallback = Arc::new(fallback);
        let decisions = Arc::new(InMemoryModelDecisionRepository::default());
        let audit = InMemoryAuditSink::default();
        let gateway = ModelGateway::new(
            primary.clone(),
            fallback.clone(),
            decisions.clone(),
            Arc::new(audit.clone()),
        );
        Harness { gateway, primary, fallback, decisions, audit }
    }

    fn scoped(complexity: TaskComplexity) -> ModelRequest {
        ModelRequest::new("Summarise the RFP", "sales_triage", complexity).for_activity(
            WorkflowRunId("run-1".to_string()),
            AgentActivityId("act-1".to_string()),
        )
    }

    #[tokio::test]
    async fn primary_success_records_a_non_fallback_decision() {
        let h = harness(
            ScriptedLlmClient::new("llama3.1").respond("{\"ok\":true}"),
            ScriptedLlmClient::new("llama3.2:3b"),
        );

        let text = h.gateway.execute(scoped(TaskComplexity::Medium)).await.expect("execute");

        assert_eq!(text, "{\"ok\":true}");
        assert_eq!((h.primary.calls(), h.fallback.calls()), (1, 0));
        let decisions = h.decisions.list_for_run(&WorkflowRunId("run-1".to_string())).await.expect("list");
        assert_eq!(decisions.len(), 1);
        assert_eq!(decisions[0].chosen_model, "llama3.1");
        assert!(!decisions[0].is_fallback);
        assert_eq!(decisions[0].was_successful, Some(true));
    }

    #[tokio::test]
    async fn primary_failure_falls_back_exactly_once() {
        let h = harness(
            ScriptedLlmClient::new("llama3.1").fail("connection refused"),
            ScriptedLlmClient::new("llama3.2:3b").respond("fallback text"),
        );

        let text = h.gateway.execute(scoped(TaskComplexity::High)).await.expect("execute");

        assert_eq!(text, "fallback text");
        assert_eq!((h.primary.calls(), h.fallback.calls()), (1, 1));
        let decisions = h.decisions.list_for_run(&WorkflowRunId("run-1".to_string())).await.expect("list");
        assert_eq!(decisions[0].primary_model, "llama3.1");
        assert_eq!(decisions[0].chosen_model, "llama3.2:3b");
        assert!(decisions[0].is_fallback);
        assert!(decisions[0].reason.contains("connection refused"));

        let outcomes: Vec<_> = h.audit.events().iter().map(|event| event.outcome).collect();
        assert_eq!(outcomes, vec![AuditOutcome::Failed, AuditOutcome::Success]);
    }

    #[tokio::test]
    async fn both_tiers_failing_surfaces_an_exhausted_error() {
        let h = harness(
            ScriptedLlmClient::new("llama3.1").fail("rate limited"),
            ScriptedLlmClient::new("llama3.2:3b").fail("model not loaded"),
        );

        let error = h.gateway.execute(scoped(TaskComplexity::Critical)).await.expect_err("fails");

        match error {
            ModelExecutionError::Exhausted { primary_error, fallback_error, .. } => {
                assert!(primary_error.contains("rate limited"));
                assert!(fallback_error.contains("model not loaded"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!((h.primary.calls(), h.fallback.calls()), (1, 1));
        let decisions = h.decisions.list_for_run(&WorkflowRunId("run-1".to_string())).await.expect("list");
        assert_eq!(decisions[0].was_successful, Some(false));
    }

    #[tokio::test]
    async fn low_complexity_failure_makes_no_extra_attempt() {
        let h = harness(
            ScriptedLlmClient::new("llama3.1").respond("never used"),
            ScriptedLlmClient::new("llama3.2:3b").fail("timeout"),
        );

        let error = h.gateway.execute(scoped(TaskComplexity::Low)).await.expect_err("fails");

        assert!(matches!(error, ModelExecutionError::Provider { ref model, .. } if model == "llama3.2:3b"));
        assert_eq!((h.primary.calls(), h.fallback.calls()), (0, 1));
    }

    #[tokio::test]
    async fn blank_completion_is_treated_as_a_failure() {
        let h = harness(
            ScriptedLlmClient::new("llama3.1").respond("   "),
            ScriptedLlmClient::new("llama3.2:3b").respond("usable"),
        );

        let text = h.gateway.execute(scoped(TaskComplexity::Medium)).await.expect("execute");

        assert_eq!(text, "usable");
        assert_eq!(h.fallback.calls(), 1);
    }

    #[tokio::test]
    async fn unscoped_calls_skip_decision_persistence() {
        let h = harness(
            ScriptedLlmClient::new("llama3.1").respond("ok"),
            ScriptedLlmClient::new("llama3.2:3b"),
        );

        h.gateway
            .execute(ModelRequest::new("ping", "health", TaskComplexity::Medium))
            .await
            .expect("execute");

        let decisions = h.decisions.list_for_run(&WorkflowRunId("run-1".to_string())).await.expect("list");
        assert!(decisions.is_empty());
        assert_eq!(h.audit.events().len(), 1);
    }

    /// Refuses writes once the database is "locked"; creates can be let through.
    #[derive(Default)]
    struct LockedDecisions {
        accept_create: bool,
        inner: InMemoryModelDecisionRepository,
    }

    #[async_trait]
    impl ModelDecisionRepository for LockedDecisions {
        async fn create(&self, decision: ModelDecision) -> Result<(), RepositoryError> {
            if self.accept_create {
                return self.inner.create(decision).await;
            }
            Err(RepositoryError::Decode("database is locked".to_string()))
        }

        async fn save(&self, _decision: ModelDecision) -> Result<(), RepositoryError> {
            Err(RepositoryError::Decode("database is locked".to_string()))
        }

        async fn list_for_run(
            &self,
            run_id: &WorkflowRunId,
        ) -> Result<Vec<ModelDecision>, RepositoryError> {
            self.inner.list_for_run(run_id).await
        }
    }

    fn locked_gateway(
        decisions: Arc<LockedDecisions>,
        primary: ScriptedLlmClient,
        fallback: ScriptedLlmClient,
    ) -> (ModelGateway, InMemoryAuditSink) {
        let audit = InMemoryAuditSink::default();
        let gateway = ModelGateway::new(
            Arc::new(primary),
            Arc::new(fallback),
            decisions,
            Arc::new(audit.clone()),
        );
        (gateway, audit)
    }

    #[tokio::test]
    async fn decision_create_failure_does_not_fail_the_call() {
        let (gateway, audit) = locked_gateway(
            Arc::new(LockedDecisions::default()),
            ScriptedLlmClient::new("llama3.1").fail("timeout"),
            ScriptedLlmClient::new("llama3.2:3b").respond("fallback text"),
        );

        let text = gateway.execute(scoped(TaskComplexity::High)).await.expect("execute");

        assert_eq!(text, "fallback text");
        assert_eq!(audit.events().len(), 2);
    }

    #[tokio::test]
    async fn decision_update_failure_does_not_fail_the_call() {
        let decisions = Arc::new(LockedDecisions { accept_create: true, ..Default::default() });
        let (gateway, _audit) = locked_gateway(
            decisions.clone(),
            ScriptedLlmClient::new("llama3.1").respond("primary text"),
            ScriptedLlmClient::new("llama3.2:3b"),
        );

        let text = gateway.execute(scoped(TaskComplexity::Medium)).await.expect("execute");

        assert_eq!(text, "primary text");
        let stored = decisions.list_for_run(&WorkflowRunId("run-1".to_string())).await.expect("list");
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].was_successful, None);
    }
}
