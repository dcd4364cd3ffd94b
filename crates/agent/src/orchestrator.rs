//! Workflow orchestrator: sequences the four steps for one RFP and owns run status.
//!
//! The orchestrator keeps no per-run state in memory; everything it coordinates on lives in the
//! store, so clones can be shared freely across tasks.

use std::future::Future;
use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use rfpflow_core::config::WorkflowConfig;
use rfpflow_core::domain::analysis::{
    PricingAnalysis, RfpResponse, SalesAnalysis, TechnicalAnalysis,
};
use rfpflow_core::domain::rfp::{Rfp, RfpId, RfpStatus};
use rfpflow_core::domain::workflow::{
    AgentActivity, ModelDecision, RunStatus, TriggerType, WorkflowRun, WorkflowRunId,
};
use rfpflow_core::errors::{ApplicationError, DomainError};
use rfpflow_db::{RepositoryError, RepositorySet};

use crate::agents::{PricingAgent, ResponseAgent, ResponseInput, SalesAgent, TechnicalAgent};
use crate::gateway::ModelGateway;
use crate::runtime::{AgentRuntime, PipelineStep, StepOutcome};

pub const BUSINESS_STOP_MESSAGE: &str = "Workflow stopped: No suitable SKUs found for this RFP";

pub type Step<I, O> = Arc<dyn PipelineStep<Input = I, Output = O>>;

/// The four steps in pipeline order.
#[derive(Clone)]
pub struct PipelineAgents {
    pub sales: Step<Rfp, SalesAnalysis>,
    pub technical: Step<Rfp, TechnicalAnalysis>,
    pub pricing: Step<TechnicalAnalysis, PricingAnalysis>,
    pub response: Step<ResponseInput, RfpResponse>,
}

impl PipelineAgents {
    pub fn new(gateway: ModelGateway, repos: RepositorySet, workflow: &WorkflowConfig) -> Self {
        Self {
            sales: Arc::new(SalesAgent::new(gateway.clone(), repos.clone())),
            technical: Arc::new(
                TechnicalAgent::new(gateway.clone(), repos.clone())
                    .with_sample_matches(workflow.sample_matches_on_empty_catalog),
            ),
            pricing: Arc::new(PricingAgent::new(gateway.clone(), repos.clone())),
            response: Arc::new(ResponseAgent::new(gateway, repos)),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StartWorkflow {
    pub rfp_id: RfpId,
    pub trigger_type: TriggerType,
    pub trigger_reason: Option<String>,
    pub user_id: Option<String>,
}

impl StartWorkflow {
    pub fn manual(rfp_id: RfpId) -> Self {
        Self { rfp_id, trigger_type: TriggerType::Manual, trigger_reason: None, user_id: None }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct WorkflowReceipt {
    pub workflow_run_id: WorkflowRunId,
    pub run_number: u32,
    pub status: RunStatus,
    pub message: String,
}

/// Returned as soon as the run is recorded. `completion` resolves with the status the store holds
/// once the pipeline has ended: the terminal status, or `RUNNING` if it could not be written.
pub struct WorkflowLaunch {
    pub receipt: WorkflowReceipt,
    pub completion: JoinHandle<RunStatus>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct WorkflowStatus {
    pub run: WorkflowRun,
    pub activities: Vec<AgentActivity>,
    pub decisions: Vec<ModelDecision>,
    pub sales: Option<SalesAnalysis>,
    pub technical: Option<TechnicalAnalysis>,
    pub pricing: Option<PricingAnalysis>,
    pub response: Option<RfpResponse>,
}

#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error("rfp `{0}` not found")]
    RfpNotFound(String),
    #[error("workflow run `{0}` not found")]
    RunNotFound(String),
    #[error("workflow run `{run_id}` is {} and cannot be retried; only failed runs can", .status.as_str())]
    NotRetryable { run_id: String, status: RunStatus },
    #[error("rfp `{0}` already has an active workflow run")]
    RunAlreadyActive(String),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
    #[error(transparent)]
    Domain(#[from] DomainError),
}

impl From<WorkflowError> for ApplicationError {
    fn from(error: WorkflowError) -> Self {
        match error {
            WorkflowError::RfpNotFound(_) | WorkflowError::RunNotFound(_) => {
                Self::NotFound(error.to_string())
            }
            WorkflowError::NotRetryable { status, .. } => {
                Self::Domain(DomainError::RunNotRetryable { status })
            }
            WorkflowError::RunAlreadyActive(_) => Self::Conflict(error.to_string()),
            WorkflowError::Repository(RepositoryError::Conflict(message)) => Self::Conflict(message),
            WorkflowError::Repository(RepositoryError::NotFound(message)) => Self::NotFound(message),
            WorkflowError::Repository(other) => Self::Persistence(other.to_string()),
            WorkflowError::Domain(domain) => Self::Domain(domain),
        }
    }
}

#[derive(Clone)]
pub struct Orchestrator {
    repos: RepositorySet,
    runtime: AgentRuntime,
    agents: PipelineAgents,
}

impl Orchestrator {
    pub fn new(repos: RepositorySet, runtime: AgentRuntime, agents: PipelineAgents) -> Self {
        Self { repos, runtime, agents }
    }

    pub async fn start_workflow(
        &self,
        request: StartWorkflow,
    ) -> Result<WorkflowLaunch, WorkflowError> {
        let rfp = self
            .repos
            .rfps
            .find_by_id(&request.rfp_id)
            .await?
            .ok_or_else(|| WorkflowError::RfpNotFound(request.rfp_id.0.clone()))?;

        let mut run = WorkflowRun::new(
            rfp.id.clone(),
            request.trigger_type,
            request.trigger_reason,
            request.user_id,
        );
        run.transition_to(RunStatus::Running)?;
        let run = self.repos.runs.create(run).await.map_err(|error| match error {
            RepositoryError::Conflict(_) => WorkflowError::RunAlreadyActive(rfp.id.0.clone()),
            other => WorkflowError::Repository(other),
        })?;

        if let Err(status_error) = self.repos.rfps.update_status(&rfp.id, RfpStatus::InProgress).await {
            self.finish(&run.id, &rfp.id, Err(format!("Workflow not started: {status_error}"))).await;
            return Err(status_error.into());
        }

        info!(
            event_name = "workflow.run.started",
            correlation_id = %run.id,
            rfp_id = %rfp.id.0,
            run_number = run.run_number,
            trigger_type = run.trigger_type.as_str(),
            "workflow run started"
        );

        let receipt = WorkflowReceipt {
            workflow_run_id: run.id.clone(),
            run_number: run.run_number,
            status: run.status,
            message: format!("Workflow run #{} started for RFP {}", run.run_number, rfp.id.0),
        };
        let orchestrator = self.clone();
        let completion = tokio::spawn(async move { orchestrator.supervise(run.id, rfp).await });

        Ok(WorkflowLaunch { receipt, completion })
    }

    pub async fn get_workflow_status(
        &self,
        run_id: &WorkflowRunId,
    ) -> Result<WorkflowStatus, WorkflowError> {
        let run = self
            .repos
            .runs
            .find_by_id(run_id)
            .await?
            .ok_or_else(|| WorkflowError::RunNotFound(run_id.0.clone()))?;

        Ok(WorkflowStatus {
            activities: self.repos.activities.list_for_run(run_id).await?,
            decisions: self.repos.decisions.list_for_run(run_id).await?,
            sales: self.repos.analyses.find_sales(run_id).await?,
            technical: self.repos.analyses.find_technical(run_id).await?,
            pricing: self.repos.analyses.find_pricing(run_id).await?,
            response: self.repos.analyses.find_response(run_id).await?,
            run,
        })
    }

    /// Starts a fresh run for the same RFP; the failed run stays as history.
    pub async fn retry_workflow(
        &self,
        run_id: &WorkflowRunId,
    ) -> Result<WorkflowLaunch, WorkflowError> {
        let run = self
            .repos
            .runs
            .find_by_id(run_id)
            .await?
            .ok_or_else(|| WorkflowError::RunNotFound(run_id.0.clone()))?;
        if run.status != RunStatus::Failed {
            return Err(WorkflowError::NotRetryable { run_id: run_id.0.clone(), status: run.status });
        }

        self.start_workflow(StartWorkflow {
            rfp_id: run.rfp_id,
            trigger_type: TriggerType::Retry,
            trigger_reason: Some(format!("retry of run #{} ({})", run.run_number, run.id)),
            user_id: run.triggered_by,
        })
        .await
    }

    /// Runs the pipeline in its own task so a panic still ends the run with a terminal status.
    async fn supervise(self, run_id: WorkflowRunId, rfp: Rfp) -> RunStatus {
        let pipeline = {
            let orchestrator = self.clone();
            let run_id = run_id.clone();
            let rfp = rfp.clone();
            tokio::spawn(async move { orchestrator.run_pipeline(&run_id, &rfp).await })
        };

        let outcome = match pipeline.await {
            Ok(outcome) => outcome,
            Err(join_error) => {
                let reason = if join_error.is_panic() { "pipeline task panicked" } else { "pipeline task was cancelled" };
                let message = format!("Workflow aborted: {reason}");
                let abandoned = self.runtime.abandon_open_activities(&run_id, &message).await;
                error!(
                    event_name = "workflow.run.aborted",
                    correlation_id = %run_id,
                    abandoned_activities = abandoned,
                    "{message}"
                );
                Err(message)
            }
        };
        self.finish(&run_id, &rfp.id, outcome).await
    }

    async fn run_pipeline(&self, run_id: &WorkflowRunId, rfp: &Rfp) -> Result<(), String> {
        let sales = match self.runtime.execute(self.agents.sales.as_ref(), &rfp.id, run_id, rfp).await {
            StepOutcome::Succeeded(sales) => sales,
            StepOutcome::Failed(error) => return Err(format!("Sales Agent failed: {error}")),
        };

        let technical =
            match self.runtime.execute(self.agents.technical.as_ref(), &rfp.id, run_id, rfp).await {
                StepOutcome::Succeeded(technical) => technical,
                StepOutcome::Failed(error) => return Err(format!("Technical Agent failed: {error}")),
            };

        if !technical.has_viable_matches() {
            warn!(
                event_name = "workflow.run.business_stop",
                correlation_id = %run_id,
                rfp_id = %rfp.id.0,
                requirements_analyzed = technical.requirements_analyzed,
                "no viable SKU matches; stopping before pricing"
            );
            return Err(BUSINESS_STOP_MESSAGE.to_string());
        }

        let pricing = match self
            .runtime
            .execute(self.agents.pricing.as_ref(), &rfp.id, run_id, &technical)
            .await
        {
            StepOutcome::Succeeded(pricing) => pricing,
            StepOutcome::Failed(error) => return Err(format!("Pricing Agent failed: {error}")),
        };

        let input = ResponseInput { rfp: rfp.clone(), sales, technical, pricing };
        match self.runtime.execute(self.agents.response.as_ref(), &rfp.id, run_id, &input).await {
            StepOutcome::Succeeded(_) => Ok(()),
            StepOutcome::Failed(error) => Err(format!("Response Agent failed: {error}")),
        }
    }

    /// Writes the terminal run status, then the RFP status. Each write is retried with the
    /// runtime's backoff, since a run left RUNNING blocks every later run for the RFP.
    async fn finish(
        &self,
        run_id: &WorkflowRunId,
        rfp_id: &RfpId,
        outcome: Result<(), String>,
    ) -> RunStatus {
        let outcome_ref = &outcome;
        let written = self
            .write_with_retries(run_id, "run_status", move || {
                self.write_terminal_status(run_id, outcome_ref)
            })
            .await;

        let run = match written {
            Ok(TerminalWrite::Saved(run)) => run,
            Ok(TerminalWrite::Unwritable { status, reason }) => {
                error!(
                    event_name = "workflow.run.finish_failed",
                    correlation_id = %run_id,
                    error = %reason,
                    "workflow run could not be finalised"
                );
                return status;
            }
            Err(save_error) => {
                error!(
                    event_name = "workflow.run.finish_failed",
                    correlation_id = %run_id,
                    error = %save_error,
                    "could not persist terminal workflow status; run is still recorded as running"
                );
                return RunStatus::Running;
            }
        };

        let rfp_status = if run.status == RunStatus::Completed { RfpStatus::Review } else { RfpStatus::New };
        let rfp_write = self
            .write_with_retries(run_id, "rfp_status", move || {
                self.repos.rfps.update_status(rfp_id, rfp_status)
            })
            .await;
        if let Err(status_error) = rfp_write {
            warn!(
                event_name = "workflow.rfp.status_failed",
                correlation_id = %run_id,
                rfp_id = %rfp_id.0,
                error = %status_error,
                "could not update rfp status"
            );
        }

        match &run.error {
            None => info!(
                event_name = "workflow.run.completed",
                correlation_id = %run_id,
                rfp_id = %rfp_id.0,
                duration_ms = run.duration_ms,
                "workflow run completed"
            ),
            Some(message) => warn!(
                event_name = "workflow.run.failed",
                correlation_id = %run_id,
                rfp_id = %rfp_id.0,
                duration_ms = run.duration_ms,
                error = %message,
                "workflow run failed"
            ),
        }
        run.status
    }

    /// Loads the run fresh and moves it to its terminal status. A run that is already terminal
    /// was written by an earlier attempt and is returned as is.
    async fn write_terminal_status(
        &self,
        run_id: &WorkflowRunId,
        outcome: &Result<(), String>,
    ) -> Result<TerminalWrite, RepositoryError> {
        let Some(mut run) = self.repos.runs.find_by_id(run_id).await? else {
            return Ok(TerminalWrite::Unwritable {
                status: RunStatus::Failed,
                reason: "workflow run vanished before it could be finalised".to_string(),
            });
        };
        if run.status.is_terminal() {
            return Ok(TerminalWrite::Saved(run));
        }

        let now = Utc::now();
        let transition = match outcome {
            Ok(()) => run.complete(now),
            Err(message) => run.fail(message.clone(), now),
        };
        if let Err(transition_error) = transition {
            return Ok(TerminalWrite::Unwritable {
                status: run.status,
                reason: transition_error.to_string(),
            });
        }

        self.repos.runs.save(run.clone()).await?;
        Ok(TerminalWrite::Saved(run))
    }

    async fn write_with_retries<T, F, Fut>(
        &self,
        run_id: &WorkflowRunId,
        target: &'static str,
        mut write: F,
    ) -> Result<T, RepositoryError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, RepositoryError>>,
    {
        let max_retries = self.runtime.policy().max_retries;
        let mut retry_count = 0;
        loop {
            match write().await {
                Ok(value) => return Ok(value),
                Err(write_error) if retry_count < max_retries => {
                    warn!(
                        event_name = "workflow.run.write_retrying",
                        correlation_id = %run_id,
                        target,
                        retry_count,
                        error = %write_error,
                        "workflow write failed; backing off before retry"
                    );
                    self.runtime.back_off(retry_count).await;
                    retry_count += 1;
                }
                Err(write_error) => return Err(write_error),
            }
        }
    }
}

enum TerminalWrite {
    Saved(WorkflowRun),
    Unwritable { status: RunStatus, reason: String },
}
