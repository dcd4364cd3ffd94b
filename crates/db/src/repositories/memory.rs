use std::collections::HashMap;

use tokio::sync::RwLock;

use rfpflow_core::domain::analysis::{
    PricingAnalysis, RfpResponse, SalesAnalysis, TechnicalAnalysis,
};
use rfpflow_core::domain::product::{Product, ProductId};
use rfpflow_core::domain::rfp::{Requirement, Rfp, RfpId, RfpStatus};
use rfpflow_core::domain::workflow::{
    AgentActivity, ModelDecision, RunStatus, WorkflowRun, WorkflowRunId,
};

use super::{
    AgentActivityRepository, AnalysisRepository, ModelDecisionRepository, ProductRepository,
    RepositoryError, RequirementRepository, RfpRepository, WorkflowRunRepository,
};

#[derive(Default)]
pub struct InMemoryRfpRepository {
    rfps: RwLock<HashMap<String, Rfp>>,
}

#[async_trait::async_trait]
impl RfpRepository for InMemoryRfpRepository {
    async fn find_by_id(&self, id: &RfpId) -> Result<Option<Rfp>, RepositoryError> {
        let rfps = self.rfps.read().await;
        Ok(rfps.get(&id.0).cloned())
    }

    async fn save(&self, rfp: Rfp) -> Result<(), RepositoryError> {
        let mut rfps = self.rfps.write().await;
        rfps.insert(rfp.id.0.clone(), rfp);
        Ok(())
    }

    async fn update_status(&self, id: &RfpId, status: RfpStatus) -> Result<(), RepositoryError> {
        let mut rfps = self.rfps.write().await;
        let rfp = rfps
            .get_mut(&id.0)
            .ok_or_else(|| RepositoryError::NotFound(format!("rfp `{}`", id.0)))?;
        rfp.status = status;
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryRequirementRepository {
    requirements: RwLock<HashMap<String, Vec<Requirement>>>,
}

#[async_trait::async_trait]
impl RequirementRepository for InMemoryRequirementRepository {
    async fn list_for_rfp(&self, rfp_id: &RfpId) -> Result<Vec<Requirement>, RepositoryError> {
        let requirements = self.requirements.read().await;
        Ok(requirements.get(&rfp_id.0).cloned().unwrap_or_default())
    }

    async fn save_all(
        &self,
        rfp_id: &RfpId,
        requirements: Vec<Requirement>,
    ) -> Result<(), RepositoryError> {
        let mut stored = self.requirements.write().await;
        let existing = stored.entry(rfp_id.0.clone()).or_default();
        for requirement in requirements {
            match existing.iter_mut().find(|current| current.id == requirement.id) {
                Some(current) => *current = requirement,
                None => existing.push(requirement),
            }
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryProductRepository {
    products: RwLock<HashMap<String, Product>>,
}

#[async_trait::async_trait]
impl ProductRepository for InMemoryProductRepository {
    async fn find_by_id(&self, id: &ProductId) -> Result<Option<Product>, RepositoryError> {
        let products = self.products.read().await;
        Ok(products.get(&id.0).cloned())
    }

    async fn save(&self, product: Product) -> Result<(), RepositoryError> {
        let mut products = self.products.write().await;
        let duplicate_sku = products
            .values()
            .any(|existing| existing.sku == product.sku && existing.id != product.id);
        if duplicate_sku {
            return Err(RepositoryError::Conflict(format!("sku `{}` already exists", product.sku)));
        }
        products.insert(product.id.0.clone(), product);
        Ok(())
    }

    async fn list_active(&self) -> Result<Vec<Product>, RepositoryError> {
        let products = self.products.read().await;
        let mut active =
            products.values().filter(|product| product.active).cloned().collect::<Vec<_>>();
        active.sort_by(|left, right| left.sku.cmp(&right.sku));
        Ok(active)
    }
}

#[derive(Default)]
pub struct InMemoryWorkflowRunRepository {
    runs: RwLock<HashMap<String, WorkflowRun>>,
}

impl InMemoryWorkflowRunRepository {
    async fn bump_step(
        &self,
        id: &WorkflowRunId,
        bump: impl FnOnce(&mut WorkflowRun) -> Result<(), rfpflow_core::DomainError>,
    ) -> Result<(), RepositoryError> {
        let mut runs = self.runs.write().await;
        let run = runs
            .get_mut(&id.0)
            .ok_or_else(|| RepositoryError::NotFound(format!("workflow run `{}`", id.0)))?;
        bump(run).map_err(|error| RepositoryError::Conflict(error.to_string()))
    }
}

#[async_trait::async_trait]
impl WorkflowRunRepository for InMemoryWorkflowRunRepository {
    async fn create(&self, run: WorkflowRun) -> Result<WorkflowRun, RepositoryError> {
        let mut runs = self.runs.write().await;
        let for_rfp = runs.values().filter(|existing| existing.rfp_id == run.rfp_id);

        let mut next_number = 1;
        for existing in for_rfp {
            if matches!(existing.status, RunStatus::Pending | RunStatus::Running)
                && matches!(run.status, RunStatus::Pending | RunStatus::Running)
            {
                return Err(RepositoryError::Conflict(format!(
                    "rfp `{}` already has an active workflow run",
                    run.rfp_id.0
                )));
            }
            next_number = next_number.max(existing.run_number + 1);
        }

        let stored = WorkflowRun { run_number: next_number, ..run };
        runs.insert(stored.id.0.clone(), stored.clone());
        Ok(stored)
    }

    async fn find_by_id(&self, id: &WorkflowRunId) -> Result<Option<WorkflowRun>, RepositoryError> {
        let runs = self.runs.read().await;
        Ok(runs.get(&id.0).cloned())
    }

    async fn save(&self, run: WorkflowRun) -> Result<(), RepositoryError> {
        let mut runs = self.runs.write().await;
        match runs.get_mut(&run.id.0) {
            Some(existing) => {
                *existing = run;
                Ok(())
            }
            None => Err(RepositoryError::NotFound(format!("workflow run `{}`", run.id.0))),
        }
    }

    async fn record_step_completed(&self, id: &WorkflowRunId) -> Result<(), RepositoryError> {
        self.bump_step(id, WorkflowRun::record_step_completed).await
    }

    async fn record_step_failed(&self, id: &WorkflowRunId) -> Result<(), RepositoryError> {
        self.bump_step(id, WorkflowRun::record_step_failed).await
    }

    async fn list_for_rfp(&self, rfp_id: &RfpId) -> Result<Vec<WorkflowRun>, RepositoryError> {
        let runs = self.runs.read().await;
        let mut matching =
            runs.values().filter(|run| &run.rfp_id == rfp_id).cloned().collect::<Vec<_>>();
        matching.sort_by_key(|run| run.run_number);
        Ok(matching)
    }
}

#[derive(Default)]
pub struct InMemoryAgentActivityRepository {
    activities: RwLock<Vec<AgentActivity>>,
}

#[async_trait::async_trait]
impl AgentActivityRepository for InMemoryAgentActivityRepository {
    async fn create(&self, activity: AgentActivity) -> Result<(), RepositoryError> {
        let mut activities = self.activities.write().await;
        if activities.iter().any(|existing| existing.id == activity.id) {
            return Err(RepositoryError::Conflict(format!(
                "agent activity `{}` already exists",
                activity.id.0
            )));
        }
        activities.push(activity);
        Ok(())
    }

    async fn save(&self, activity: AgentActivity) -> Result<(), RepositoryError> {
        let mut activities = self.activities.write().await;
        match activities.iter_mut().find(|existing| existing.id == activity.id) {
            Some(existing) => {
                *existing = activity;
                Ok(())
            }
            None => Err(RepositoryError::NotFound(format!("agent activity `{}`", activity.id.0))),
        }
    }

    async fn list_for_run(
        &self,
        run_id: &WorkflowRunId,
    ) -> Result<Vec<AgentActivity>, RepositoryError> {
        let activities = self.activities.read().await;
        let mut matching = activities
            .iter()
            .filter(|activity| &activity.workflow_run_id == run_id)
            .cloned()
            .collect::<Vec<_>>();
        matching.sort_by_key(|activity| (activity.step_number, activity.started_at));
        Ok(matching)
    }
}

#[derive(Default)]
pub struct InMemoryModelDecisionRepository {
    decisions: RwLock<Vec<ModelDecision>>,
}

#[async_trait::async_trait]
impl ModelDecisionRepository for InMemoryModelDecisionRepository {
    async fn create(&self, decision: ModelDecision) -> Result<(), RepositoryError> {
        let mut decisions = self.decisions.write().await;
        decisions.push(decision);
        Ok(())
    }

    async fn save(&self, decision: ModelDecision) -> Result<(), RepositoryError> {
        let mut decisions = self.decisions.write().await;
        match decisions.iter_mut().find(|existing| existing.id == decision.id) {
            Some(existing) => {
                *existing = decision;
                Ok(())
            }
            None => Err(RepositoryError::NotFound(format!("model decision `{}`", decision.id.0))),
        }
    }

    async fn list_for_run(
        &self,
        run_id: &WorkflowRunId,
    ) -> Result<Vec<ModelDecision>, RepositoryError> {
        let decisions = self.decisions.read().await;
        Ok(decisions
            .iter()
            .filter(|decision| &decision.workflow_run_id == run_id)
            .cloned()
            .collect())
    }
}

#[derive(Default)]
pub struct InMemoryAnalysisRepository {
    sales: RwLock<HashMap<String, SalesAnalysis>>,
    technical: RwLock<HashMap<String, TechnicalAnalysis>>,
    pricing: RwLock<HashMap<String, PricingAnalysis>>,
    responses: RwLock<HashMap<String, RfpResponse>>,
}

#[async_trait::async_trait]
impl AnalysisRepository for InMemoryAnalysisRepository {
    async fn save_sales(&self, analysis: SalesAnalysis) -> Result<(), RepositoryError> {
        self.sales.write().await.insert(analysis.workflow_run_id.0.clone(), analysis);
        Ok(())
    }

    async fn find_sales(
        &self,
        run_id: &WorkflowRunId,
    ) -> Result<Option<SalesAnalysis>, RepositoryError> {
        Ok(self.sales.read().await.get(&run_id.0).cloned())
    }

    async fn save_technical(&self, analysis: TechnicalAnalysis) -> Result<(), RepositoryError> {
        self.technical.write().await.insert(analysis.workflow_run_id.0.clone(), analysis);
        Ok(())
    }

    async fn find_technical(
        &self,
        run_id: &WorkflowRunId,
    ) -> Result<Option<TechnicalAnalysis>, RepositoryError> {
        Ok(self.technical.read().await.get(&run_id.0).cloned())
    }

    async fn save_pricing(&self, analysis: PricingAnalysis) -> Result<(), RepositoryError> {
        self.pricing.write().await.insert(analysis.workflow_run_id.0.clone(), analysis);
        Ok(())
    }

    async fn find_pricing(
        &self,
        run_id: &WorkflowRunId,
    ) -> Result<Option<PricingAnalysis>, RepositoryError> {
        Ok(self.pricing.read().await.get(&run_id.0).cloned())
    }

    async fn save_response(&self, response: RfpResponse) -> Result<(), RepositoryError> {
        self.responses.write().await.insert(response.workflow_run_id.0.clone(), response);
        Ok(())
    }

    async fn find_response(
        &self,
        run_id: &WorkflowRunId,
    ) -> Result<Option<RfpResponse>, RepositoryError> {
        Ok(self.responses.read().await.get(&run_id.0).cloned())
    }
}
