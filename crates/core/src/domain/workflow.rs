use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::domain::rfp::RfpId;
use crate::errors::DomainError;

/// Sales, Technical, Pricing, Response Synthesis.
pub const TOTAL_STEPS: u32 = 4;
pub const DEFAULT_MAX_RETRIES: u32 = 3;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WorkflowRunId(pub String);

impl WorkflowRunId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl std::fmt::Display for WorkflowRunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AgentActivityId(pub String);

impl AgentActivityId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ModelDecisionId(pub String);

impl ModelDecisionId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "pending" => Some(Self::Pending),
            "running" => Some(Self::Running),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TriggerType {
    Manual,
    Retry,
    AutoEmail,
    AutoWebsite,
}

impl TriggerType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Manual => "manual",
            Self::Retry => "retry",
            Self::AutoEmail => "auto_email",
            Self::AutoWebsite => "auto_website",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "manual" => Some(Self::Manual),
            "retry" => Some(Self::Retry),
            "auto_email" => Some(Self::AutoEmail),
            "auto_website" => Some(Self::AutoWebsite),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowRun {
    pub id: WorkflowRunId,
    pub rfp_id: RfpId,
    /// Assigned by the store when the run is inserted.
    pub run_number: u32,
    pub trigger_type: TriggerType,
    pub trigger_reason: Option<String>,
    pub triggered_by: Option<String>,
    pub status: RunStatus,
    pub total_steps: u32,
    pub completed_steps: u32,
    pub failed_steps: u32,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub duration_ms: Option<i64>,
    pub error: Option<String>,
}

impl WorkflowRun {
    pub fn new(
        rfp_id: RfpId,
        trigger_type: TriggerType,
        trigger_reason: Option<String>,
        triggered_by: Option<String>,
    ) -> Self {
        Self {
            id: WorkflowRunId::generate(),
            rfp_id,
            run_number: 0,
            trigger_type,
            trigger_reason,
            triggered_by,
            status: RunStatus::Pending,
            total_steps: TOTAL_STEPS,
            completed_steps: 0,
            failed_steps: 0,
            started_at: Utc::now(),
            completed_at: None,
            duration_ms: None,
            error: None,
        }
    }

    pub fn can_transition_to(&self, next: RunStatus) -> bool {
        matches!(
            (self.status, next),
            (RunStatus::Pending, RunStatus::Running)
                | (RunStatus::Running, RunStatus::Completed)
                | (RunStatus::Running, RunStatus::Failed)
        )
    }

    pub fn transition_to(&mut self, next: RunStatus) -> Result<(), DomainError> {
        if self.can_transition_to(next) {
            self.status = next;
            return Ok(());
        }

        Err(DomainError::InvalidRunTransition { from: self.status, to: next })
    }

    pub fn complete(&mut self, now: DateTime<Utc>) -> Result<(), DomainError> {
        self.transition_to(RunStatus::Completed)?;
        self.stamp_finish(now);
        Ok(())
    }

    pub fn fail(&mut self, error: impl Into<String>, now: DateTime<Utc>) -> Result<(), DomainError> {
        self.transition_to(RunStatus::Failed)?;
        self.error = Some(error.into());
        self.stamp_finish(now);
        Ok(())
    }

    fn stamp_finish(&mut self, now: DateTime<Utc>) {
        self.completed_at = Some(now);
        self.duration_ms = Some((now - self.started_at).num_milliseconds().max(0));
    }

    pub fn record_step_completed(&mut self) -> Result<(), DomainError> {
        self.ensure_step_capacity()?;
        self.completed_steps += 1;
        Ok(())
    }

    pub fn record_step_failed(&mut self) -> Result<(), DomainError> {
        self.ensure_step_capacity()?;
        self.failed_steps += 1;
        Ok(())
    }

    fn ensure_step_capacity(&self) -> Result<(), DomainError> {
        if self.completed_steps + self.failed_steps >= self.total_steps {
            return Err(DomainError::InvariantViolation(format!(
                "run {} already accounts for all {} steps",
                self.id, self.total_steps
            )));
        }
        Ok(())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AgentType {
    Orchestrator,
    SalesScout,
    TechnicalSpecialist,
    PricingSpecialist,
}

impl AgentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Orchestrator => "orchestrator",
            Self::SalesScout => "sales_scout",
            Self::TechnicalSpecialist => "technical_specialist",
            Self::PricingSpecialist => "pricing_specialist",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "orchestrator" => Some(Self::Orchestrator),
            "sales_scout" => Some(Self::SalesScout),
            "technical_specialist" => Some(Self::TechnicalSpecialist),
            "pricing_specialist" => Some(Self::PricingSpecialist),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActivityStatus {
    InProgress,
    Completed,
    Failed,
    Retrying,
}

impl ActivityStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Retrying => "retrying",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "in_progress" => Some(Self::InProgress),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            "retrying" => Some(Self::Retrying),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AgentActivity {
    pub id: AgentActivityId,
    pub workflow_run_id: WorkflowRunId,
    pub agent_type: AgentType,
    pub status: ActivityStatus,
    pub step_number: u32,
    pub input_data: Option<Value>,
    pub output_data: Option<Value>,
    pub error: Option<String>,
    pub retry_count: u32,
    pub max_retries: u32,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub duration_ms: Option<i64>,
}

impl AgentActivity {
    pub fn start(
        workflow_run_id: WorkflowRunId,
        agent_type: AgentType,
        step_number: u32,
        input_data: Option<Value>,
        max_retries: u32,
    ) -> Self {
        Self {
            id: AgentActivityId::generate(),
            workflow_run_id,
            agent_type,
            status: ActivityStatus::InProgress,
            step_number,
            input_data,
            output_data: None,
            error: None,
            retry_count: 0,
            max_retries,
            started_at: Utc::now(),
            completed_at: None,
            duration_ms: None,
        }
    }

    pub fn can_retry(&self) -> bool {
        self.retry_count < self.max_retries
    }

    pub fn mark_completed(&mut self, output: Value, now: DateTime<Utc>) {
        self.status = ActivityStatus::Completed;
        self.output_data = Some(output);
        self.error = None;
        self.stamp_finish(now);
    }

    pub fn mark_retrying(&mut self, error: impl Into<String>) {
        self.status = ActivityStatus::Retrying;
        self.error = Some(error.into());
    }

    /// Leaves RETRYING for the next attempt on the same record.
    pub fn begin_retry(&mut self) -> Result<(), DomainError> {
        if self.status != ActivityStatus::Retrying || !self.can_retry() {
            return Err(DomainError::InvariantViolation(format!(
                "activity {} cannot retry from {:?} at {}/{}",
                self.id.0, self.status, self.retry_count, self.max_retries
            )));
        }
        self.retry_count += 1;
        self.status = ActivityStatus::InProgress;
        Ok(())
    }

    pub fn mark_failed(&mut self, error: impl Into<String>, now: DateTime<Utc>) {
        self.status = ActivityStatus::Failed;
        self.error = Some(error.into());
        self.stamp_finish(now);
    }

    fn stamp_finish(&mut self, now: DateTime<Utc>) {
        self.completed_at = Some(now);
        self.duration_ms = Some((now - self.started_at).num_milliseconds().max(0));
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskComplexity {
    Low,
    Medium,
    High,
    Critical,
}

impl TaskComplexity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "low" => Some(Self::Low),
            "medium" => Some(Self::Medium),
            "high" => Some(Self::High),
            "critical" => Some(Self::Critical),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelDecision {
    pub id: ModelDecisionId,
    pub workflow_run_id: WorkflowRunId,
    pub agent_activity_id: AgentActivityId,
    pub primary_model: String,
    pub chosen_model: String,
    pub is_fallback: bool,
    pub reason: String,
    pub task_type: String,
    pub task_complexity: TaskComplexity,
    pub estimated_tokens: u32,
    pub actual_tokens_used: Option<u32>,
    pub was_successful: Option<bool>,
    pub created_at: DateTime<Utc>,
}

impl ModelDecision {
    /// Moves the decision onto the fallback model; `is_fallback` tracks the model inequality.
    pub fn switch_to(&mut self, model: impl Into<String>, reason: impl Into<String>) {
        self.chosen_model = model.into();
        self.is_fallback = self.chosen_model != self.primary_model;
        self.reason = reason.into();
    }

    pub fn resolve(&mut self, was_successful: bool, actual_tokens_used: Option<u32>) {
        self.was_successful = Some(was_successful);
        self.actual_tokens_used = actual_tokens_used;
    }
}
