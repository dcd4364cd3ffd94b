//! Step runtime: activity bookkeeping and retry with exponential backoff.
//!
//! Every pipeline step runs through [`AgentRuntime::execute`]. One activity row tracks the
//! invocation; retries reuse it and bump `retry_count`. Steps never loop around model calls
//! themselves.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tracing::{error, info, warn};

use rfpflow_core::config::WorkflowConfig;
use rfpflow_core::domain::rfp::RfpId;
use rfpflow_core::domain::workflow::{
    ActivityStatus, AgentActivity, AgentActivityId, AgentType, WorkflowRunId, DEFAULT_MAX_RETRIES,
};
use rfpflow_db::repositories::{AgentActivityRepository, RepositoryError, WorkflowRunRepository};

use crate::gateway::ModelExecutionError;

/// What a step sees about the invocation it is running in.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StepContext {
    pub rfp_id: RfpId,
    pub workflow_run_id: WorkflowRunId,
    pub step_number: u32,
    pub activity_id: AgentActivityId,
    /// Zero on the first attempt.
    pub attempt: u32,
}

#[derive(Debug, Error)]
pub enum StepError {
    #[error(transparent)]
    Model(#[from] ModelExecutionError),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
    #[error("{0}")]
    Invalid(String),
}

#[async_trait]
pub trait PipelineStep: Send + Sync {
    type Input: Serialize + Send + Sync;
    type Output: Serialize + Send;

    fn agent_type(&self) -> AgentType;
    fn step_number(&self) -> u32;
    fn name(&self) -> &'static str;

    async fn run(&self, ctx: &StepContext, input: &Self::Input) -> Result<Self::Output, StepError>;
}

#[derive(Clone, Debug, PartialEq)]
pub enum StepOutcome<T> {
    Succeeded(T),
    Failed(String),
}

impl<T> StepOutcome<T> {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Succeeded(_))
    }
}

#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

#[derive(Clone, Copy, Debug, Default)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub backoff_base: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { max_retries: DEFAULT_MAX_RETRIES, backoff_base: Duration::from_secs(1) }
    }
}

impl RetryPolicy {
    pub fn from_config(config: &WorkflowConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            backoff_base: Duration::from_secs(config.backoff_base_secs),
        }
    }

    /// `base * 2^retry_count`: 1s, 2s, 4s with the default base.
    pub fn delay_for(&self, retry_count: u32) -> Duration {
        let factor = 2_u32.checked_pow(retry_count).unwrap_or(u32::MAX);
        self.backoff_base.saturating_mul(factor)
    }
}

#[derive(Clone)]
pub struct AgentRuntime {
    activities: Arc<dyn AgentActivityRepository>,
    runs: Arc<dyn WorkflowRunRepository>,
    policy: RetryPolicy,
    sleeper: Arc<dyn Sleeper>,
}

impl AgentRuntime {
    pub fn new(
        activities: Arc<dyn AgentActivityRepository>,
        runs: Arc<dyn WorkflowRunRepository>,
        policy: RetryPolicy,
        sleeper: Arc<dyn Sleeper>,
    ) -> Self {
        Self { activities, runs, policy, sleeper }
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    pub async fn execute<S>(
        &self,
        step: &S,
        rfp_id: &RfpId,
        run_id: &WorkflowRunId,
        input: &S::Input,
    ) -> StepOutcome<S::Output>
    where
        S: PipelineStep + ?Sized,
    {
        let input_data = serde_json::to_value(input).ok();
        let mut activity = AgentActivity::start(
            run_id.clone(),
            step.agent_type(),
            step.step_number(),
            input_data,
            self.policy.max_retries,
        );

        if let Err(error) = self.activities.create(activity.clone()).await {
            error!(
                event_name = "agent.activity.create_failed",
                correlation_id = %run_id,
                agent = step.name(),
                error = %error,
                "could not record agent activity; step not started"
            );
            return StepOutcome::Failed(format!("could not record {} activity: {error}", step.name()));
        }

        info!(
            event_name = "agent.step.started",
            correlation_id = %run_id,
            rfp_id = %rfp_id.0,
            agent = step.name(),
            step_number = step.step_number(),
            "agent step started"
        );

        let mut last_error = String::new();
        for attempt in 0..=self.policy.max_retries {
            if attempt > 0 {
                if let Err(error) = activity.begin_retry() {
                    last_error = error.to_string();
                    break;
                }
                self.persist(&activity).await;
            }

            let ctx = StepContext {
                rfp_id: rfp_id.clone(),
                workflow_run_id: run_id.clone(),
                step_number: step.step_number(),
                activity_id: activity.id.clone(),
                attempt,
            };

            match step.run(&ctx, input).await {
                Ok(output) => {
                    let output_data = serde_json::to_value(&output).unwrap_or(Value::Null);
                    activity.mark_completed(output_data, Utc::now());
                    self.persist(&activity).await;
                    if let Err(error) = self.runs.record_step_completed(run_id).await {
                        warn!(
                            event_name = "workflow.run.counter_failed",
                            correlation_id = %run_id,
                            error = %error,
                            "could not record completed step"
                        );
                    }
                    info!(
                        event_name = "agent.step.completed",
                        correlation_id = %run_id,
                        agent = step.name(),
                        attempt,
                        duration_ms = activity.duration_ms,
                        "agent step completed"
                    );
                    return StepOutcome::Succeeded(output);
                }
                Err(step_error) => {
                    last_error = step_error.to_string();
                    if !activity.can_retry() {
                        break;
                    }

                    activity.mark_retrying(last_error.clone());
                    self.persist(&activity).await;
                    let delay = self.policy.delay_for(activity.retry_count);
                    warn!(
                        event_name = "agent.step.retrying",
                        correlation_id = %run_id,
                        agent = step.name(),
                        attempt,
                        retry_count = activity.retry_count,
                        delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        error = %last_error,
                        "agent step failed; backing off before retry"
                    );
                    self.sleeper.sleep(delay).await;
                }
            }
        }

        activity.mark_failed(last_error.clone(), Utc::now());
        self.persist(&activity).await;
        if let Err(error) = self.runs.record_step_failed(run_id).await {
            warn!(
                event_name = "workflow.run.counter_failed",
                correlation_id = %run_id,
                error = %error,
                "could not record failed step"
            );
        }
        error!(
            event_name = "agent.step.failed",
            correlation_id = %run_id,
            agent = step.name(),
            retry_count = activity.retry_count,
            error = %last_error,
            "agent step failed after exhausting retries"
        );
        StepOutcome::Failed(last_error)
    }

    /// Fails every activity of the run still in progress or retrying, counting each as a failed
    /// step. Used when a step never returned, so its activity would otherwise stay open.
    pub async fn abandon_open_activities(&self, run_id: &WorkflowRunId, reason: &str) -> usize {
        let activities = match self.activities.list_for_run(run_id).await {
            Ok(activities) => activities,
            Err(error) => {
                warn!(
                    event_name = "agent.activity.list_failed",
                    correlation_id = %run_id,
                    error = %error,
                    "could not load activities to close them"
                );
                return 0;
            }
        };

        let mut abandoned = 0;
        for mut activity in activities {
            if !matches!(activity.status, ActivityStatus::InProgress | ActivityStatus::Retrying) {
                continue;
            }
            activity.mark_failed(reason, Utc::now());
            self.persist(&activity).await;
            if let Err(error) = self.runs.record_step_failed(run_id).await {
                warn!(
                    event_name = "workflow.run.counter_failed",
                    correlation_id = %run_id,
                    error = %error,
                    "could not record failed step"
                );
            }
            abandoned += 1;
        }
        abandoned
    }

    /// Sleeps for the policy's backoff delay after `retry_count` failed attempts.
    pub async fn back_off(&self, retry_count: u32) {
        self.sleeper.sleep(self.policy.delay_for(retry_count)).await;
    }

    async fn persist(&self, activity: &AgentActivity) {
        if let Err(error) = self.activities.save(activity.clone()).await {
            warn!(
                event_name = "agent.activity.update_failed",
                correlation_id = %activity.workflow_run_id,
                activity_id = %activity.id.0,
                error = %error,
                "could not update agent activity"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use async_trait::async_trait;
    use serde_json::json;

    use rfpflow_core::domain::rfp::RfpId;
    use rfpflow_core::domain::workflow::{
        ActivityStatus, AgentType, RunStatus, TriggerType, WorkflowRun, WorkflowRunId,
    };
    use rfpflow_core::domain::workflow::AgentActivity;
    use rfpflow_db::repositories::{
        AgentActivityRepository, InMemoryAgentActivityRepository, RepositoryError,
    };
    use rfpflow_db::RepositorySet;

    use super::{
        AgentRuntime, PipelineStep, RetryPolicy, StepContext, StepError, StepOutcome,
    };
    use crate::test_support::RecordingSleeper;

    /// Fails the first `failures` attempts, then echoes its input.
    struct FlakyStep {
        failures: u32,
        calls: AtomicU32,
    }

    impl FlakyStep {
        fn new(failures: u32) -> Self {
            Self { failures, calls: AtomicU32::new(0) }
        }
    }

    #[async_trait]
    impl PipelineStep for FlakyStep {
        type Input = String;
        type Output = String;

        fn agent_type(&self) -> AgentType {
            AgentType::SalesScout
        }

        fn step_number(&self) -> u32 {
            1
        }

        fn name(&self) -> &'static str {
            "Flaky Agent"
        }

        async fn run(&self, ctx: &StepContext, input: &String) -> Result<String, StepError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            assert_eq!(ctx.attempt, call);
            if call < self.failures {
                return Err(StepError::Invalid(format!("transient failure {call}")));
            }
            Ok(format!("handled {input}"))
        }
    }

    async fn running_run(repos: &RepositorySet) -> WorkflowRunId {
        let mut run = WorkflowRun::new(RfpId("rfp-1".to_string()), TriggerType::Manual, None, None);
        run.transition_to(RunStatus::Running).expect("running");
        repos.runs.create(run).await.expect("create run").id
    }

    fn runtime(repos: &RepositorySet, sleeper: Arc<RecordingSleeper>) -> AgentRuntime {
        AgentRuntime::new(
            repos.activities.clone(),
            repos.runs.clone(),
            RetryPolicy::default(),
            sleeper,
        )
    }

    #[test]
    fn backoff_doubles_from_the_base_delay() {
        let policy = RetryPolicy::default();
        let delays: Vec<_> = (0..3).map(|retry| policy.delay_for(retry)).collect();
        assert_eq!(
            delays,
            vec![Duration::from_secs(1), Duration::from_secs(2), Duration::from_secs(4)]
        );
        assert_eq!(policy.delay_for(40), Duration::from_secs(u64::from(u32::MAX)));
    }

    #[tokio::test]
    async fn success_on_first_attempt_completes_one_activity() {
        let repos = RepositorySet::in_memory();
        let run_id = running_run(&repos).await;
        let sleeper = Arc::new(RecordingSleeper::default());

        let outcome = runtime(&repos, sleeper.clone())
            .execute(&FlakyStep::new(0), &RfpId("rfp-1".to_string()), &run_id, &"rfp".to_string())
            .await;

        assert_eq!(outcome, StepOutcome::Succeeded("handled rfp".to_string()));
        assert!(sleeper.delays().is_empty());
        let activities = repos.activities.list_for_run(&run_id).await.expect("list");
        assert_eq!(activities.len(), 1);
        assert_eq!(activities[0].status, ActivityStatus::Completed);
        assert_eq!(activities[0].output_data, Some(json!("handled rfp")));
        let run = repos.runs.find_by_id(&run_id).await.expect("find").expect("run");
        assert_eq!((run.completed_steps, run.failed_steps), (1, 0));
    }

    #[tokio::test]
    async fn retries_reuse_the_activity_and_back_off_exponentially() {
        let repos = RepositorySet::in_memory();
        let run_id = running_run(&repos).await;
        let sleeper = Arc::new(RecordingSleeper::default());
        let step = FlakyStep::new(2);

        let outcome = runtime(&repos, sleeper.clone())
            .execute(&step, &RfpId("rfp-1".to_string()), &run_id, &"rfp".to_string())
            .await;

        assert!(outcome.is_success());
        assert_eq!(sleeper.delays(), vec![Duration::from_secs(1), Duration::from_secs(2)]);
        let activities = repos.activities.list_for_run(&run_id).await.expect("list");
        assert_eq!(activities.len(), 1);
        assert_eq!(activities[0].retry_count, 2);
        assert_eq!(activities[0].status, ActivityStatus::Completed);
        let run = repos.runs.find_by_id(&run_id).await.expect("find").expect("run");
        assert_eq!((run.completed_steps, run.failed_steps), (1, 0));
    }

    #[tokio::test]
    async fn exhausted_retries_stop_after_max_attempts() {
        let repos = RepositorySet::in_memory();
        let run_id = running_run(&repos).await;
        let sleeper = Arc::new(RecordingSleeper::default());
        let step = FlakyStep::new(u32::MAX);

        let outcome = runtime(&repos, sleeper.clone())
            .execute(&step, &RfpId("rfp-1".to_string()), &run_id, &"rfp".to_string())
            .await;

        assert_eq!(outcome, StepOutcome::Failed("transient failure 3".to_string()));
        assert_eq!(step.calls.load(Ordering::SeqCst), 4);
        assert_eq!(
            sleeper.delays(),
            vec![Duration::from_secs(1), Duration::from_secs(2), Duration::from_secs(4)]
        );
        let activities = repos.activities.list_for_run(&run_id).await.expect("list");
        assert_eq!(activities[0].status, ActivityStatus::Failed);
        assert_eq!(activities[0].retry_count, activities[0].max_retries);
        let run = repos.runs.find_by_id(&run_id).await.expect("find").expect("run");
        assert_eq!((run.completed_steps, run.failed_steps), (0, 1));
    }

    struct BrokenActivities;

    #[async_trait]
    impl AgentActivityRepository for BrokenActivities {
        async fn create(
            &self,
            _activity: rfpflow_core::domain::workflow::AgentActivity,
        ) -> Result<(), RepositoryError> {
            Err(RepositoryError::Decode("disk full".to_string()))
        }

        async fn save(
            &self,
            _activity: rfpflow_core::domain::workflow::AgentActivity,
        ) -> Result<(), RepositoryError> {
            panic!("no update may follow a failed create");
        }

        async fn list_for_run(
            &self,
            _run_id: &WorkflowRunId,
        ) -> Result<Vec<rfpflow_core::domain::workflow::AgentActivity>, RepositoryError> {
            Ok(Vec::new())
        }
    }

    #[tokio::test]
    async fn activity_creation_failure_fails_the_step_without_running_it() {
        let repos = RepositorySet::in_memory();
        let run_id = running_run(&repos).await;
        let step = FlakyStep::new(0);
        let runtime = AgentRuntime::new(
            Arc::new(BrokenActivities),
            repos.runs.clone(),
            RetryPolicy::default(),
            Arc::new(RecordingSleeper::default()),
        );

        let outcome =
            runtime.execute(&step, &RfpId("rfp-1".to_string()), &run_id, &"rfp".to_string()).await;

        match outcome {
            StepOutcome::Failed(message) => assert!(message.contains("disk full")),
            other => panic!("unexpected outcome: {other:?}"),
        }
        assert_eq!(step.calls.load(Ordering::SeqCst), 0);
    }

    /// Accepts the initial insert but refuses every later update.
    #[derive(Default)]
    struct ReadOnlyActivities {
        inner: InMemoryAgentActivityRepository,
    }

    #[async_trait]
    impl AgentActivityRepository for ReadOnlyActivities {
        async fn create(&self, activity: AgentActivity) -> Result<(), RepositoryError> {
            self.inner.create(activity).await
        }

        async fn save(&self, _activity: AgentActivity) -> Result<(), RepositoryError> {
            Err(RepositoryError::Decode("database is locked".to_string()))
        }

        async fn list_for_run(
            &self,
            run_id: &WorkflowRunId,
        ) -> Result<Vec<AgentActivity>, RepositoryError> {
            self.inner.list_for_run(run_id).await
        }
    }

    #[tokio::test]
    async fn activity_update_failures_do_not_fail_the_step() {
        let repos = RepositorySet::in_memory();
        let run_id = running_run(&repos).await;
        let activities = Arc::new(ReadOnlyActivities::default());
        let sleeper = Arc::new(RecordingSleeper::default());
        let runtime = AgentRuntime::new(
            activities.clone(),
            repos.runs.clone(),
            RetryPolicy::default(),
            sleeper.clone(),
        );

        let outcome = runtime
            .execute(&FlakyStep::new(1), &RfpId("rfp-1".to_string()), &run_id, &"rfp".to_string())
            .await;

        assert_eq!(outcome, StepOutcome::Succeeded("handled rfp".to_string()));
        assert_eq!(sleeper.delays(), vec![Duration::from_secs(1)]);
        let stored = activities.list_for_run(&run_id).await.expect("list");
        assert_eq!(stored[0].status, ActivityStatus::InProgress);
        let run = repos.runs.find_by_id(&run_id).await.expect("find").expect("run");
        assert_eq!((run.completed_steps, run.failed_steps), (1, 0));
    }

    #[tokio::test]
    async fn abandoning_closes_only_open_activities() {
        let repos = RepositorySet::in_memory();
        let run_id = running_run(&repos).await;
        let runtime = runtime(&repos, Arc::new(RecordingSleeper::default()));
        runtime
            .execute(&FlakyStep::new(0), &RfpId("rfp-1".to_string()), &run_id, &"rfp".to_string())
            .await;
        let open = AgentActivity::start(run_id.clone(), AgentType::TechnicalSpecialist, 2, None, 3);
        repos.activities.create(open).await.expect("create");

        let abandoned = runtime.abandon_open_activities(&run_id, "Workflow aborted").await;

        assert_eq!(abandoned, 1);
        let activities = repos.activities.list_for_run(&run_id).await.expect("list");
        let statuses: Vec<_> = activities.iter().map(|a| (a.step_number, a.status)).collect();
        assert_eq!(
            statuses,
            vec![(1, ActivityStatus::Completed), (2, ActivityStatus::Failed)]
        );
        assert_eq!(activities[1].error.as_deref(), Some("Workflow aborted"));
        let run = repos.runs.find_by_id(&run_id).await.expect("find").expect("run");
        assert_eq!((run.completed_steps, run.failed_steps), (1, 1));
    }
}
