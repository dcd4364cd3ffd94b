pub mod config;
pub mod migrate;
pub mod retry;
pub mod seed;
pub mod start;
pub mod status;

use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use tracing::info;

use rfpflow_agent::{build_orchestrator, Orchestrator, WorkflowError, WorkflowLaunch};
use rfpflow_core::audit::TracingAuditSink;
use rfpflow_core::config::AppConfig;
use rfpflow_core::domain::workflow::RunStatus;
use rfpflow_core::errors::{ApplicationError, InterfaceError};
use rfpflow_db::{connect_with_config, migrations, DbPool, RepositorySet};

#[derive(Debug, Clone)]
pub struct CommandResult {
    pub exit_code: u8,
    pub output: String,
}

#[derive(Debug, Serialize)]
struct CommandOutcome {
    command: String,
    status: String,
    error_class: Option<String>,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<Value>,
}

/// Error class, message and exit code of a failed command.
pub(crate) type Failure = (&'static str, String, u8);

impl CommandResult {
    pub fn success(command: &str, message: impl Into<String>) -> Self {
        Self::emit(command, None, message.into(), None, 0)
    }

    pub fn success_with_data(command: &str, message: impl Into<String>, data: impl Serialize) -> Self {
        Self::emit(command, None, message.into(), to_value(data), 0)
    }

    pub fn failure(
        command: &str,
        error_class: &str,
        message: impl Into<String>,
        exit_code: u8,
    ) -> Self {
        Self::emit(command, Some(error_class), message.into(), None, exit_code)
    }

    pub fn failure_with_data(
        command: &str,
        error_class: &str,
        message: impl Into<String>,
        exit_code: u8,
        data: impl Serialize,
    ) -> Self {
        Self::emit(command, Some(error_class), message.into(), to_value(data), exit_code)
    }

    pub(crate) fn from_failure(command: &str, (error_class, message, exit_code): Failure) -> Self {
        Self::failure(command, error_class, message, exit_code)
    }

    fn emit(
        command: &str,
        error_class: Option<&str>,
        message: String,
        data: Option<Value>,
        exit_code: u8,
    ) -> Self {
        let payload = CommandOutcome {
            command: command.to_string(),
            status: if error_class.is_some() { "error" } else { "ok" }.to_string(),
            error_class: error_class.map(str::to_string),
            message,
            data,
        };
        Self { exit_code, output: serialize_payload(payload) }
    }
}

fn to_value(data: impl Serialize) -> Option<Value> {
    serde_json::to_value(data).ok()
}

fn serialize_payload(payload: CommandOutcome) -> String {
    serde_json::to_string(&payload).unwrap_or_else(|error| {
        format!(
            "{{\"command\":\"unknown\",\"status\":\"error\",\"error_class\":\"serialization\",\"message\":\"{}\"}}",
            error.to_string().replace('\\', "\\\\").replace('"', "\\\"")
        )
    })
}

/// Runs `body` on a fresh current-thread runtime, reporting runtime setup failures.
pub(crate) fn block_on<F>(command: &str, body: F) -> CommandResult
where
    F: std::future::Future<Output = Result<CommandResult, Failure>>,
{
    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            return CommandResult::failure(
                command,
                "runtime_init",
                format!("failed to initialize async runtime: {error}"),
                3,
            );
        }
    };

    match runtime.block_on(body) {
        Ok(result) => result,
        Err(failure) => CommandResult::from_failure(command, failure),
    }
}

/// Connects to the configured database and applies pending migrations.
pub(crate) async fn open_store(config: &AppConfig) -> Result<(DbPool, RepositorySet), Failure> {
    let pool = connect_with_config(&config.database)
        .await
        .map_err(|error| ("db_connectivity", error.to_string(), 4u8))?;
    migrations::run_pending(&pool).await.map_err(|error| ("migration", error.to_string(), 5u8))?;
    let repos = RepositorySet::sqlite(pool.clone());
    Ok((pool, repos))
}

pub(crate) fn orchestrator(config: &AppConfig, repos: RepositorySet) -> Result<Orchestrator, Failure> {
    build_orchestrator(config, repos, Arc::new(TracingAuditSink))
        .map_err(|error| ("config_validation", format!("configuration issue: {error:#}"), 2u8))
}

/// Maps a workflow error onto its interface class and exit code.
pub(crate) fn workflow_failure(error: WorkflowError, correlation_id: &str) -> Failure {
    let interface = ApplicationError::from(error).into_interface(correlation_id);
    let (error_class, exit_code) = match &interface {
        InterfaceError::BadRequest { .. } => ("bad_request", 6),
        InterfaceError::NotFound { .. } => ("not_found", 7),
        InterfaceError::ServiceUnavailable { .. } => ("service_unavailable", 8),
        InterfaceError::Internal { .. } => ("internal", 9),
    };
    (error_class, format!("{} ({interface})", interface.user_message()), exit_code)
}

/// Waits for a launched run to reach a terminal state and reports its status projection.
pub(crate) async fn follow_run(
    command: &str,
    orchestrator: &Orchestrator,
    launch: WorkflowLaunch,
) -> Result<CommandResult, Failure> {
    let run_id = launch.receipt.workflow_run_id.clone();
    info!(
        event_name = "cli.workflow.launched",
        correlation_id = %run_id,
        run_number = launch.receipt.run_number,
        "{}",
        launch.receipt.message
    );

    launch
        .completion
        .await
        .map_err(|error| ("internal", format!("workflow supervisor stopped: {error}"), 9u8))?;
    let status = orchestrator
        .get_workflow_status(&run_id)
        .await
        .map_err(|error| workflow_failure(error, &run_id.0))?;

    let run = &status.run;
    if run.status == RunStatus::Completed {
        let message = format!(
            "workflow run #{} completed for RFP {} ({} of {} steps)",
            run.run_number, run.rfp_id.0, run.completed_steps, run.total_steps
        );
        return Ok(CommandResult::success_with_data(command, message, &status));
    }

    let message = format!(
        "workflow run #{} ended {}: {}",
        run.run_number,
        run.status.as_str(),
        run.error.as_deref().unwrap_or("no error recorded")
    );
    Ok(CommandResult::failure_with_data(command, "workflow_failed", message, 10, &status))
}
