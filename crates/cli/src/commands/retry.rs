use rfpflow_core::config::AppConfig;
use rfpflow_core::domain::workflow::WorkflowRunId;

use crate::commands::{block_on, follow_run, open_store, orchestrator, workflow_failure, CommandResult};

/// Retries a failed run as a new run of the same RFP and waits for it to finish.
pub fn run(config: &AppConfig, run_id: &str) -> CommandResult {
    block_on("retry", async {
        let (pool, repos) = open_store(config).await?;
        let orchestrator = orchestrator(config, repos)?;

        let outcome = match orchestrator.retry_workflow(&WorkflowRunId(run_id.to_string())).await {
            Ok(launch) => follow_run("retry", &orchestrator, launch).await,
            Err(error) => Err(workflow_failure(error, run_id)),
        };

        pool.close().await;
        outcome
    })
}
