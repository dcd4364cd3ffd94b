use rfpflow_core::config::AppConfig;
use rfpflow_core::domain::workflow::WorkflowRunId;

use crate::commands::{block_on, open_store, orchestrator, workflow_failure, CommandResult};

pub fn run(config: &AppConfig, run_id: &str) -> CommandResult {
    block_on("status", async {
        let (pool, repos) = open_store(config).await?;
        let orchestrator = orchestrator(config, repos)?;

        let status = orchestrator.get_workflow_status(&WorkflowRunId(run_id.to_string())).await;
        pool.close().await;

        let status = status.map_err(|error| workflow_failure(error, run_id))?;
        let message = format!(
            "workflow run #{} for RFP {} is {} ({} completed, {} failed of {} steps)",
            status.run.run_number,
            status.run.rfp_id.0,
            status.run.status.as_str(),
            status.run.completed_steps,
            status.run.failed_steps,
            status.run.total_steps
        );
        Ok(CommandResult::success_with_data("status", message, &status))
    })
}
