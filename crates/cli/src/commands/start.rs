use clap::Args;

use rfpflow_agent::StartWorkflow;
use rfpflow_core::config::AppConfig;
use rfpflow_core::domain::rfp::RfpId;
use rfpflow_core::domain::workflow::TriggerType;

use crate::commands::{block_on, follow_run, open_store, orchestrator, workflow_failure, CommandResult};

#[derive(Debug, Clone, Args)]
pub struct StartArgs {
    #[arg(long, help = "Identifier of the RFP to process")]
    pub rfp: String,
    #[arg(
        long,
        default_value = "manual",
        value_parser = parse_trigger,
        help = "Trigger recorded on the run (manual, auto_email, auto_website)"
    )]
    pub trigger: TriggerType,
    #[arg(long, help = "Free-text reason recorded on the run")]
    pub reason: Option<String>,
    #[arg(long, help = "User who requested the run")]
    pub user: Option<String>,
}

impl StartArgs {
    pub fn manual(rfp: impl Into<String>) -> Self {
        Self { rfp: rfp.into(), trigger: TriggerType::Manual, reason: None, user: None }
    }
}

/// Starts a run and waits for the pipeline to finish before reporting.
pub fn run(config: &AppConfig, args: StartArgs) -> CommandResult {
    block_on("start", async {
        let (pool, repos) = open_store(config).await?;
        let orchestrator = orchestrator(config, repos)?;

        let request = StartWorkflow {
            rfp_id: RfpId(args.rfp.clone()),
            trigger_type: args.trigger,
            trigger_reason: args.reason,
            user_id: args.user,
        };
        let outcome = match orchestrator.start_workflow(request).await {
            Ok(launch) => follow_run("start", &orchestrator, launch).await,
            Err(error) => Err(workflow_failure(error, &args.rfp)),
        };

        pool.close().await;
        outcome
    })
}

fn parse_trigger(value: &str) -> Result<TriggerType, String> {
    match TriggerType::parse(value) {
        Some(TriggerType::Retry) => Err("retry runs are started with `rfpflow retry`".to_string()),
        Some(trigger) => Ok(trigger),
        None => Err(format!("unknown trigger `{value}` (expected manual, auto_email or auto_website)")),
    }
}
