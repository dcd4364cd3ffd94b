pub mod commands;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use rfpflow_core::config::{AppConfig, LoadOptions, LogFormat};

use crate::commands::start::StartArgs;
use crate::commands::CommandResult;

#[derive(Debug, Parser)]
#[command(
    name = "rfpflow",
    about = "rfpflow operator CLI",
    long_about = "Run RFP response workflows, inspect their status, and manage the local store.",
    after_help = "Examples:\n  rfpflow migrate\n  rfpflow seed\n  rfpflow start --rfp rfp-demo-001\n  rfpflow status --run <run-id>"
)]
pub struct Cli {
    #[arg(long, global = true, help = "Path to a config file (defaults to rfpflow.toml)")]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Apply pending database migrations and return structured status output")]
    Migrate,
    #[command(about = "Load the demo catalog and RFP; safe to repeat")]
    Seed,
    #[command(
        about = "Inspect effective configuration values with source attribution and redaction"
    )]
    Config,
    #[command(about = "Run the four-step workflow for an RFP and print the final status")]
    Start(StartArgs),
    #[command(about = "Show a workflow run with its activities, model decisions and outputs")]
    Status {
        #[arg(long = "run", help = "Workflow run identifier")]
        run_id: String,
    },
    #[command(about = "Retry a failed workflow run as a new run of the same RFP")]
    Retry {
        #[arg(long = "run", help = "Workflow run identifier")]
        run_id: String,
    },
}

impl Command {
    fn name(&self) -> &'static str {
        match self {
            Self::Migrate => "migrate",
            Self::Seed => "seed",
            Self::Config => "config",
            Self::Start(_) => "start",
            Self::Status { .. } => "status",
            Self::Retry { .. } => "retry",
        }
    }
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();
    let options = LoadOptions {
        config_path: cli.config.clone(),
        require_file: cli.config.is_some(),
        ..LoadOptions::default()
    };

    let result = match AppConfig::load(options) {
        Ok(config) => {
            init_logging(&config);
            dispatch(&config, cli)
        }
        Err(error) => CommandResult::failure(
            cli.command.name(),
            "config_validation",
            format!("configuration issue: {error}"),
            2,
        ),
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}

fn dispatch(config: &AppConfig, cli: Cli) -> CommandResult {
    match cli.command {
        Command::Migrate => commands::migrate::run(config),
        Command::Seed => commands::seed::run(config),
        Command::Config => commands::config::run(config, cli.config.as_deref()),
        Command::Start(args) => commands::start::run(config, args),
        Command::Status { run_id } => commands::status::run(config, &run_id),
        Command::Retry { run_id } => commands::retry::run(config, &run_id),
    }
}

/// Logs go to stderr so stdout stays a single JSON document. `RUST_LOG` overrides the level.
fn init_logging(config: &AppConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.logging.level.as_str()));
    let builder =
        tracing_subscriber::fmt().with_target(false).with_env_filter(filter).with_writer(std::io::stderr);

    let _ = match config.logging.format {
        LogFormat::Compact => builder.compact().try_init(),
        LogFormat::Pretty => builder.pretty().try_init(),
        LogFormat::Json => builder.json().try_init(),
    };
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::{Cli, Command};

    #[test]
    fn start_parses_trigger_metadata() {
        let cli = Cli::parse_from([
            "rfpflow",
            "start",
            "--rfp",
            "rfp-demo-001",
            "--trigger",
            "auto_email",
            "--reason",
            "tender inbox",
            "--user",
            "ops",
        ]);

        let Command::Start(args) = cli.command else { panic!("expected start") };
        assert_eq!(args.rfp, "rfp-demo-001");
        assert_eq!(args.reason.as_deref(), Some("tender inbox"));
        assert_eq!(args.user.as_deref(), Some("ops"));
    }

    #[test]
    fn config_flag_is_global() {
        let cli = Cli::parse_from(["rfpflow", "status", "--run", "run-1", "--config", "alt.toml"]);

        assert_eq!(cli.config.as_deref(), Some(std::path::Path::new("alt.toml")));
        assert_eq!(cli.command.name(), "status");
    }

    #[test]
    fn retry_requires_a_run_id() {
        assert!(Cli::try_parse_from(["rfpflow", "retry"]).is_err());
    }
}
