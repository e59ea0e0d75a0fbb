//! fwr CLI - Main entry point

use clap::Parser;
use fwr_cli::{commands, Cli, Commands};
use fwr_common::logging::{init_logging, LogConfig, LogLevel, LogOutput};
use serde::Serialize;
use std::process;
use tracing::error;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let level = if cli.verbose { LogLevel::Debug } else { LogLevel::Warn };
    let log_config = LogConfig::builder()
        .level(level)
        .output(LogOutput::Console)
        .log_file_prefix("fwr-cli".to_string())
        .build();

    // Environment variables take precedence
    let log_config = log_config.clone().merge_env().unwrap_or(log_config);

    // The CLI works without logging
    let _guard = init_logging(&log_config).ok().flatten();

    let code = match execute_command(cli.command).await {
        Ok(code) => code,
        Err(e) => {
            error!(error = %e, "Command failed");
            eprintln!("Error: {e:#}");
            1
        }
    };

    process::exit(code);
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Run the command and return the process exit code
async fn execute_command(command: Commands) -> anyhow::Result<i32> {
    match command {
        Commands::Verify { archive } => {
            let report = commands::verify::run(&archive)?;
            print_json(&report)?;
            Ok(if report.valid { 0 } else { 1 })
        }
        Commands::ProcessUpload { bucket, key } => {
            let outcome = commands::pipeline::process_upload(bucket, key).await?;
            print_json(&outcome)?;
            Ok(0)
        }
        Commands::ReconcileDelete { bucket, key } => {
            let outcome = commands::pipeline::reconcile_delete(bucket, key).await?;
            print_json(&outcome)?;
            Ok(0)
        }
    }
}
