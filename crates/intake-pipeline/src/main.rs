//! Intake - Main entry point

use anyhow::{Context, Result};
use clap::Parser;
use intake_common::logging::{init_logging, LogConfig, LogLevel, LogOutput};
use intake_pipeline::{commands, Cli, Commands};
use std::process;
use tracing::error;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if cli.markdown_help {
        println!("{}", clap_markdown::help_markdown::<Cli>());
        return;
    }

    let Some(ref command) = cli.command else {
        eprintln!("Error: A subcommand is required");
        eprintln!();
        eprintln!("For more information, try '--help'.");
        process::exit(2);
    };

    let log_level = if cli.verbose {
        LogLevel::Debug
    } else {
        LogLevel::Info
    };

    let log_config = LogConfig::builder()
        .level(log_level)
        .output(LogOutput::Console)
        .log_file_prefix("intake")
        .build();

    // Environment variables take precedence over flags
    let log_config = log_config.clone().merge_env().unwrap_or(log_config);

    // The pipeline still runs without a subscriber
    let _guard = match init_logging(&log_config) {
        Ok(guard) => Some(guard),
        Err(e) => {
            eprintln!("Warning: logging disabled: {:#}", e);
            None
        },
    };

    if let Err(e) = execute_command(&cli, command).await {
        error!(error = %e, "Command failed");
        eprintln!("Error: {:#}", e);
        process::exit(1);
    }
}

/// Execute the CLI command
async fn execute_command(cli: &Cli, command: &Commands) -> Result<()> {
    let config = cli.resolve_config().context("Failed to load configuration")?;

    match command {
        Commands::Run => commands::run::run(&config).await?,
        Commands::Drain { max } => commands::run::drain(&config, *max).await?,
        Commands::Jobs { command } => commands::jobs::run(&config, command).await?,
    }

    Ok(())
}
