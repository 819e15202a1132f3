//! wiresync CLI Binary
//!
//! Command-line interface for the wiresync artifact cache and reconciler.

use anyhow::Context;
use clap::Parser;
use std::process;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use wiresync::cli::{load_config, map_error, Cli, RunContext};
use wiresync::config::WiresyncConfig;
use wiresync::logging::{init_logging, LoggingConfig};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = match load_config(&cli.workspace, cli.config.as_deref(), cli.token.clone()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{}", map_error(&e));
            process::exit(1);
        }
    };

    let logging_config = build_logging_config(&cli, &config.logging);
    if let Err(e) = init_logging(Some(&logging_config)) {
        eprintln!("Failed to initialize logging: {}", e);
        process::exit(1);
    }

    match run(cli, config).await {
        Ok(output) => println!("{}", output),
        Err(e) => {
            error!("Command failed: {:#}", e);
            match e.downcast_ref::<wiresync::error::ApiError>() {
                Some(api_error) => eprintln!("{}", map_error(api_error)),
                None => eprintln!("{:#}", e),
            }
            process::exit(1);
        }
    }
}

async fn run(cli: Cli, config: WiresyncConfig) -> anyhow::Result<String> {
    let context = RunContext::from_config(config).context("Failed to initialize wiresync")?;
    info!("CLI context initialized");

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupt received; cancelling");
            on_interrupt.cancel();
        }
    });

    let output = context.execute(&cli.command, &cancel).await?;
    Ok(output)
}

/// Logging stays off unless --verbose; --log-level wins over config.
fn build_logging_config(cli: &Cli, configured: &LoggingConfig) -> LoggingConfig {
    if !cli.verbose {
        return LoggingConfig {
            level: "off".to_string(),
            ..LoggingConfig::default()
        };
    }

    let mut config = configured.clone();
    if let Some(ref level) = cli.log_level {
        config.level = level.clone();
    }
    config
}
