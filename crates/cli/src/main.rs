// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! lava-run - run LAVA test jobs on a dispatcher host

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

mod commands;
mod completions;
mod config;
mod error;
mod output;

use anyhow::Result;
use clap::{Parser, Subcommand};
use commands::{describe, run, validate};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

use crate::config::DispatcherConfig;

#[derive(Parser)]
#[command(
    name = "lava-run",
    version,
    about = "LAVA dispatcher - validate and run test jobs against a device"
)]
struct Cli {
    /// Dispatcher configuration [default: $XDG_CONFIG_HOME/lava/dispatcher.toml]
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log filter, overrides RUST_LOG and the configuration
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Parse and validate a job
    Validate(validate::ValidateArgs),
    /// Validate and run a job
    Run(run::RunArgs),
    /// Describe the pipeline of a job
    Describe(describe::DescribeArgs),
    /// Generate shell completions
    Completions(completions::CompletionsArgs),
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    if let Commands::Completions(args) = cli.command {
        completions::generate_completions::<Cli>(args.shell);
        return Ok(ExitCode::SUCCESS);
    }

    let config = DispatcherConfig::locate(cli.config.as_deref())?;
    setup_logging(cli.log_level.as_deref(), &config);

    match cli.command {
        Commands::Validate(args) => validate::handle(args, &config).await,
        Commands::Run(args) => run::handle(args, &config).await,
        Commands::Describe(args) => describe::handle(args, &config),
        Commands::Completions(_) => Ok(ExitCode::SUCCESS),
    }
}

fn setup_logging(level: Option<&str>, config: &DispatcherConfig) {
    let filter = match level {
        Some(level) => EnvFilter::new(level),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(config.log_level.as_deref().unwrap_or("info"))
        }),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
