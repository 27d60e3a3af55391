// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `lava-run validate` - Check a job against a device without running it

use std::process::ExitCode;

use anyhow::Result;
use clap::Args;

use super::exit;
use super::job::JobArgs;
use crate::config::DispatcherConfig;
use crate::error::Report;
use crate::output::{self, OutputFormat};

#[derive(Args, Debug)]
pub struct ValidateArgs {
    #[command(flatten)]
    pub job: JobArgs,

    /// Print the pipeline description once the job is valid
    #[arg(long)]
    pub describe: bool,

    #[arg(long, value_enum, default_value_t)]
    pub output: OutputFormat,
}

pub async fn handle(args: ValidateArgs, config: &DispatcherConfig) -> Result<ExitCode> {
    let mut job = match args.job.load(config)? {
        Ok(job) => job,
        Err(report) => {
            eprint!("{}", report);
            return Ok(exit(report.code));
        }
    };

    if let Err(e) = job.validate().await {
        eprint!("{}", Report::job_failed(job.id(), &e));
        return Ok(exit(e.error_code()));
    }
    job.cleanup().await;

    if args.describe {
        output::print(&job.describe(), args.output)?;
    } else {
        println!("Job {} is valid", job.id());
    }
    Ok(ExitCode::SUCCESS)
}
