// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `lava-run describe` - Print the pipeline a job would run

use std::process::ExitCode;

use anyhow::Result;
use clap::Args;

use super::exit;
use super::job::JobArgs;
use crate::config::DispatcherConfig;
use crate::output::{self, OutputFormat};

#[derive(Args, Debug)]
pub struct DescribeArgs {
    #[command(flatten)]
    pub job: JobArgs,

    #[arg(long, value_enum, default_value_t)]
    pub output: OutputFormat,
}

pub fn handle(args: DescribeArgs, config: &DispatcherConfig) -> Result<ExitCode> {
    match args.job.load(config)? {
        Ok(job) => {
            output::print(&job.describe(), args.output)?;
            Ok(ExitCode::SUCCESS)
        }
        Err(report) => {
            eprint!("{}", report);
            Ok(exit(report.code))
        }
    }
}
