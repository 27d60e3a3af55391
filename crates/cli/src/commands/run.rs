// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `lava-run run` - Validate and run a job; the exit status is the job's
//! return code

use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Result;
use clap::Args;
use lava_core::JobOutcome;
use tokio::sync::Notify;

use super::exit;
use super::job::JobArgs;
use crate::config::DispatcherConfig;
use crate::error::Report;

#[derive(Args, Debug)]
pub struct RunArgs {
    #[command(flatten)]
    pub job: JobArgs,
}

pub async fn handle(args: RunArgs, config: &DispatcherConfig) -> Result<ExitCode> {
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

    let interrupted = Arc::new(Notify::new());
    let notify = Arc::clone(&interrupted);
    ctrlc::set_handler(move || {
        eprintln!("\nCanceling job...");
        notify.notify_one();
    })?;

    let outcome = job
        .run_until(async move { interrupted.notified().await })
        .await;
    let code = outcome.return_code();
    match &outcome {
        JobOutcome::Complete => tracing::info!("Job {} finished", job.id()),
        JobOutcome::Failed(e) => eprint!("{}", Report::job_failed(job.id(), e)),
        JobOutcome::Canceled => eprint!("{}", Report::canceled(job.id(), code)),
    }
    Ok(exit(code))
}
