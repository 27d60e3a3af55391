// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Arguments shared by the commands that load a job

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Args;
use lava_adapters::{ProcessRunner, ShellConnector, TracedRunner};
use lava_core::{Job, LavaError};
use lava_parser::{parse_device, JobParser, ParseOptions};

use crate::config::DispatcherConfig;
use crate::error::Report;

#[derive(Args, Debug)]
pub struct JobArgs {
    /// Job definition (YAML)
    #[arg(long)]
    pub job: PathBuf,

    /// Device configuration (YAML)
    #[arg(long)]
    pub device: PathBuf,

    /// Job identifier; multinode sub-jobs use `<id>.<sub_id>`
    #[arg(long, default_value = "0")]
    pub job_id: String,

    /// Talk to the coordinator debug port and skip group setup
    #[arg(long)]
    pub multinode_debug: bool,
}

impl JobArgs {
    /// Read and parse the job for this host.
    ///
    /// Unreadable files are errors; definitions the engine rejects come
    /// back as a [`Report`].
    pub fn load(&self, config: &DispatcherConfig) -> Result<Result<Job, Report>> {
        let job = std::fs::read_to_string(&self.job)
            .with_context(|| format!("Unable to read job {}", self.job.display()))?;
        let device = std::fs::read_to_string(&self.device)
            .with_context(|| format!("Unable to read device {}", self.device.display()))?;

        let options = ParseOptions {
            protocols: config.protocol_settings(self.multinode_debug),
            tmp_dir: config.tmp_dir.clone(),
            runner: Some(Arc::new(TracedRunner::new(ProcessRunner::new()))),
            connector: Some(Arc::new(ShellConnector::new())),
            sink: None,
        };
        let parsed = parse_device(&device)
            .and_then(|device| JobParser::parse(&job, device, &self.job_id, &options));
        Ok(parsed.map_err(|e| {
            let error = LavaError::from(e);
            tracing::error!("{}", error);
            Report::job_failed(&self.job_id, &error)
        }))
    }
}
