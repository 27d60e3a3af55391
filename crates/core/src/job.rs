// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The job: root of the action tree and owner of all per-job state

use crate::action::ActionTree;
use crate::connection::{CommandRunner, Connection, Connector};
use crate::device::DeviceConfig;
use crate::error::{LavaError, CANCELED_CODE};
use crate::namespace::{NamespaceData, DEFAULT_NAMESPACE};
use crate::pipeline;
use crate::protocol::ProtocolSet;
use crate::results::{ResultSink, TracingSink};
use crate::retry::RETRY_SLEEP;
use crate::timeout::Timeout;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// Compatibility level of pipelines built by this engine
pub const COMPATIBILITY: u64 = 2;

/// Time allowed for job cleanup after the pipeline stopped
pub const CLEANUP_TIMEOUT: Duration = Duration::from_secs(60);

/// Execution context threaded through every action.
///
/// Owned by the job. Actions reach it through their run context, never
/// through a global.
pub struct JobEnv {
    pub job_id: String,
    /// The job definition
    pub parameters: Value,
    pub device: Arc<DeviceConfig>,
    pub data: NamespaceData,
    pub protocols: ProtocolSet,
    pub sink: Arc<dyn ResultSink>,
    runner: Option<Arc<dyn CommandRunner>>,
    connector: Option<Arc<dyn Connector>>,
    /// Connections kept after a failed retry, per namespace
    parked: BTreeMap<String, Box<dyn Connection>>,
    pub started: bool,
    pub tmp_dir: PathBuf,
    pub retry_sleep: Duration,
}

impl JobEnv {
    pub fn new(job_id: impl Into<String>, parameters: Value, device: Arc<DeviceConfig>) -> Self {
        let job_id = job_id.into();
        let tmp_dir = std::env::temp_dir().join(format!("lava-{}", job_id));
        Self {
            job_id,
            parameters,
            device,
            data: NamespaceData::new(),
            protocols: ProtocolSet::default(),
            sink: Arc::new(TracingSink),
            runner: None,
            connector: None,
            parked: BTreeMap::new(),
            started: false,
            tmp_dir,
            retry_sleep: RETRY_SLEEP,
        }
    }

    pub fn with_sink(mut self, sink: Arc<dyn ResultSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn with_runner(mut self, runner: Arc<dyn CommandRunner>) -> Self {
        self.runner = Some(runner);
        self
    }

    pub fn with_connector(mut self, connector: Arc<dyn Connector>) -> Self {
        self.connector = Some(connector);
        self
    }

    pub fn with_protocols(mut self, protocols: ProtocolSet) -> Self {
        self.protocols = protocols;
        self
    }

    pub fn with_tmp_dir(mut self, tmp_dir: impl Into<PathBuf>) -> Self {
        self.tmp_dir = tmp_dir.into();
        self
    }

    pub fn with_retry_sleep(mut self, sleep: Duration) -> Self {
        self.retry_sleep = sleep;
        self
    }

    pub fn runner(&self) -> Result<Arc<dyn CommandRunner>, LavaError> {
        self.runner
            .clone()
            .ok_or_else(|| LavaError::bug("No command runner configured for this job"))
    }

    pub fn connector(&self) -> Result<Arc<dyn Connector>, LavaError> {
        self.connector
            .clone()
            .ok_or_else(|| LavaError::bug("No connector configured for this job"))
    }

    /// Keep a connection for later finalisation
    pub fn park(&mut self, namespace: &str, connection: Box<dyn Connection>) {
        tracing::debug!(namespace, connection = connection.name(), "parking connection");
        self.parked.insert(namespace.to_string(), connection);
    }

    pub fn take_parked(&mut self) -> Vec<(String, Box<dyn Connection>)> {
        std::mem::take(&mut self.parked).into_iter().collect()
    }

    pub fn parked_namespaces(&self) -> Vec<String> {
        self.parked.keys().cloned().collect()
    }
}

/// How a job ended
#[derive(Debug, Clone, PartialEq)]
pub enum JobOutcome {
    Complete,
    Failed(LavaError),
    Canceled,
}

impl JobOutcome {
    /// Process return code
    pub fn return_code(&self) -> i32 {
        match self {
            JobOutcome::Complete => 0,
            JobOutcome::Failed(e) => e.error_code(),
            JobOutcome::Canceled => CANCELED_CODE,
        }
    }
}

/// A test job: the action tree plus its execution context
pub struct Job {
    pub env: JobEnv,
    pub tree: ActionTree,
    pub timeout: Timeout,
    pub compatibility: u64,
    connection: Option<Box<dyn Connection>>,
    cleaned: bool,
}

impl Job {
    pub fn new(env: JobEnv, tree: ActionTree) -> Self {
        Self {
            env,
            tree,
            timeout: Timeout::inherit("job"),
            compatibility: COMPATIBILITY,
            connection: None,
            cleaned: false,
        }
    }

    pub fn id(&self) -> &str {
        &self.env.job_id
    }

    /// Configure protocols and validate the pipeline.
    ///
    /// Emits the `validate` result; on failure the job is cleaned up and the
    /// final job result is emitted too.
    pub async fn validate(&mut self) -> Result<(), LavaError> {
        tracing::info!("start: 0 validate");
        let start = Instant::now();
        let result = self.validate_inner();
        tracing::info!("validate duration: {:.02}", start.elapsed().as_secs_f64());
        self.env.sink.results(&json!({
            "definition": "lava",
            "case": "validate",
            "result": if result.is_ok() { "pass" } else { "fail" },
        }));
        if let Err(e) = &result {
            tracing::error!(error = %e, "{}", e);
            self.cleanup().await;
            self.emit_job_result(&JobOutcome::Failed(e.clone()));
        }
        result
    }

    fn validate_inner(&mut self) -> Result<(), LavaError> {
        let device = Arc::clone(&self.env.device);
        for protocol in self.env.protocols.iter_mut() {
            if let Err(e) = protocol.configure(&device, &self.env.job_id) {
                tracing::error!("Configuration failed for protocol {}", protocol.name());
                return Err(e);
            }
            if !protocol.valid() {
                return Err(LavaError::job(format!(
                    "protocol {} has errors: {:?}",
                    protocol.name(),
                    protocol.errors()
                )));
            }
        }
        self.check_namespaces()?;
        let root = self.tree.root();
        pipeline::validate_actions(&mut self.tree, &self.env, root)
    }

    /// Only actions naming a namespace count; the finalize action names none.
    fn check_namespaces(&self) -> Result<(), LavaError> {
        let mut namespaces: Vec<String> = self
            .tree
            .actions(self.tree.root())
            .iter()
            .filter_map(|id| self.tree.meta(*id).parameters.get("namespace"))
            .filter_map(Value::as_str)
            .map(str::to_string)
            .collect();
        namespaces.sort();
        namespaces.dedup();
        if namespaces.len() > 1 && namespaces.iter().any(|n| n == DEFAULT_NAMESPACE) {
            tracing::debug!("Namespaces: {}", namespaces.join(", "));
            return Err(LavaError::job(
                "'common' is a reserved namespace that should not be present with other namespaces",
            ));
        }
        Ok(())
    }

    /// Run the job to completion
    pub async fn run(&mut self) -> JobOutcome {
        self.run_until(std::future::pending()).await
    }

    /// Run the job until it ends or `cancel` resolves.
    ///
    /// Cleanup runs exactly once either way and the final job result is
    /// emitted.
    pub async fn run_until(&mut self, cancel: impl Future<Output = ()> + Send) -> JobOutcome {
        let outcome = tokio::select! {
            result = self.run_inner() => match result {
                Ok(()) => JobOutcome::Complete,
                Err(e) => JobOutcome::Failed(e),
            },
            _ = cancel => {
                tracing::error!("job canceled");
                JobOutcome::Canceled
            }
        };
        self.cleanup().await;
        self.emit_job_result(&outcome);
        outcome
    }

    async fn run_inner(&mut self) -> Result<(), LavaError> {
        self.env.started = true;
        for protocol in self.env.protocols.iter_mut() {
            protocol.set_up().await?;
            if !protocol.valid() {
                return Err(LavaError::job(format!(
                    "protocol {} has errors: {:?}",
                    protocol.name(),
                    protocol.errors()
                )));
            }
        }
        let end = self.timeout.max_end_time(Instant::now(), None);
        let root = self.tree.root();
        pipeline::run_actions(&mut self.tree, &mut self.env, root, &mut self.connection, end).await
    }

    /// Clean up every action and remove the job's temporary directory.
    ///
    /// Later calls do nothing.
    pub async fn cleanup(&mut self) {
        if self.cleaned {
            tracing::info!("Cleanup already called, skipping");
            return;
        }
        tracing::info!("Cleaning after the job");
        let root = self.tree.root();
        let work = pipeline::cleanup(&mut self.tree, &mut self.env, root, &mut self.connection);
        if tokio::time::timeout(CLEANUP_TIMEOUT, work).await.is_err() {
            tracing::error!("cleanup timed out after {}s", CLEANUP_TIMEOUT.as_secs());
        }
        match tokio::fs::remove_dir_all(&self.env.tmp_dir).await {
            Ok(()) => tracing::info!("Root tmp directory removed at {}", self.env.tmp_dir.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => tracing::error!("Unable to remove the directory: {}", e),
        }
        self.cleaned = true;
    }

    fn emit_job_result(&self, outcome: &JobOutcome) {
        let record = match outcome {
            JobOutcome::Complete => json!({"definition": "lava", "case": "job", "result": "pass"}),
            JobOutcome::Failed(e) => json!({
                "definition": "lava",
                "case": "job",
                "result": "fail",
                "error_msg": e.to_string(),
                "error_type": e.error_type(),
            }),
            JobOutcome::Canceled => json!({
                "definition": "lava",
                "case": "job",
                "result": "fail",
                "error_msg": "Canceled",
                "error_type": "Canceled",
            }),
        };
        if let JobOutcome::Failed(e) = outcome {
            tracing::error!("{}", e.error_help());
        }
        self.env.sink.results(&record);
    }

    /// Description of the job and its pipeline
    pub fn describe(&self) -> Value {
        let protocols: serde_json::Map<String, Value> = self
            .env
            .protocols
            .iter()
            .map(|p| (p.name().to_string(), p.describe()))
            .collect();
        json!({
            "device": {
                "hostname": self.env.device.hostname(),
            },
            "job": {
                "id": self.env.job_id,
                "timeout": self.timeout.duration().map(|d| d.as_secs()),
                "protocols": protocols,
            },
            "compatibility": self.compatibility,
            "pipeline": self.tree.describe(self.tree.root(), true),
        })
    }
}

#[cfg(test)]
#[path = "job_tests.rs"]
mod tests;
