// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Test strategies and the test shell
//!
//! The test shell starts the test runner on the device and follows its
//! output until the runner exits. Signals embedded in the output report
//! results; in a multinode job they also relay messages between sub-jobs.


use async_trait::async_trait;
use lava_core::{
    Action, Connection, DeviceConfig, LavaError, Parameters, RetryAction, RunContext, Strategy,
    Timeout, ValidateContext, ACTION_TIMEOUT,
};
use lava_protocols::multinode::NAME as MULTINODE;
use multinode::MultinodeSignal;
use serde_json::{json, Value};
use signals::{Signal, TestRun, INSTALLER_FAILED, MULTINODE as MULTINODE_SIGNAL, RUNNER_EXIT, SIGNAL};

/// Closed set of test methods
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LavaTest {
    Shell,
    Multinode,
}

pub const TEST: [LavaTest; 2] = [LavaTest::Shell, LavaTest::Multinode];

fn has_definitions(parameters: &Parameters) -> bool {
    parameters.contains_key("definitions") || parameters.contains_key("definition")
}

impl Strategy for LavaTest {
    fn name(&self) -> &str {
        match self {
            LavaTest::Shell => "lava-test-shell",
            LavaTest::Multinode => "multinode-test",
        }
    }

    fn priority(&self) -> u32 {
        match self {
            LavaTest::Shell => 1,
            LavaTest::Multinode => 2,
        }
    }

    fn accepts(&self, _device: &DeviceConfig, parameters: &Parameters) -> (bool, String) {
        match self {
            LavaTest::Shell if has_definitions(parameters) => (true, "accepted".to_string()),
            LavaTest::Shell => (false, "no definitions in the test block".to_string()),
            LavaTest::Multinode => {
                if !parameters.contains_key("role") {
                    return (false, "'role' not in parameters".to_string());
                }
                let grouped = parameters
                    .get(MULTINODE)
                    .is_some_and(|block| block.get("target_group").is_some());
                if !grouped {
                    return (false, format!("'target_group' not in the {} block", MULTINODE));
                }
                (true, "accepted".to_string())
            }
        }
    }

    fn build(&self) -> Box<dyn Action> {
        match self {
            LavaTest::Shell => Box::new(
                RetryAction::new(
                    "lava-test-retry",
                    "lava-test-retry",
                    "Retry wrapper for lava-test-shell",
                )
                .with_section("test")
                .with_child(Box::new(TestShellAction::new())),
            ),
            LavaTest::Multinode => Box::new(TestShellAction::multinode()),
        }
    }
}

/// Definitions named by the test block
fn definitions(parameters: &Parameters) -> Vec<&Value> {
    match parameters.get("definitions").or_else(|| parameters.get("definition")) {
        Some(Value::Array(list)) => list.iter().collect(),
        Some(one) => vec![one],
        None => Vec::new(),
    }
}

fn valid_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
}

/// Runs the test runner and interprets its signals
pub struct TestShellAction {
    multinode: bool,
}

impl TestShellAction {
    pub fn new() -> Self {
        Self { multinode: false }
    }

    /// Variant that also relays multinode signals
    pub fn multinode() -> Self {
        Self { multinode: true }
    }

    fn patterns(&self) -> Vec<String> {
        let mut patterns = vec![
            RUNNER_EXIT.to_string(),
            INSTALLER_FAILED.to_string(),
            SIGNAL.to_string(),
        ];
        if self.multinode {
            patterns.push(MULTINODE_SIGNAL.to_string());
        }
        patterns
    }

    /// Relay one multinode signal and answer the device
    async fn relay(
        &self,
        cx: &mut RunContext<'_>,
        conn: &mut Box<dyn Connection>,
        signal: MultinodeSignal,
    ) -> Result<(), LavaError> {
        let timeout = match cx.parameters().get(MULTINODE).and_then(|b| b.get("timeout")) {
            Some(value) => Some(Timeout::parse(value)?.as_secs()),
            None => None,
        };
        let request = signal.request(timeout);
        let protocol = cx
            .env_mut()
            .protocols
            .get_mut(MULTINODE)
            .ok_or_else(|| LavaError::job("Invalid job - missing protocol"))?;
        tracing::debug!(request = %request, "relaying multinode signal");
        let reply = protocol.call(&request).await?;
        if let Some(line) = signal.reply_line(&reply)? {
            let delay = cx.meta().character_delay;
            conn.sendline(&line, delay).await?;
        }
        Ok(())
    }
}

impl Default for TestShellAction {
    fn default() -> Self {
        Self::new()
    }
}

/// Where the test overlay lands on the device
pub(crate) fn results_dir(cx: &RunContext<'_>) -> String {
    cx.parameters()
        .get("lava_test_results_dir")
        .or_else(|| cx.device().constants.get("lava_test_results_dir"))
        .and_then(Value::as_str)
        .map(|dir| dir.replace("%s", &cx.env().job_id))
        .unwrap_or_else(|| format!("/lava-{}", cx.env().job_id))
}

fn runner_command(cx: &RunContext<'_>) -> String {
    let dir = results_dir(cx);
    let stage = cx.parameters().get("stage").and_then(Value::as_u64).unwrap_or(0);
    format!("{}/bin/lava-test-runner {}/{}", dir, dir, stage)
}

#[async_trait]
impl Action for TestShellAction {
    fn name(&self) -> &str {
        if self.multinode {
            "multinode-test"
        } else {
            "lava-test-shell"
        }
    }

    fn summary(&self) -> &str {
        if self.multinode {
            "Multinode Lava Test Shell"
        } else {
            "Lava Test Shell"
        }
    }

    fn description(&self) -> &str {
        "Executing lava-test-runner"
    }

    fn section(&self) -> Option<&str> {
        Some("test")
    }

    fn validate(&mut self, cx: &mut ValidateContext<'_>) -> Result<(), LavaError> {
        let parameters = cx.parameters().clone();
        let found = definitions(&parameters);
        if found.is_empty() {
            cx.error("Missing test definitions");
        }
        let mut problems = Vec::new();
        for definition in found {
            match definition.get("name").and_then(Value::as_str) {
                None => problems.push(format!("Test definition lacks a name: {}", definition)),
                Some(name) if !valid_name(name) => problems.push(format!(
                    "Invalid characters found in test definition name: {}",
                    name
                )),
                Some(_) => {}
            }
        }
        for problem in problems {
            cx.error(problem);
        }
        if self.multinode {
            if cx.protocol(MULTINODE).is_none() {
                cx.error("Invalid job - missing protocol");
            }
            if !cx.parameters().contains_key("role") {
                cx.error("Invalid job - missing role");
            }
        }
        Ok(())
    }

    async fn run(
        &mut self,
        cx: &mut RunContext<'_>,
        connection: &mut Option<Box<dyn Connection>>,
    ) -> Result<Option<Box<dyn Connection>>, LavaError> {
        cx.call_protocols().await?;
        let conn = connection
            .as_mut()
            .ok_or_else(|| LavaError::bug("No connection available for the test shell"))?;
        if conn.prompt_str().is_empty() {
            if let Some(prompt) = cx.device().constants.get("default-shell-prompt").and_then(Value::as_str) {
                conn.set_prompt_str(vec![prompt.to_string()]);
            }
        }
        conn.set_timeout(cx.meta().connection_timeout.clone());
        let delay = cx.meta().character_delay;
        let quiet = cx
            .meta()
            .connection_timeout
            .duration()
            .unwrap_or(ACTION_TIMEOUT);

        let command = runner_command(cx);
        tracing::info!("Using {}", command);
        conn.sendline(&command, delay).await?;

        let patterns = self.patterns();
        let mut run = TestRun::new(cx.namespace());
        let mut cases = 0u64;
        let mut dropped = false;
        loop {
            let found = match conn.expect(&patterns, quiet.min(cx.remaining())).await {
                Ok(found) => found,
                Err(LavaError::Timeout { .. }) if !cx.remaining().is_zero() => {
                    tracing::warn!("No test output for {}s, still waiting", quiet.as_secs());
                    continue;
                }
                Err(LavaError::Infrastructure(msg)) => {
                    tracing::error!(error = %msg, "lava_test_shell connection dropped");
                    dropped = true;
                    break;
                }
                Err(e) => return Err(e),
            };
            let name = found.group(0).unwrap_or_default().to_string();
            let params = found.group(1).unwrap_or_default().to_string();
            match found.index {
                0 => {
                    tracing::info!("ok: lava_test_shell seems to have completed");
                    break;
                }
                1 => tracing::warn!("{} installer failed, skipping", name),
                2 => {
                    let signal = Signal::parse(&name, &params)?;
                    if let Some(record) = run.handle(signal)? {
                        cases += 1;
                        cx.emit(&record);
                    }
                }
                _ => {
                    let signal = MultinodeSignal::parse(&name, &params)?;
                    let case = signal.case();
                    match self.relay(cx, conn, signal).await {
                        Ok(()) => {
                            cases += 1;
                            cx.emit(&run.multinode_case(&case, "pass"));
                        }
                        Err(e @ LavaError::Timeout { .. }) => {
                            tracing::warn!("Sync error in multinode signal {}: {}", name, e);
                            cases += 1;
                            cx.emit(&run.multinode_case(&case, "fail"));
                            break;
                        }
                        Err(e) => return Err(e),
                    }
                }
            }
        }

        if let Some(record) = run.finish() {
            cx.emit(&record);
        }
        cx.set_result("records", json!(cases));
        if dropped {
            return Err(LavaError::test("lava_test_shell connection dropped"));
        }
        Ok(None)
    }
}

#[cfg(test)]
#[path = "test_tests.rs"]
mod tests;
