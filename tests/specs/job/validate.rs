// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Job validation specs
//!
//! Verify that jobs are parsed into pipelines and validated without
//! touching the device.

use crate::prelude::*;

pub const SHELL_JOB: &str = r#"
job_name: shell smoke
timeouts:
  job: {minutes: 2}
  action: {seconds: 30}
actions:
- deploy:
    to: commands
- boot:
    method: shell
    prompts: ["root@sim:~# "]
- test:
    definitions:
    - {name: smoke, from: inline, path: smoke.yaml}
"#;

fn pipeline_names(description: &serde_json::Value) -> Vec<String> {
    description["pipeline"]
        .as_array()
        .unwrap()
        .iter()
        .map(|a| a["name"].as_str().unwrap().to_string())
        .collect()
}

#[test]
fn valid_job_is_reported_by_id() {
    let lab = Lab::passing();
    lab.job("validate", SHELL_JOB)
        .args(&["--job-id", "17"])
        .passes()
        .stdout_eq("Job 17 is valid\n");
}

#[test]
fn validate_does_not_power_the_device() {
    let lab = Lab::passing();
    lab.job("validate", SHELL_JOB).passes();
    assert!(lab.read("power.log").is_empty());
    assert!(!lab.path().join("tmp").join("0").exists());
}

#[test]
fn stages_become_the_top_level_pipeline() {
    let lab = Lab::passing();
    let run = lab
        .job("describe", SHELL_JOB)
        .args(&["--output", "json"])
        .passes();
    let description: serde_json::Value = serde_json::from_str(&run.stdout()).unwrap();
    similar_asserts::assert_eq!(
        pipeline_names(&description),
        vec!["deploy-commands", "boot-shell-retry", "lava-test-retry", "finalize"]
    );
    similar_asserts::assert_eq!(description["job"]["timeout"], serde_json::json!(120));
}

#[test]
fn describe_defaults_to_yaml() {
    let lab = Lab::passing();
    let run = lab.job("describe", SHELL_JOB).passes();
    let description: serde_yaml::Value = serde_yaml::from_str(&run.stdout()).unwrap();
    assert_eq!(description["device"]["hostname"].as_str(), Some("sim-01"));
}

#[test]
fn repeat_expands_its_actions() {
    let lab = Lab::passing();
    let job = r#"
actions:
- repeat:
    count: 2
    actions:
    - boot:
        method: shell
        prompts: ["root@sim:~# "]
"#;
    let run = lab
        .job("describe", job)
        .args(&["--output", "json"])
        .passes();
    let description: serde_json::Value = serde_json::from_str(&run.stdout()).unwrap();
    let boots = pipeline_names(&description)
        .iter()
        .filter(|name| name.as_str() == "boot-shell-retry")
        .count();
    assert_eq!(boots, 2);
}

#[test]
fn common_namespace_cannot_mix_with_others() {
    let lab = Lab::passing();
    let job = r#"
actions:
- deploy:
    to: commands
- boot:
    namespace: target
    method: shell
    prompts: ["root@sim:~# "]
"#;
    lab.job("validate", job)
        .fails_with(2)
        .stderr_has("'common' is a reserved namespace");
}
