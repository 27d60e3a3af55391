// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! CLI error specs
//!
//! Verify error reports and the exit code of each error type.

use crate::prelude::*;

const COMMANDS_JOB: &str = r#"
job_name: host commands
timeouts:
  job: {minutes: 1}
actions:
- deploy:
    to: commands
"#;

#[test]
fn unknown_action_is_a_job_error() {
    let lab = Lab::passing();
    lab.job("validate", "actions:\n- flash: {to: emmc}\n")
        .fails_with(2)
        .stderr_has("error: Unknown action name 'flash'")
        .stderr_has("suggestions:");
}

#[test]
fn newer_compatibility_is_a_job_error() {
    let lab = Lab::passing();
    lab.job("validate", "compatibility: 9999\nactions: []\n")
        .fails_with(2)
        .stderr_has("Dispatcher unable to meet job compatibility requirement");
}

#[test]
fn unsupported_boot_method_fails_validation() {
    let lab = Lab::passing();
    lab.job(
        "validate",
        "actions:\n- boot:\n    method: u-boot\n    prompts: ['# ']\n",
    )
    .fails_with(2);
}

#[test]
fn broken_device_is_a_configuration_error() {
    let lab = Lab::passing();
    lab.file("device.yaml", "commands: [");
    lab.job("validate", COMMANDS_JOB)
        .fails_with(5)
        .stderr_has("Invalid device YAML");
}

#[test]
fn broken_dispatcher_configuration_is_reported() {
    let lab = Lab::passing();
    lab.file("dispatcher.toml", "tmp_dir = [");
    lab.job("validate", COMMANDS_JOB)
        .fails()
        .stderr_has("Invalid configuration");
}

#[test]
fn failing_host_command_is_an_infrastructure_error() {
    let lab = Lab::new(PASSING_BOARD, "false");
    lab.job("run", COMMANDS_JOB)
        .fails_with(1)
        .stderr_has("Unable to run 'false'")
        .stderr_has("failed with error type")
        .stderr_has("retry the job");
}
