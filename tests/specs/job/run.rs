// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Job execution specs
//!
//! Verify that jobs run against a simulated board, report results and
//! always power the device off.

use std::process::Command;
use std::time::Duration;

use crate::job_validate::SHELL_JOB;
use crate::prelude::*;

#[test]
fn shell_job_completes() {
    let lab = Lab::passing();
    lab.job("run", SHELL_JOB)
        .args(&["--job-id", "21"])
        .passes()
        .stderr_has("Job 21 finished");
}

#[test]
fn test_cases_are_logged_as_results() {
    let lab = Lab::passing();
    lab.job("run", SHELL_JOB)
        .passes()
        .stderr_has("boots")
        .stderr_has("network")
        .stderr_has("0_smoke");
}

#[test]
fn failing_test_case_does_not_fail_the_job() {
    let lab = Lab::passing();
    lab.job("run", SHELL_JOB)
        .passes()
        .stderr_lacks("suggestions:");
}

#[test]
fn device_is_powered_off_after_the_job() {
    let lab = Lab::passing();
    lab.job("run", SHELL_JOB).passes();
    assert_eq!(lab.read("power.log"), "off\n");
}

#[test]
fn temporary_directory_is_removed() {
    let lab = Lab::passing();
    lab.job("run", SHELL_JOB)
        .args(&["--job-id", "22"])
        .passes();
    assert!(!lab.path().join("tmp").join("22").exists());
}

#[test]
fn user_commands_run_on_the_host() {
    let lab = Lab::passing();
    let job = "actions:\n- command:\n    name: mark\n- command:\n    name: mark\n";
    lab.job("run", job).passes();
    assert_eq!(lab.read("marks.log"), "mark\nmark\n");
}

#[test]
fn silent_board_times_out() {
    let lab = Lab::new(SILENT_BOARD, "true");
    let job = r#"
timeouts:
  job: {seconds: 3}
actions:
- boot:
    method: shell
    prompts: ["root@sim:~# "]
"#;
    lab.job("run", job)
        .fails_with(1)
        .stderr_has("timed out");
    assert_eq!(lab.read("power.log"), "off\n");
}

#[test]
fn interrupt_cancels_the_job() {
    let lab = Lab::new(SILENT_BOARD, "true");
    let job = r#"
timeouts:
  job: {minutes: 5}
actions:
- boot:
    method: shell
    prompts: ["root@sim:~# "]
"#;
    let child = lab.job("run", job).spawn();
    std::thread::sleep(Duration::from_secs(2));
    Command::new("kill")
        .args(["-INT", &child.id().to_string()])
        .status()
        .unwrap();

    let run = RunAssert::from_output(child.wait_with_output().unwrap());
    assert_eq!(run.code(), Some(6), "stderr:\n{}", run.stderr());
    run.stderr_has("job 0 was canceled");
    assert!(wait_for(Duration::from_secs(5), || !lab.read("power.log").is_empty()));
}
