// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared fixtures for CLI integration tests.

#![allow(dead_code)]

use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

/// Simulated board: prints a login prompt, waits for the test runner
/// command and answers with one passing test run.
pub const BOARD: &str = r#"printf 'sim login: root\nroot@sim:~# \n'
read runner
echo "<LAVA_SIGNAL_STARTRUN 0_smoke 4f2a>"
echo "<LAVA_SIGNAL_TESTCASE TEST_CASE_ID=pass-me RESULT=pass>"
echo "<LAVA_SIGNAL_ENDRUN 0_smoke 4f2a>"
echo "<LAVA_TEST_RUNNER>: exiting"
sleep 30
"#;

/// A device, dispatcher configuration and job written to a temporary
/// directory
pub struct Lab {
    pub dir: TempDir,
}

impl Lab {
    pub fn new(deploy_command: &str) -> Self {
        let dir = TempDir::new().expect("Failed to create temp directory");
        let board = dir.path().join("board.sh");
        fs::write(&board, BOARD).expect("Failed to write board script");
        let device = format!(
            r#"
hostname: sim-01
commands:
  connect: sh {board}
  power_off: "true"
  users:
    touch_marker:
      do: touch {marker}
actions:
  deploy:
    methods:
      commands:
        run: "{deploy}"
  boot:
    methods: [shell]
"#,
            board = board.display(),
            marker = dir.path().join("marker").display(),
            deploy = deploy_command,
        );
        fs::write(dir.path().join("device.yaml"), device).expect("Failed to write device");
        let config = format!("tmp_dir = \"{}\"\n", dir.path().join("tmp").display());
        fs::write(dir.path().join("dispatcher.toml"), config).expect("Failed to write config");
        Self { dir }
    }

    pub fn job(&self, content: &str) -> PathBuf {
        let path = self.dir.path().join("job.yaml");
        fs::write(&path, content).expect("Failed to write job");
        path
    }

    pub fn device(&self) -> PathBuf {
        self.dir.path().join("device.yaml")
    }

    pub fn config(&self) -> PathBuf {
        self.dir.path().join("dispatcher.toml")
    }

    pub fn marker(&self) -> PathBuf {
        self.dir.path().join("marker")
    }

    /// `--config`, `--job` and `--device` arguments for `job`
    pub fn args(&self, job: &str) -> Vec<String> {
        let job = self.job(job);
        vec![
            "--config".to_string(),
            self.config().display().to_string(),
            "--job".to_string(),
            job.display().to_string(),
            "--device".to_string(),
            self.device().display().to_string(),
        ]
    }
}

pub const COMMANDS_JOB: &str = r#"
job_name: host commands
timeouts:
  job: {minutes: 2}
actions:
- deploy:
    to: commands
- command:
    name: touch_marker
"#;

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
