// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! CLI help specs
//!
//! Verify the command surface of lava-run.

use crate::prelude::*;

#[test]
fn help_lists_subcommands() {
    let lab = Lab::passing();
    let run = lab.lava_run().args(&["--help"]).passes();
    for subcommand in ["validate", "run", "describe", "completions"] {
        assert!(run.stdout().contains(subcommand), "missing {}", subcommand);
    }
}

#[test]
fn version_names_the_binary() {
    let lab = Lab::passing();
    lab.lava_run()
        .args(&["--version"])
        .passes()
        .stdout_has("lava-run");
}

#[test]
fn missing_subcommand_is_a_usage_error() {
    let lab = Lab::passing();
    lab.lava_run().fails_with(2).stderr_has("Usage");
}

#[test]
fn run_requires_a_job_and_a_device() {
    let lab = Lab::passing();
    lab.lava_run()
        .args(&["run"])
        .fails_with(2)
        .stderr_has("--job");
}

#[test]
fn completions_are_generated_without_a_configuration() {
    let lab = Lab::passing();
    std::fs::remove_file(lab.path().join("dispatcher.toml")).unwrap();
    lab.lava_run()
        .args(&["completions", "zsh"])
        .passes()
        .stdout_has("lava-run");
}
