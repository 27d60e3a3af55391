// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! MultiNode specs
//!
//! Verify that two dispatchers running one group synchronise through a
//! real coordinator.

use std::time::Duration;

use crate::prelude::*;

/// A board that synchronises with its peer before reporting a result
const SYNC_BOARD: &str = r#"printf 'root@sim:~# \n'
read runner
echo "<LAVA_SIGNAL_STARTRUN 0_sync 7c1e>"
echo "<LAVA_MULTI_NODE> <LAVA_SYNC ready>"
read reply
case "$reply" in
  *LAVA_SYNC_COMPLETE*nack*) result=fail ;;
  *LAVA_SYNC_COMPLETE*) result=pass ;;
  *) result=unknown ;;
esac
echo "<LAVA_SIGNAL_TESTCASE TEST_CASE_ID=synced RESULT=$result>"
echo "<LAVA_SIGNAL_ENDRUN 0_sync 7c1e>"
echo "<LAVA_TEST_RUNNER>: exiting"
sleep 30
"#;

fn sync_job(group: &str, role: &str) -> String {
    format!(
        r#"
job_name: sync {role}
timeouts:
  job: {{minutes: 2}}
  action: {{seconds: 60}}
protocols:
  lava-multinode:
    target_group: {group}
    role: {role}
    group_size: 2
actions:
- boot:
    method: shell
    prompts: ["root@sim:~# "]
- test:
    role: [client, server]
    definitions:
    - {{name: sync, from: inline, path: sync.yaml}}
"#
    )
}

#[test]
fn multinode_job_describes_its_protocol() {
    let lab = Lab::new(SYNC_BOARD, "true");
    let run = lab
        .job("describe", &sync_job("grp-1", "client"))
        .args(&["--output", "json"])
        .passes();
    let description: serde_json::Value = serde_json::from_str(&run.stdout()).unwrap();
    assert!(description["job"]["protocols"]
        .as_object()
        .unwrap()
        .contains_key("lava-multinode"));
    assert_eq!(description["pipeline"][1]["name"], "multinode-test");
}

#[test]
fn two_dispatchers_sync_through_the_coordinator() {
    let lab = Lab::new(SYNC_BOARD, "true");
    let coordinator = Coordinator::start(&lab);
    lab.configure(&coordinator.dispatcher_config());

    let device = lab.path().join("device.yaml").display().to_string();
    let spawn = |id: &str, role: &str| {
        let job = lab.file(&format!("job-{}.yaml", role), &sync_job("grp-40", role));
        lab.lava_run()
            .args(&[
                "run",
                "--job",
                &job.display().to_string(),
                "--device",
                &device,
                "--job-id",
                id,
            ])
            .spawn()
    };
    let server = spawn("40.0", "server");
    let client = spawn("40.1", "client");

    for child in [server, client] {
        let run = RunAssert::from_output(child.wait_with_output().unwrap());
        assert_eq!(run.code(), Some(0), "stderr:\n{}", run.stderr());
        run.stderr_has("synced").stderr_has("\"pass\"");
    }
    assert!(
        wait_for(Duration::from_secs(5), || coordinator
            .log()
            .contains("Group complete, starting tests")),
        "log:\n{}",
        coordinator.log()
    );
}
