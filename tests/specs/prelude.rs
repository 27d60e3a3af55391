// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared helpers for the behavioral specs.
//!
//! A [`Lab`] is a temporary directory holding a device, a dispatcher
//! configuration and jobs. [`Lab::lava_run`] and [`Coordinator::start`]
//! drive the real binaries.

#![allow(dead_code)]
#![allow(deprecated)]

use std::fs;
use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Output, Stdio};
use std::time::{Duration, Instant};
use tempfile::TempDir;

/// Login prompt used by every simulated board
pub const PROMPT: &str = "root@sim:~# ";

/// A board that boots to a prompt and runs one passing test case.
pub const PASSING_BOARD: &str = r#"printf 'sim login: root\nroot@sim:~# \n'
read runner
echo "<LAVA_SIGNAL_STARTRUN 0_smoke 4f2a>"
echo "<LAVA_SIGNAL_TESTCASE TEST_CASE_ID=boots RESULT=pass>"
echo "<LAVA_SIGNAL_TESTCASE TEST_CASE_ID=network RESULT=fail>"
echo "<LAVA_SIGNAL_ENDRUN 0_smoke 4f2a>"
echo "<LAVA_TEST_RUNNER>: exiting"
sleep 30
"#;

/// A board that never prints a prompt.
pub const SILENT_BOARD: &str = "sleep 30\n";

pub struct Lab {
    dir: TempDir,
}

impl Lab {
    /// A lab whose device connects to `board` and deploys with `deploy`
    pub fn new(board: &str, deploy: &str) -> Self {
        let lab = Self {
            dir: TempDir::new().expect("Failed to create temp directory"),
        };
        let script = lab.file("board.sh", board);
        lab.file(
            "device.yaml",
            &format!(
                r#"
hostname: sim-01
commands:
  connect: sh {script}
  power_off: "echo off >> {power}"
  users:
    mark:
      do: "echo mark >> {marks}"
actions:
  deploy:
    methods:
      commands:
        run: "{deploy}"
  boot:
    methods: [shell]
"#,
                script = script.display(),
                power = lab.path().join("power.log").display(),
                marks = lab.path().join("marks.log").display(),
            ),
        );
        lab.configure("");
        lab
    }

    /// A lab with a passing board and a host deploy command that succeeds
    pub fn passing() -> Self {
        Self::new(PASSING_BOARD, "true")
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Write a file relative to the lab
    pub fn file(&self, name: &str, content: &str) -> PathBuf {
        let path = self.path().join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("Failed to create directory");
        }
        fs::write(&path, content).expect("Failed to write file");
        path
    }

    pub fn read(&self, name: &str) -> String {
        fs::read_to_string(self.path().join(name)).unwrap_or_default()
    }

    /// Rewrite the dispatcher configuration, keeping the lab's tmp_dir
    pub fn configure(&self, extra: &str) {
        self.file(
            "dispatcher.toml",
            &format!(
                "tmp_dir = \"{}\"\n{}",
                self.path().join("tmp").display(),
                extra
            ),
        );
    }

    /// `lava-run` with the lab's configuration
    pub fn lava_run(&self) -> CliBuilder {
        let mut cmd = Command::new(assert_cmd::cargo::cargo_bin("lava-run"));
        cmd.env_remove("RUST_LOG")
            .current_dir(self.path())
            .arg("--config")
            .arg(self.path().join("dispatcher.toml"));
        CliBuilder { cmd }
    }

    /// `lava-run <subcommand> --job <job> --device <device>`
    pub fn job(&self, subcommand: &str, job: &str) -> CliBuilder {
        let job = self.file("job.yaml", job);
        let device = self.path().join("device.yaml");
        self.lava_run().args(&[
            subcommand,
            "--job",
            &job.display().to_string(),
            "--device",
            &device.display().to_string(),
        ])
    }
}

pub struct CliBuilder {
    cmd: Command,
}

impl CliBuilder {
    pub fn args(mut self, args: &[&str]) -> Self {
        self.cmd.args(args);
        self
    }

    pub fn env(mut self, key: &str, value: &str) -> Self {
        self.cmd.env(key, value);
        self
    }

    pub fn spawn(mut self) -> Child {
        self.cmd
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .expect("Failed to spawn lava-run")
    }

    fn output(mut self) -> RunAssert {
        RunAssert {
            output: self.cmd.output().expect("Failed to run lava-run"),
        }
    }

    /// Run and expect exit status 0
    pub fn passes(self) -> RunAssert {
        let run = self.output();
        assert!(
            run.output.status.success(),
            "expected success, got {:?}\nstdout:\n{}\nstderr:\n{}",
            run.output.status.code(),
            run.stdout(),
            run.stderr()
        );
        run
    }

    /// Run and expect exit status `code`
    pub fn fails_with(self, code: i32) -> RunAssert {
        let run = self.output();
        assert_eq!(
            run.output.status.code(),
            Some(code),
            "stdout:\n{}\nstderr:\n{}",
            run.stdout(),
            run.stderr()
        );
        run
    }

    pub fn fails(self) -> RunAssert {
        let run = self.output();
        assert!(!run.output.status.success(), "expected failure");
        run
    }
}

pub struct RunAssert {
    output: Output,
}

impl RunAssert {
    pub fn from_output(output: Output) -> Self {
        Self { output }
    }

    pub fn stdout(&self) -> String {
        String::from_utf8_lossy(&self.output.stdout).into_owned()
    }

    pub fn stderr(&self) -> String {
        String::from_utf8_lossy(&self.output.stderr).into_owned()
    }

    pub fn code(&self) -> Option<i32> {
        self.output.status.code()
    }

    pub fn stdout_has(self, expected: &str) -> Self {
        let stdout = self.stdout();
        assert!(
            stdout.contains(expected),
            "stdout does not contain {:?}:\n{}",
            expected,
            stdout
        );
        self
    }

    pub fn stdout_eq(self, expected: &str) -> Self {
        similar_asserts::assert_eq!(self.stdout(), expected);
        self
    }

    pub fn stderr_has(self, expected: &str) -> Self {
        let stderr = self.stderr();
        assert!(
            stderr.contains(expected),
            "stderr does not contain {:?}:\n{}",
            expected,
            stderr
        );
        self
    }

    pub fn stderr_lacks(self, unexpected: &str) -> Self {
        let stderr = self.stderr();
        assert!(
            !stderr.contains(unexpected),
            "stderr unexpectedly contains {:?}:\n{}",
            unexpected,
            stderr
        );
        self
    }
}

// =============================================================================
// Coordinator
// =============================================================================

/// A `lava-coordinator` process bound to a free local port, killed on drop
pub struct Coordinator {
    child: Option<Child>,
    port: u16,
    log: PathBuf,
}

impl Coordinator {
    pub fn start(lab: &Lab) -> Self {
        let port = free_port();
        let log = lab.path().join("coordinator").join("coordinator.log");
        let config = lab.file(
            "coordinator.toml",
            &format!(
                "host = \"127.0.0.1\"\nport = {}\nlog_path = \"{}\"\n",
                port,
                log.display()
            ),
        );
        let child = Command::new(assert_cmd::cargo::cargo_bin("lava-coordinator"))
            .arg(&config)
            .env_remove("RUST_LOG")
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .expect("Failed to spawn lava-coordinator");
        let coordinator = Self {
            child: Some(child),
            port,
            log,
        };
        wait_for(Duration::from_secs(10), || {
            TcpStream::connect(("127.0.0.1", port)).is_ok()
        });
        coordinator
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn log(&self) -> String {
        fs::read_to_string(&self.log).unwrap_or_default()
    }

    /// `[coordinator]` table pointing a dispatcher at this coordinator
    pub fn dispatcher_config(&self) -> String {
        format!(
            "[coordinator]\nhost = \"127.0.0.1\"\nport = {}\npoll_delay = 1\n",
            self.port
        )
    }

    /// Send one framed request on a fresh connection and read the reply
    pub fn request(&self, body: &str) -> String {
        let mut stream =
            TcpStream::connect(("127.0.0.1", self.port)).expect("Failed to connect");
        stream
            .set_read_timeout(Some(Duration::from_secs(10)))
            .expect("Failed to set timeout");
        stream
            .write_all(format!("{:08X}{}", body.len(), body).as_bytes())
            .expect("Failed to send request");
        let mut header = [0u8; 8];
        stream.read_exact(&mut header).expect("Failed to read header");
        let len = usize::from_str_radix(std::str::from_utf8(&header).unwrap(), 16)
            .expect("Invalid header");
        let mut reply = vec![0u8; len];
        stream.read_exact(&mut reply).expect("Failed to read reply");
        String::from_utf8(reply).expect("Reply is not UTF-8")
    }

    /// Send SIGTERM and wait for the process to exit
    pub fn terminate(mut self) -> Output {
        let child = self.child.take().expect("Coordinator already stopped");
        Command::new("kill")
            .args(["-TERM", &child.id().to_string()])
            .status()
            .expect("Failed to run kill");
        child.wait_with_output().expect("Coordinator did not exit")
    }
}

impl Drop for Coordinator {
    fn drop(&mut self) {
        if let Some(mut child) = self.child.take() {
            let _ = child.kill();
            let _ = child.wait();
        }
    }
}

/// A local port nothing is listening on
pub fn free_port() -> u16 {
    TcpListener::bind("127.0.0.1:0")
        .and_then(|l| l.local_addr())
        .map(|addr| addr.port())
        .expect("Failed to find a free port")
}

/// Poll `check` until it holds or `limit` passes
pub fn wait_for(limit: Duration, mut check: impl FnMut() -> bool) -> bool {
    let start = Instant::now();
    while start.elapsed() < limit {
        if check() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(50));
    }
    false
}
