#![allow(dead_code)]

use std::path::{Path, PathBuf};

use assert_cmd::Command;
use serde_json::Value;
use tempfile::TempDir;

pub const PASSWORD: &str = "secret123";

/// An isolated taskdesk home directory.
pub struct TestHome {
    dir: TempDir,
}

impl TestHome {
    pub fn new() -> Self {
        Self {
            dir: tempfile::tempdir().expect("failed to create tempdir"),
        }
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn file(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    pub fn write_config(&self, contents: &str) {
        std::fs::write(self.file("taskdesk.toml"), contents).expect("write config");
    }

    pub fn cmd(&self) -> Command {
        let mut cmd = taskdesk_cmd();
        cmd.env("TASKDESK_HOME", self.path());
        cmd
    }

    /// Run with `--json` and return the parsed envelope, whatever the exit code.
    pub fn json(&self, args: &[&str]) -> Value {
        let output = self
            .cmd()
            .arg("--json")
            .args(args)
            .output()
            .expect("run taskdesk");
        serde_json::from_slice(&output.stdout).unwrap_or_else(|err| {
            panic!(
                "invalid json from {args:?}: {err}\nstdout: {}\nstderr: {}",
                String::from_utf8_lossy(&output.stdout),
                String::from_utf8_lossy(&output.stderr)
            )
        })
    }

    pub fn provision(&self, email: &str, first_name: &str, department: &str, role: &str) -> String {
        let value = self.json(&[
            "provision",
            "user",
            "--email",
            email,
            "--password",
            PASSWORD,
            "--first-name",
            first_name,
            "--department",
            department,
            "--role",
            role,
        ]);
        assert_eq!(value["status"], "success", "provision failed: {value}");
        value["data"]["id"].as_str().expect("profile id").to_string()
    }

    pub fn login(&self, email: &str) {
        self.cmd()
            .args(["login", "--email", email, "--password", PASSWORD])
            .assert()
            .success();
    }

    pub fn create_task(&self, title: &str) -> String {
        let value = self.json(&["task", "create", title]);
        assert_eq!(value["status"], "success", "task create failed: {value}");
        value["data"]["id"].as_str().expect("task id").to_string()
    }
}

pub fn taskdesk_cmd() -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("taskdesk"));
    for var in [
        "TASKDESK_HOME",
        "TASKDESK_CONFIG",
        "TASKDESK_EVENTS",
        "TASKDESK_PASSWORD",
        "TASKDESK_NEW_PASSWORD",
        "RUST_LOG",
    ] {
        cmd.env_remove(var);
    }
    cmd
}
