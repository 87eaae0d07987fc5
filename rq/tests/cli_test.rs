//! CLI tests for the `rq` binary
//!
//! Each test runs against its own temporary home, config and storage root.
//! None of them reach an LLM endpoint.

use std::fs;
use std::path::{Path, PathBuf};

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

const KEY_ENV: &str = "RQ_CLI_TEST_API_KEY";

struct Sandbox {
    temp: TempDir,
    config: PathBuf,
}

impl Sandbox {
    fn new() -> Self {
        let temp = TempDir::new().expect("Failed to create temp dir");
        let config = temp.path().join("rewriteq.yml");
        let yaml = format!(
            "llm:\n  model: test-model\n  api-key-env: {}\nstorage:\n  root: {}\nchunking:\n  chunk-size: 40\n",
            KEY_ENV,
            temp.path().join("store").display()
        );
        fs::write(&config, yaml).expect("Failed to write config");
        Self { temp, config }
    }

    fn path(&self) -> &Path {
        self.temp.path()
    }

    fn rq(&self) -> Command {
        let mut cmd = Command::cargo_bin("rq").expect("rq binary");
        cmd.current_dir(self.path())
            .env("HOME", self.path())
            .env("XDG_DATA_HOME", self.path().join("data"))
            .env("XDG_CONFIG_HOME", self.path().join("config"))
            .env("NO_COLOR", "1")
            .env_remove(KEY_ENV)
            .arg("--config")
            .arg(&self.config);
        cmd
    }

    fn write_doc(&self, name: &str, content: &str) -> PathBuf {
        let path = self.path().join(name);
        fs::write(&path, content).expect("Failed to write document");
        path
    }
}

#[test]
fn test_submit_missing_file_fails() {
    let sandbox = Sandbox::new();
    sandbox
        .rq()
        .args(["submit", "nowhere.md"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("does not exist"));
}

#[test]
fn test_submit_list_show() {
    let sandbox = Sandbox::new();
    let doc = sandbox.write_doc("guide.md", "# Guide\n\nfirst paragraph of text\n\nsecond paragraph of text");

    let output = sandbox
        .rq()
        .arg("submit")
        .arg(&doc)
        .arg("-m")
        .arg("1")
        .assert()
        .success()
        .stdout(predicate::str::contains("Submitted task"))
        .get_output()
        .stdout
        .clone();
    let stdout = String::from_utf8_lossy(&output);
    let id = stdout
        .split_whitespace()
        .find(|word| word.contains("-task-guide"))
        .map(str::to_string)
        .expect("task id in submit output");

    sandbox
        .rq()
        .arg("list")
        .assert()
        .success()
        .stdout(predicate::str::contains(id.as_str()))
        .stdout(predicate::str::contains("pending"))
        .stdout(predicate::str::contains("guide.md"));

    sandbox
        .rq()
        .args(["show", "guide"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Task Information"))
        .stdout(predicate::str::contains(id.as_str()))
        .stdout(predicate::str::contains("Memory Size: 1"))
        .stdout(predicate::str::contains("chunks.json"));
}

#[test]
fn test_list_empty_store() {
    let sandbox = Sandbox::new();
    sandbox
        .rq()
        .arg("list")
        .assert()
        .success()
        .stdout(predicate::str::contains("No tasks found"));
}

#[test]
fn test_run_without_api_key_names_the_variable() {
    let sandbox = Sandbox::new();
    sandbox
        .rq()
        .arg("run")
        .assert()
        .failure()
        .stderr(predicate::str::contains(KEY_ENV));
}

#[test]
fn test_show_unknown_task_fails() {
    let sandbox = Sandbox::new();
    sandbox
        .rq()
        .args(["show", "does-not-exist"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Task not found"));
}

#[test]
fn test_submit_rejects_bad_metric() {
    let sandbox = Sandbox::new();
    let doc = sandbox.write_doc("a.md", "text");
    sandbox
        .rq()
        .arg("submit")
        .arg(&doc)
        .args(["--metric", "bytes"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Unknown size metric"));
}
