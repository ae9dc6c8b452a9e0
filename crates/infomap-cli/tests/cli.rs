//! End-to-end tests for the Infomap CLI.
//!
//! These run the `infomap` binary without an engine library, so they cover
//! argument handling and error reporting rather than clustering.

#![allow(deprecated)] // Allow deprecated Command::cargo_bin for tests

use std::fs;

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

fn infomap() -> Command {
    let mut cmd = Command::cargo_bin("infomap").expect("infomap binary not built");
    cmd.env_remove("INFOMAP_ENGINE_PATH")
        .env_remove("INFOMAP_WORKER_PATH")
        .env_remove("INFOMAP_TERMINATION_GRACE_MS")
        .env_remove("INFOMAP_JOB_TIMEOUT_SECS");
    cmd
}

#[test]
fn test_version_prints_engine_version() {
    infomap()
        .arg("version")
        .assert()
        .success()
        .stdout(predicate::str::starts_with("Infomap "));
}

#[test]
fn test_run_requires_network() {
    infomap().arg("run").assert().failure();
}

#[test]
fn test_run_without_engine_reports_hint() {
    let dir = TempDir::new().unwrap();
    let network = dir.path().join("karate.net");
    fs::write(&network, "1 2\n2 3\n").unwrap();

    infomap()
        .arg("run")
        .arg(&network)
        .assert()
        .failure()
        .stderr(predicate::str::contains("No engine library configured"));
}

#[test]
fn test_run_missing_network_file() {
    let dir = TempDir::new().unwrap();

    infomap()
        .arg("run")
        .arg(dir.path().join("missing.net"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to read network"));
}

#[test]
fn test_run_with_unreadable_engine() {
    let dir = TempDir::new().unwrap();
    let network = dir.path().join("karate.net");
    fs::write(&network, "1 2\n").unwrap();

    infomap()
        .arg("run")
        .arg(&network)
        .arg("--engine")
        .arg(dir.path().join("libmissing.so"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to read engine image"));
}

#[test]
fn test_run_rejects_networks_with_same_out_name() {
    let dir = TempDir::new().unwrap();
    for sub in ["a", "b"] {
        fs::create_dir(dir.path().join(sub)).unwrap();
        fs::write(dir.path().join(sub).join("net.net"), "1 2\n").unwrap();
    }

    infomap()
        .arg("run")
        .arg(dir.path().join("a/net.net"))
        .arg(dir.path().join("b/net.net"))
        .arg("--engine")
        .arg(dir.path().join("libengine.so"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("would both write results named 'net'"));
}
