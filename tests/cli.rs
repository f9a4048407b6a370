//! CLI smoke tests.
//!
//! Exercises argument parsing and fail-fast configuration errors without
//! touching the network.

use assert_cmd::Command;
use predicates::prelude::*;

fn querychain() -> Command {
    let mut cmd = Command::cargo_bin("querychain").unwrap_or_else(|e| {
        unreachable!("binary not built: {e}");
    });
    // Keep host environment configuration out of the tests.
    cmd.env_remove("QUERYCHAIN_ENDPOINT")
        .env_remove("QUERYCHAIN_API_KEY")
        .env_remove("AGENT_API_KEY");
    cmd
}

#[test]
fn help_lists_commands() {
    querychain()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("query"))
        .stdout(predicate::str::contains("health"));
}

#[test]
fn version_prints() {
    querychain()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("querychain"));
}

#[test]
fn query_without_endpoint_fails_fast() {
    querychain()
        .args(["query", "sales"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("endpoint"));
}

#[test]
fn query_without_api_key_fails_fast() {
    querychain()
        .args(["--endpoint", "https://agent.example.com", "query", "sales"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("api_key"));
}

#[test]
fn health_reports_without_network() {
    querychain()
        .args([
            "--endpoint",
            "https://agent.example.com",
            "--api-key",
            "test",
            "health",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("healthy: true"));
}
