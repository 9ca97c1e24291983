//! CLI integration tests

use std::process::{Command, Output};

fn twinctl(args: &[&str]) -> Output {
    Command::new("cargo")
        .args(["run", "-q", "-p", "twin-cli", "--"])
        .args(args)
        .output()
        .expect("Failed to execute command")
}

/// Test that the CLI shows help
#[test]
fn test_cli_help() {
    let output = twinctl(&["--help"]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success(), "CLI help should succeed");
    assert!(stdout.contains("digital-twin testbed"), "Should show app name");
    for command in [
        "topology",
        "connections",
        "vpods",
        "templates",
        "load",
        "containers",
        "system",
        "timeseries",
    ] {
        assert!(stdout.contains(command), "Should show {} command", command);
    }
}

/// Test that the CLI shows version
#[test]
fn test_cli_version() {
    let output = twinctl(&["--version"]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success(), "CLI version should succeed");
    assert!(stdout.contains("twinctl"), "Should show binary name");
}

#[test]
fn test_connections_help() {
    let output = twinctl(&["connections", "--help"]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success());
    for command in ["list", "add", "remove", "pending", "cancel"] {
        assert!(stdout.contains(command), "Should show {} subcommand", command);
    }
}

#[test]
fn test_connections_remove_help() {
    let output = twinctl(&["connections", "remove", "--help"]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success());
    assert!(stdout.contains("--dry-run"), "Should show dry-run option");
}

#[test]
fn test_vpods_create_help() {
    let output = twinctl(&["vpods", "create", "--help"]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success());
    for option in ["--source", "--dest", "--workload", "--interval"] {
        assert!(stdout.contains(option), "Should show {} option", option);
    }
}

#[test]
fn test_timeseries_help() {
    let output = twinctl(&["timeseries", "--help"]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success());
    assert!(stdout.contains("--metric"));
    assert!(stdout.contains("--window"));
}

#[test]
fn test_vpods_create_requires_workload() {
    let output = twinctl(&["vpods", "create", "--source", "serf1", "--dest", "serf2"]);
    let stderr = String::from_utf8_lossy(&output.stderr);

    assert!(!output.status.success());
    assert!(stderr.contains("--workload"));
}

#[test]
fn test_unreachable_api_fails() {
    let output = twinctl(&["--api-url", "http://127.0.0.1:9", "load"]);
    let stderr = String::from_utf8_lossy(&output.stderr);

    assert!(!output.status.success(), "Should fail without a server");
    assert!(stderr.contains("Failed to send request"));
}

#[test]
fn test_invalid_format_rejected() {
    let output = twinctl(&["--format", "yaml", "topology"]);

    assert!(!output.status.success());
}
