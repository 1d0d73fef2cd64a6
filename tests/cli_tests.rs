//! CLI integration tests
//!
//! These tests run the `scl-validate` binary against the fixture projects.

#![cfg(feature = "cli")]

use std::path::PathBuf;
use std::process::Command;

fn scl_validate() -> Command {
    Command::new(env!("CARGO_BIN_EXE_scl-validate"))
}

fn fixtures_dir() -> PathBuf {
    let mut path = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    path.push("tests");
    path.push("fixtures");
    path
}

fn project(name: &str) -> String {
    fixtures_dir().join("projects").join(name).display().to_string()
}

#[test]
fn test_cli_schema_valid() {
    let output = scl_validate()
        .args(["schema", &project("valid.scd")])
        .output()
        .expect("Failed to execute command");

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(output.status.success(), "valid project should pass: {}", stdout);
    assert!(stdout.contains("Project is schema valid"));
}

#[test]
fn test_cli_templates_broken_exit_code() {
    let output = scl_validate()
        .args(["templates", &project("broken.scd"), "--nsd-root"])
        .arg(fixtures_dir())
        .output()
        .expect("Failed to execute command");

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert_eq!(output.status.code(), Some(1));
    assert!(stdout.contains("Templates (9 issues)"), "{}", stdout);
    assert!(stdout.contains("The LNodeType XCBR is missing mandatory DO BlkOpn"));
}

#[test]
fn test_cli_all_json() {
    let output = scl_validate()
        .args(["all", &project("valid.scd"), "--json", "--name", "station.scd", "--nsd-root"])
        .arg(fixtures_dir())
        .output()
        .expect("Failed to execute command");

    assert!(output.status.success());
    let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(report["file"], "station.scd");
    assert_eq!(report["schema"][0]["title"], "Project is schema valid");
    assert_eq!(report["templates"].as_array().map(Vec::len), Some(0));
}

#[test]
fn test_cli_explicit_schema() {
    let output = scl_validate()
        .args(["schema", &project("no_version.scd"), "--schema", "2007B4", "--json"])
        .output()
        .expect("Failed to execute command");

    assert_eq!(output.status.code(), Some(1));
    let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert!(report["templates"].is_null());
    assert!(report["schema"]
        .as_array()
        .unwrap()
        .iter()
        .any(|issue| issue["title"] == "The attribute 'version' is required but missing."));
}

#[test]
fn test_cli_unknown_schema_variant() {
    let output = scl_validate()
        .args(["schema", &project("valid.scd"), "--schema", "2010"])
        .output()
        .expect("Failed to execute command");

    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("unknown schema variant"));
}

#[test]
fn test_cli_missing_file() {
    let output = scl_validate()
        .args(["schema", "does-not-exist.scd"])
        .output()
        .expect("Failed to execute command");

    assert_eq!(output.status.code(), Some(2));
    assert!(String::from_utf8_lossy(&output.stderr).starts_with("Error:"));
}
