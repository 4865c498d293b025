//! Integration tests for the ntm CLI.
//!
//! These tests run the actual binary and verify its output.

use std::path::Path;
use std::process::Command;
use tempfile::TempDir;

/// Run ntm in a directory with the given arguments and a clean environment.
fn run_ntm_in_dir(dir: &Path, args: &[&str]) -> std::process::Output {
    Command::new(env!("CARGO_BIN_EXE_ntm"))
        .args(args)
        .current_dir(dir)
        .env_remove("NTM_OUTPUT_DIR")
        .env_remove("NTM_SEED")
        .env_remove("NTM_EXECUTION")
        .env_remove("RUST_LOG")
        .output()
        .expect("Failed to execute ntm")
}

/// Run ntm in a fresh temporary directory.
fn run_ntm(args: &[&str]) -> std::process::Output {
    let temp = TempDir::new().unwrap();
    run_ntm_in_dir(temp.path(), args)
}

fn stdout_of(output: &std::process::Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

// =============================================================================
// Basic CLI Tests
// =============================================================================

#[test]
fn test_help_command() {
    let output = run_ntm(&["--help"]);
    let stdout = stdout_of(&output);

    assert!(output.status.success());
    assert!(stdout.contains("collatz"));
    assert!(stdout.contains("logistic"));
    assert!(stdout.contains("eca"));
    assert!(stdout.contains("run"));
}

#[test]
fn test_version_command() {
    let output = run_ntm(&["--version"]);
    assert!(output.status.success());
    assert!(stdout_of(&output).contains("ntm"));
}

#[test]
fn test_config_show() {
    let output = run_ntm(&["config", "show"]);
    let stdout = stdout_of(&output);

    assert!(output.status.success());
    assert!(stdout.contains("Netomaton CLI Configuration"));
    assert!(stdout.contains("Execution:"));
}

// =============================================================================
// Model Tests
// =============================================================================

#[test]
fn test_collatz_prints_sequence() {
    let output = run_ntm(&["collatz", "--start", "3"]);
    let stdout = stdout_of(&output);

    assert!(output.status.success(), "ntm collatz should succeed");
    assert!(stdout.contains("3 10 5 16 8 4 2 1"));
    assert!(stdout.contains("Reached 1 after 7 steps"));
}

#[test]
fn test_collatz_rejects_zero() {
    let output = run_ntm(&["collatz", "--start", "0"]);
    assert!(!output.status.success());
}

#[test]
fn test_collatz_overflow_is_an_error() {
    let output = run_ntm(&["collatz", "--start", "6148914691236517205"]);
    let stderr = String::from_utf8_lossy(&output.stderr);

    assert!(!output.status.success());
    assert!(stderr.contains("overflows"), "stderr: {stderr}");
    assert!(!stderr.contains("panicked"));
}

#[test]
fn test_logistic_prints_values() {
    let output = run_ntm(&["logistic", "--rate", "3", "--steps", "2", "--initial", "0.5"]);
    let stdout = stdout_of(&output);

    assert!(output.status.success());
    assert!(stdout.contains("0.500000"));
    assert!(stdout.contains("0.750000"));
}

#[test]
fn test_eca_rule_90_grid() {
    let output = run_ntm(&["eca", "--rule", "90", "--width", "5", "--steps", "3"]);
    let stdout = stdout_of(&output);
    let rows: Vec<&str> = stdout.lines().skip(1).collect();

    assert!(output.status.success());
    assert_eq!(rows, vec!["..#..", ".#.#.", "#...#"]);
}

#[test]
fn test_eca_reversible_grid() {
    let output = run_ntm(&[
        "eca",
        "--rule",
        "90",
        "--width",
        "5",
        "--steps",
        "3",
        "--reversible",
    ]);
    let stdout = stdout_of(&output);
    let rows: Vec<&str> = stdout.lines().skip(1).collect();

    assert!(output.status.success());
    assert_eq!(rows, vec!["..#..", ".#.#.", "#.#.#"]);
}

#[test]
fn test_reversible_rejects_shuffled_execution() {
    let output = run_ntm(&[
        "eca",
        "--width",
        "5",
        "--reversible",
        "--execution",
        "shuffled",
    ]);
    assert!(!output.status.success());
}

#[test]
fn test_unknown_execution_fails() {
    let output = run_ntm(&["collatz", "--execution", "random"]);
    let stderr = String::from_utf8_lossy(&output.stderr);

    assert!(!output.status.success());
    assert!(stderr.contains("Unknown execution strategy"));
}

// =============================================================================
// Run Description Tests
// =============================================================================

fn write_description(dir: &Path) -> std::path::PathBuf {
    let path = dir.join("triangle.json");
    std::fs::write(
        &path,
        r#"{
            "meta": { "name": "triangle" },
            "initial_conditions": [0, 1, 1],
            "topology": [[1, 1, 1], [1, 1, 1], [1, 1, 1]],
            "timesteps": 2
        }"#,
    )
    .unwrap();
    path
}

#[test]
fn test_run_majority() {
    let temp = TempDir::new().unwrap();
    write_description(temp.path());

    let output = run_ntm_in_dir(temp.path(), &["run", "triangle.json", "--rule", "majority"]);
    let stdout = stdout_of(&output);

    assert!(output.status.success(), "ntm run should succeed");
    assert!(stdout.contains("Run: triangle"));
    assert!(stdout.contains(r#"{"0":1.0,"1":1.0,"2":1.0}"#));
    assert!(stdout.contains("2 states (step limit reached)"));
}

#[test]
fn test_run_unknown_rule_fails() {
    let temp = TempDir::new().unwrap();
    write_description(temp.path());

    let output = run_ntm_in_dir(temp.path(), &["run", "triangle.json", "--rule", "life"]);
    let stderr = String::from_utf8_lossy(&output.stderr);

    assert!(!output.status.success());
    assert!(stderr.contains("unknown rule"));
}

#[test]
fn test_run_missing_file_fails() {
    let output = run_ntm(&["run", "missing.json"]);
    assert!(!output.status.success());
}

// =============================================================================
// Persistence Tests
// =============================================================================

#[test]
fn test_output_saves_trajectory() {
    let temp = TempDir::new().unwrap();

    let output = run_ntm_in_dir(temp.path(), &["collatz", "--start", "6", "--output", "."]);
    let stdout = stdout_of(&output);

    assert!(output.status.success());
    assert!(stdout.contains("💾 Saved to"));
    assert!(temp.path().join(".netomaton/trajectory.json").exists());

    let metadata = std::fs::read_to_string(temp.path().join(".netomaton/metadata.json")).unwrap();
    let metadata: serde_json::Value = serde_json::from_str(&metadata).unwrap();
    assert_eq!(metadata["states"], 9);
    assert_eq!(metadata["stop_reason"], "input_exhausted");
    assert_eq!(metadata["label"], "collatz");
}

#[test]
fn test_no_output_skips_store() {
    let temp = TempDir::new().unwrap();

    let output = run_ntm_in_dir(temp.path(), &["eca", "--width", "5", "--steps", "2"]);

    assert!(output.status.success());
    assert!(!temp.path().join(".netomaton").exists());
}

#[test]
fn test_output_dir_from_env() {
    let temp = TempDir::new().unwrap();
    let out = temp.path().join("out");

    let output = Command::new(env!("CARGO_BIN_EXE_ntm"))
        .args(["logistic", "--steps", "3"])
        .current_dir(temp.path())
        .env("NTM_OUTPUT_DIR", &out)
        .output()
        .expect("Failed to execute ntm");

    assert!(output.status.success());
    assert!(out.join(".netomaton/trajectory.json").exists());
}
