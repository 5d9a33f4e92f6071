//! Basic CLI E2E tests: invoke the binary via `cargo run` and check exit
//! codes and stdout shape, mirroring how the engine is actually driven from
//! a shell.

use std::process::Command;

fn run_cli(args: &[&str]) -> (String, String, i32) {
    let output = Command::new("cargo")
        .args(["run", "-p", "assign-cli", "--"])
        .args(args)
        .env("ASSIGN_ENGINE_ENV", "dev")
        .output()
        .expect("failed to execute CLI command");

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    let code = output.status.code().unwrap_or(-1);
    (stdout, stderr, code)
}

#[test]
fn policy_show_prints_json() {
    let (stdout, _stderr, code) = run_cli(&["policy", "show"]);
    assert_eq!(code, 0, "policy show failed");
    let parsed: serde_json::Value = serde_json::from_str(&stdout).expect("valid JSON");
    assert!(parsed.get("mode").is_some());
}

#[test]
fn priority_list_prints_json_array() {
    let (stdout, _stderr, code) = run_cli(&["priority", "list"]);
    assert_eq!(code, 0, "priority list failed");
    let parsed: serde_json::Value = serde_json::from_str(&stdout).expect("valid JSON");
    assert!(parsed.is_array());
}

#[test]
fn pool_status_reports_counts() {
    let (stdout, _stderr, code) = run_cli(&["pool", "status"]);
    assert_eq!(code, 0, "pool status failed");
    assert!(stdout.contains("waiting"));
}

#[test]
fn health_check_reports_database_reachable() {
    let (stdout, _stderr, code) = run_cli(&["health", "check"]);
    assert_eq!(code, 0, "health check failed");
    assert!(stdout.contains("database_reachable"));
}

#[test]
fn booking_show_unknown_id_fails_with_nonzero_exit() {
    let (_stdout, stderr, code) = run_cli(&["booking", "show", "does-not-exist"]);
    assert_ne!(code, 0);
    assert!(stderr.contains("not found") || stderr.contains("error"));
}

#[test]
fn switch_mode_then_show_reflects_new_mode() {
    let (_stdout, _stderr, code) = run_cli(&["policy", "switch-mode", "urgent"]);
    assert_eq!(code, 0, "switch-mode failed");

    let (stdout, _stderr, code) = run_cli(&["policy", "show"]);
    assert_eq!(code, 0);
    let parsed: serde_json::Value = serde_json::from_str(&stdout).expect("valid JSON");
    assert_eq!(parsed["mode"], "Urgent");

    // Restore a canonical default so other tests in this suite are not
    // order-dependent on the shared dev database.
    let (_stdout, _stderr, code) = run_cli(&["policy", "switch-mode", "normal"]);
    assert_eq!(code, 0);
}
