//! Basic CLI E2E tests.
//!
//! Tests invoke the built binary with an isolated config file and verify outputs.

use std::io::Write;
use std::path::Path;
use std::process::{Command, Stdio};

/// Run a CLI command against `config` and return (stdout, stderr, exit code).
fn run_cli(config: &Path, args: &[&str], stdin: &str) -> (String, String, i32) {
    let mut child = Command::new(env!("CARGO_BIN_EXE_stillroom-cli"))
        .arg("--config")
        .arg(config)
        .args(args)
        .env_remove("STILLROOM_TOKEN")
        .env("RUST_LOG", "warn")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("Failed to execute CLI command");

    child
        .stdin
        .take()
        .unwrap()
        .write_all(stdin.as_bytes())
        .unwrap();
    let output = child.wait_with_output().unwrap();

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    let code = output.status.code().unwrap_or(-1);

    (stdout, stderr, code)
}

fn json_lines(stdout: &str) -> Vec<serde_json::Value> {
    stdout
        .lines()
        .map(|line| serde_json::from_str(line).expect("stdout line is not JSON"))
        .collect()
}

fn event_types(events: &[serde_json::Value]) -> Vec<&str> {
    events.iter().filter_map(|e| e["type"].as_str()).collect()
}

#[test]
fn test_config_path_honours_flag() {
    let dir = tempfile::tempdir().unwrap();
    let config = dir.path().join("config.toml");
    let (stdout, _, code) = run_cli(&config, &["config", "path"], "");
    assert_eq!(code, 0);
    assert_eq!(stdout.trim(), config.display().to_string());
}

#[test]
fn test_config_get_default() {
    let dir = tempfile::tempdir().unwrap();
    let config = dir.path().join("config.toml");
    let (stdout, _, code) = run_cli(&config, &["config", "get", "session.default_target_secs"], "");
    assert_eq!(code, 0);
    assert_eq!(stdout.trim(), "1200");
    assert!(config.exists(), "defaults should be written on first load");
}

#[test]
fn test_config_set_then_get() {
    let dir = tempfile::tempdir().unwrap();
    let config = dir.path().join("config.toml");

    let (stdout, _, code) = run_cli(&config, &["config", "set", "sensor.haptics", "false"], "");
    assert_eq!(code, 0);
    assert_eq!(stdout.trim(), "ok");

    let (stdout, _, _) = run_cli(&config, &["config", "get", "sensor.haptics"], "");
    assert_eq!(stdout.trim(), "false");

    let (stdout, _, code) = run_cli(&config, &["config", "list"], "");
    assert_eq!(code, 0);
    assert!(stdout.lines().any(|l| l == "sensor.haptics = false"));
}

#[test]
fn test_config_set_rejects_unknown_key() {
    let dir = tempfile::tempdir().unwrap();
    let config = dir.path().join("config.toml");
    let (_, stderr, code) = run_cli(&config, &["config", "set", "sensor.colour", "blue"], "");
    assert_eq!(code, 1);
    assert!(stderr.contains("error: unknown config key: sensor.colour"));
}

#[test]
fn test_config_reset() {
    let dir = tempfile::tempdir().unwrap();
    let config = dir.path().join("config.toml");
    run_cli(&config, &["config", "set", "session.default_target_secs", "60"], "");
    let (_, _, code) = run_cli(&config, &["config", "reset"], "");
    assert_eq!(code, 0);
    let (stdout, _, _) = run_cli(&config, &["config", "get", "session.default_target_secs"], "");
    assert_eq!(stdout.trim(), "1200");
}

#[test]
fn test_session_manual_start_completes() {
    let dir = tempfile::tempdir().unwrap();
    let config = dir.path().join("config.toml");
    let (stdout, stderr, code) = run_cli(
        &config,
        &["session", "run", "--no-sensor", "--duration", "1"],
        "start\n",
    );
    assert_eq!(code, 0, "stderr: {stderr}");

    let events = json_lines(&stdout);
    let types = event_types(&events);
    assert_eq!(types.first(), Some(&"session_started"));
    assert!(types.contains(&"session_completed"));

    let last = events.last().unwrap();
    assert_eq!(last["type"], "state_snapshot");
    assert_eq!(last["snapshot"]["state"], "completed");
    assert_eq!(last["snapshot"]["elapsed_secs"], 1);
    assert_eq!(last["snapshot"]["sensor_available"], false);
}

#[test]
fn test_session_orientation_samples_drive_transitions() {
    let dir = tempfile::tempdir().unwrap();
    let config = dir.path().join("config.toml");
    let (stdout, stderr, code) = run_cli(
        &config,
        &["session", "run", "--duration", "600"],
        "0.1\n0.9\n0.5\n0.95\n0.1\ncancel\n",
    );
    assert_eq!(code, 0, "stderr: {stderr}");

    let events = json_lines(&stdout);
    let transitions: Vec<&str> = event_types(&events)
        .into_iter()
        .filter(|t| t.starts_with("session_"))
        .collect();
    assert_eq!(
        transitions,
        vec!["session_started", "session_paused", "session_cancelled"]
    );

    let last = events.last().unwrap();
    assert_eq!(last["snapshot"]["state"], "cancelled");
    assert_eq!(last["snapshot"]["interruption_count"], 1);
}

#[test]
fn test_session_status_reports_snapshot() {
    let dir = tempfile::tempdir().unwrap();
    let config = dir.path().join("config.toml");
    let (stdout, _, code) = run_cli(
        &config,
        &["session", "run", "--duration", "600"],
        "status\ncancel\n",
    );
    assert_eq!(code, 0);

    let events = json_lines(&stdout);
    let first = &events[0];
    assert_eq!(first["type"], "state_snapshot");
    assert_eq!(first["snapshot"]["state"], "waiting");
    assert_eq!(first["snapshot"]["sensor_available"], true);
}

#[test]
fn test_session_closed_stdin_cancels_idle_session() {
    let dir = tempfile::tempdir().unwrap();
    let config = dir.path().join("config.toml");
    let (stdout, _, code) = run_cli(&config, &["session", "run", "--duration", "600"], "");
    assert_eq!(code, 0);

    let events = json_lines(&stdout);
    assert_eq!(events.last().unwrap()["snapshot"]["state"], "cancelled");
}

#[test]
fn test_session_rejects_zero_duration() {
    let dir = tempfile::tempdir().unwrap();
    let config = dir.path().join("config.toml");
    let (_, stderr, code) = run_cli(&config, &["session", "run", "--duration", "0"], "");
    assert_eq!(code, 1);
    assert!(stderr.contains("error:"));
}
