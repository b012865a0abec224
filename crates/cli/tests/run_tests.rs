// End-to-end tests for the `precon` binary: stdout contract and exit codes.
// Run with: cargo test -p payout-recon-cli --test run_tests -- --nocapture

use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use tempfile::TempDir;

const FIXTURES: [&str; 4] = ["daily.recon.toml", "backend.csv", "crypto.csv", "rise.csv"];

fn precon() -> Command {
    Command::new(env!("CARGO_BIN_EXE_precon"))
}

fn fixture_dir() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("../recon/tests/fixtures")
}

/// Copy the fixture set into a fresh directory, optionally rewriting the config.
fn workspace(edit: impl Fn(String) -> String) -> (TempDir, PathBuf) {
    let dir = tempfile::tempdir().unwrap();
    for name in FIXTURES {
        let src = std::fs::read_to_string(fixture_dir().join(name)).unwrap();
        let contents = if name.ends_with(".toml") { edit(src) } else { src };
        std::fs::write(dir.path().join(name), contents).unwrap();
    }
    let config = dir.path().join("daily.recon.toml");
    (dir, config)
}

fn run(args: &[&str]) -> Output {
    precon().args(args).output().expect("spawn precon")
}

fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).into_owned()
}

/// Assert stdout is exactly one JSON value.
fn assert_single_json(output: &Output) -> serde_json::Value {
    let stdout = String::from_utf8_lossy(&output.stdout);
    let trimmed = stdout.trim();
    assert!(!trimmed.is_empty(), "stdout should not be empty");
    serde_json::from_str(trimmed).unwrap_or_else(|e| {
        panic!("stdout must be a single JSON value.\nParse error: {e}\nstdout:\n{trimmed}")
    })
}

// ===========================================================================
// precon run
// ===========================================================================

#[test]
fn run_json_is_single_value() {
    let (_dir, config) = workspace(|s| s);
    let output = run(&["run", config.to_str().unwrap(), "--json"]);

    assert_eq!(output.status.code(), Some(0), "stderr: {}", stderr(&output));
    let val = assert_single_json(&output);

    assert_eq!(val["meta"]["name"], "Daily payout recon");
    assert_eq!(val["meta"]["report_zone"], "Asia/Dhaka");
    assert_eq!(val["meta"]["tolerance_minutes"], 15);

    let channels = val["channels"].as_array().unwrap();
    let names: Vec<&str> = channels.iter().map(|c| c["name"].as_str().unwrap()).collect();
    assert_eq!(names, vec!["crypto", "rise"]);

    let crypto = &channels[0];
    assert_eq!(crypto["matched"].as_array().unwrap().len(), 2);
    assert_eq!(crypto["late_sync"].as_array().unwrap().len(), 1);
    assert_eq!(crypto["missing_true"].as_array().unwrap().len(), 1);
    assert_eq!(crypto["summary_3h"].as_array().unwrap().len(), 8);

    let rise = &channels[1];
    assert_eq!(rise["matched"].as_array().unwrap().len(), 1);
    assert_eq!(rise["late_sync"].as_array().unwrap().len(), 1);
    assert_eq!(rise["missing_true"].as_array().unwrap().len(), 1);

    assert_eq!(val["totals"]["total"].as_f64(), Some(770.5));
    assert_eq!(val["totals"]["futures_total"].as_f64(), Some(400.0));
    assert_eq!(val["counts_3h"].as_array().unwrap().len(), 8);
}

#[test]
fn run_without_json_keeps_stdout_empty() {
    let (_dir, config) = workspace(|s| s);
    let output = run(&["run", config.to_str().unwrap()]);

    assert_eq!(output.status.code(), Some(0));
    assert!(output.stdout.is_empty());
    let err = stderr(&output);
    assert!(err.contains("Crypto"), "stderr: {err}");
    assert!(err.contains("2 matched, 1 late sync, 1 missing"), "stderr: {err}");
}

#[test]
fn findings_fail_only_with_strict() {
    let (_dir, config) = workspace(|s| s);
    let output = run(&["run", config.to_str().unwrap(), "--strict"]);

    assert_eq!(output.status.code(), Some(62));
    assert!(stderr(&output).contains("--strict"));
}

#[test]
fn tolerance_override_moves_late_into_matched() {
    let (_dir, config) = workspace(|s| s);
    let output = run(&["run", config.to_str().unwrap(), "--json", "--tolerance", "60"]);

    assert_eq!(output.status.code(), Some(0), "stderr: {}", stderr(&output));
    let val = assert_single_json(&output);
    assert_eq!(val["meta"]["tolerance_minutes"], 60);
    let crypto = &val["channels"][0];
    assert_eq!(crypto["matched"].as_array().unwrap().len(), 3);
    assert!(crypto["late_sync"].as_array().unwrap().is_empty());
}

#[test]
fn output_and_xlsx_files_are_written() {
    let (dir, config) = workspace(|s| s);
    let json_path = dir.path().join("report.json");
    let xlsx_path = dir.path().join("report.xlsx");
    let output = run(&[
        "run",
        config.to_str().unwrap(),
        "--output",
        json_path.to_str().unwrap(),
        "--xlsx",
        xlsx_path.to_str().unwrap(),
    ]);

    assert_eq!(output.status.code(), Some(0), "stderr: {}", stderr(&output));

    let written: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&json_path).unwrap()).unwrap();
    assert_eq!(written["channels"].as_array().unwrap().len(), 2);

    // 2 channels x (3H + 3 states) + Segment_Summary + Counts_3H + README
    assert!(stderr(&output).contains("(11 sheets)"), "stderr: {}", stderr(&output));
    let bytes = std::fs::read(&xlsx_path).unwrap();
    assert_eq!(&bytes[..2], b"PK");
}

#[test]
fn date_override_shifts_window() {
    let (_dir, config) = workspace(|s| s);
    let output = run(&["run", config.to_str().unwrap(), "--json", "--date", "2024-02-01"]);

    assert_eq!(output.status.code(), Some(0));
    let val = assert_single_json(&output);
    for ch in val["channels"].as_array().unwrap() {
        assert!(ch["matched"].as_array().unwrap().is_empty());
        assert!(ch["missing_true"].as_array().unwrap().is_empty());
    }
}

// ===========================================================================
// Exit codes
// ===========================================================================

#[test]
fn invalid_tolerance_is_invalid_config() {
    let (_dir, config) = workspace(|s| s.replace("tolerance_minutes = 15", "tolerance_minutes = 500"));
    let output = run(&["run", config.to_str().unwrap()]);

    assert_eq!(output.status.code(), Some(60));
    assert!(stderr(&output).contains("between 0 and 120"), "stderr: {}", stderr(&output));
}

#[test]
fn unknown_timezone_is_invalid_config_with_hint() {
    let (_dir, config) = workspace(|s| s.replace("\"Asia/Dhaka\"\ndate", "\"Mars/Olympus\"\ndate"));
    let output = run(&["validate", config.to_str().unwrap()]);

    assert_eq!(output.status.code(), Some(60));
    let err = stderr(&output);
    assert!(err.contains("Mars/Olympus"), "stderr: {err}");
    assert!(err.contains("hint:"), "stderr: {err}");
}

#[test]
fn missing_column_is_runtime_error_with_hint() {
    let (_dir, config) = workspace(|s| s.replace("key = \"Tracking ID\"", "key = \"Wallet Ref\""));
    let output = run(&["run", config.to_str().unwrap(), "--json"]);

    assert_eq!(output.status.code(), Some(61));
    assert!(output.stdout.is_empty());
    let err = stderr(&output);
    assert!(err.contains("Wallet Ref"), "stderr: {err}");
    assert!(err.contains("hint:"), "stderr: {err}");
    assert!(err.contains("Tracking ID"), "stderr: {err}");
}

#[test]
fn missing_input_file_is_runtime_error() {
    let (_dir, config) = workspace(|s| s.replace("file = \"crypto.csv\"", "file = \"gone.csv\""));
    let output = run(&["run", config.to_str().unwrap()]);

    assert_eq!(output.status.code(), Some(61));
    assert!(stderr(&output).contains("gone.csv"));
}

#[test]
fn run_without_file_entry_is_invalid_config() {
    let (_dir, config) = workspace(|s| s.replace("file = \"backend.csv\"\n", ""));
    let output = run(&["run", config.to_str().unwrap()]);

    assert_eq!(output.status.code(), Some(60));
    assert!(stderr(&output).contains("backend"));
}

#[test]
fn tolerance_flag_out_of_range_is_usage_error() {
    let (_dir, config) = workspace(|s| s);
    let output = run(&["run", config.to_str().unwrap(), "--tolerance", "121"]);

    assert_eq!(output.status.code(), Some(2));
    assert!(stderr(&output).contains("121"), "stderr: {}", stderr(&output));
}

#[test]
fn bad_flag_is_usage_error() {
    let output = run(&["run", "whatever.toml", "--tolerance", "soon"]);
    assert_eq!(output.status.code(), Some(2));
}

// ===========================================================================
// precon validate
// ===========================================================================

#[test]
fn validate_accepts_fixture_config() {
    let (_dir, config) = workspace(|s| s);
    let output = run(&["validate", config.to_str().unwrap()]);

    assert_eq!(output.status.code(), Some(0), "stderr: {}", stderr(&output));
    assert!(output.stdout.is_empty());
    let err = stderr(&output);
    assert!(err.contains("config ok"), "stderr: {err}");
    assert!(err.contains("exact_key"), "stderr: {err}");
}

#[test]
fn validate_rejects_overlapping_payment_methods() {
    let (_dir, config) = workspace(|s| s.replace("payment_methods = [\"risework\"]", "payment_methods = [\"risework\", \"USDT\"]"));
    let output = run(&["validate", config.to_str().unwrap()]);

    assert_eq!(output.status.code(), Some(60));
    assert!(stderr(&output).contains("claimed by both"), "stderr: {}", stderr(&output));
}

#[test]
fn validate_rejects_labels_that_share_sheet_names() {
    let (_dir, config) = workspace(|s| s.replace("label = \"Rise\"", "label = \"crypto\""));
    let output = run(&["validate", config.to_str().unwrap()]);

    assert_eq!(output.status.code(), Some(60));
    assert!(stderr(&output).contains("already used by channel 'crypto'"), "stderr: {}", stderr(&output));
}
