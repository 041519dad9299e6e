use assert_cmd::prelude::*;
use rstest::rstest;
use std::fs;
use std::path::PathBuf;
use std::process::Command;
use tempfile::tempdir;

// Fast timings so runs finish in well under a second
fn write_fast_config(dir: &tempfile::TempDir) -> PathBuf {
    let toml = r#"
[sync]
samples = 4
ping_gap_ms = 10

[confirm]
poll_ms = 5

[settle]
poll_ms = 10

[eval]
stop_grace_ms = 300

[dispatch]
pending_ttl_ms = 2000
"#;
    let path = dir.path().join("cfg.toml");
    fs::write(&path, toml).unwrap();
    path
}

/// Validate the JSON result schema for a successful demo run.
#[rstest]
fn json_demo_schema() {
    let dir = tempdir().unwrap();
    let cfg = write_fast_config(&dir);

    let mut cmd = Command::cargo_bin("ptz_cli").unwrap();
    cmd.arg("--json")
        .arg("--log-level")
        .arg("error")
        .arg("--config")
        .arg(&cfg)
        .arg("demo")
        .arg("--latency-ms")
        .arg("5")
        .arg("--with-tracking");

    let out = cmd.assert().success().get_output().stdout.clone();
    let stdout = String::from_utf8_lossy(&out);
    let line = stdout
        .lines()
        .find(|l| l.contains("\"mean_ack_ms\""))
        .unwrap_or("")
        .to_string();
    assert!(
        !line.is_empty(),
        "no JSON line with mean_ack_ms found; stdout was: {stdout}"
    );

    let v: serde_json::Value = serde_json::from_str(&line).expect("valid JSON");

    assert!(v.get("timestamp").and_then(|x| x.as_i64()).is_some());
    assert!(v.get("duration_ms").and_then(|x| x.as_u64()).is_some());
    assert!(v.get("profile").and_then(|x| x.as_str()).is_some());

    // stats may be null when the relevant phase recorded nothing
    for key in ["offset_ms", "mean_ack_ms", "mean_settle_ms"] {
        let ok = match v.get(key) {
            Some(serde_json::Value::Null) => true,
            Some(serde_json::Value::Number(n)) => n.as_f64().is_some(),
            _ => false,
        };
        assert!(ok, "{key} should be number or null");
    }

    // Counters
    for key in ["acks", "timeouts", "settles", "corrections", "rows"] {
        assert!(
            v.get(key).and_then(|x| x.as_u64()).is_some(),
            "{key} should be a count"
        );
    }

    // The script guarantees at least one ack and one settle
    assert!(v["acks"].as_u64().unwrap() >= 1);
    assert!(v["settles"].as_u64().unwrap() >= 1);

    // Fault must be null on success
    assert!(v.get("fault").is_some());
    assert!(v.get("fault").unwrap().is_null());
}

/// Validate the sync result object.
#[rstest]
fn json_sync_schema() {
    let dir = tempdir().unwrap();
    let cfg = write_fast_config(&dir);

    let mut cmd = Command::cargo_bin("ptz_cli").unwrap();
    cmd.arg("--json")
        .arg("--log-level")
        .arg("error")
        .arg("--config")
        .arg(&cfg)
        .arg("sync")
        .arg("--latency-ms")
        .arg("5");

    let out = cmd.assert().success().get_output().stdout.clone();
    let stdout = String::from_utf8_lossy(&out);
    let line = stdout
        .lines()
        .find(|l| l.contains("\"offset_ms\""))
        .unwrap_or("")
        .to_string();
    assert!(
        !line.is_empty(),
        "no JSON line with offset_ms found; stdout was: {stdout}"
    );

    let v: serde_json::Value = serde_json::from_str(&line).expect("valid JSON");
    assert!(v.get("degraded").and_then(|x| x.as_bool()).is_some());
    // both ends share one wall clock, so the estimate sits near zero
    let offset = v.get("offset_ms").and_then(|x| x.as_f64()).unwrap();
    assert!(offset.abs() < 50.0, "offset was {offset}");
}

/// Validate the structured error object for a run that fails validation.
#[rstest]
fn json_error_schema() {
    let dir = tempdir().unwrap();
    // a settle window of 1 is rejected by validation
    let path = dir.path().join("bad.toml");
    fs::write(&path, "[settle]\nwindow = 1\n").unwrap();

    let mut cmd = Command::cargo_bin("ptz_cli").unwrap();
    cmd.arg("--json").arg("--config").arg(&path).arg("self-check");

    let out = cmd.assert().failure().get_output().stdout.clone();
    let stdout = String::from_utf8_lossy(&out);
    let line = stdout
        .lines()
        .find(|l| l.contains("\"reason\""))
        .unwrap_or("")
        .to_string();
    assert!(
        !line.is_empty(),
        "no JSON error object found; stdout was: {stdout}"
    );

    let v: serde_json::Value = serde_json::from_str(&line).expect("valid JSON");
    let reason = v.get("reason").and_then(|x| x.as_str()).unwrap_or("");
    assert!(!reason.is_empty());
    let message = v.get("message").and_then(|x| x.as_str()).unwrap_or("");
    assert!(message.contains("What happened"));
}
