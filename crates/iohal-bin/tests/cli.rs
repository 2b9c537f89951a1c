//! Integration tests for the iohal binary.
//!
//! Every device runs on in-memory transports (`--mock`), so no hardware is needed.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use tempfile::TempDir;

const HARDWARE: &str = r#"
[[devices]]
id = "lights"
driver = "pca9685"
[devices.config]
Address = 64
Frequency = 200

[[devices]]
id = "sim"
driver = "mock-analog"
[devices.config]
Channels = 2
Value = 42
Calibrated = true

[[devices]]
id = "raw"
driver = "mock-analog"
[devices.config]
Channels = 1
Value = 5
Calibrated = false

[[devices]]
id = "io"
driver = "mock-digital"
[devices.config]
Channels = 4
"#;

fn iohal(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_iohal"))
        .args(args)
        .env_remove("IOHAL_MOCK")
        .output()
        .unwrap()
}

fn hardware_file(dir: &TempDir, contents: &str) -> PathBuf {
    let path = dir.path().join("hardware.toml");
    fs::write(&path, contents).unwrap();
    path
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

fn with_file<'a>(path: &'a Path, args: &[&'a str]) -> Vec<&'a str> {
    let mut all = vec!["--mock", "--hardware", path.to_str().unwrap()];
    all.extend_from_slice(args);
    all
}

#[test]
fn help_lists_subcommands() {
    let output = iohal(&["--help"]);
    assert!(output.status.success());
    let text = stdout(&output);
    for command in ["factories", "describe", "validate", "read", "write", "set"] {
        assert!(text.contains(command), "help should mention {command}");
    }
}

#[test]
fn factories_lists_builtin_drivers() {
    let output = iohal(&["factories"]);
    assert!(output.status.success());
    let text = stdout(&output);
    assert!(text.contains("ads1115"));
    assert!(text.contains("pca9685"));
    assert!(text.contains("tplink-hs110"));
}

#[test]
fn factories_json_is_parseable() {
    let output = iohal(&["factories", "--json"]);
    assert!(output.status.success());
    let value: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(value.as_array().unwrap().len(), 7);
}

#[test]
fn describe_shows_parameters() {
    let output = iohal(&["describe", "ads1015"]);
    assert!(output.status.success());
    let text = stdout(&output);
    assert!(text.contains("Address"));
    assert!(text.contains("Gain 4"));
    assert!(text.contains("Analog Input"));

    assert!(!iohal(&["describe", "nope"]).status.success());
}

#[test]
fn validate_reports_each_device() {
    let dir = TempDir::new().unwrap();
    let good = hardware_file(&dir, HARDWARE);
    let output = iohal(&["validate", good.to_str().unwrap()]);
    assert!(output.status.success());
    assert!(stdout(&output).contains("✓ lights (pca9685)"));

    let bad_dir = TempDir::new().unwrap();
    let bad = hardware_file(
        &bad_dir,
        r#"
        [[devices]]
        id = "lights"
        driver = "pca9685"
        [devices.config]
        Address = 64
        Frequency = 5000
        "#,
    );
    let output = iohal(&["validate", bad.to_str().unwrap()]);
    assert!(!output.status.success());
    assert!(stdout(&output).contains("Frequency is out of range (1 - 1500). 5000 was received."));
}

#[test]
fn read_mock_analog() {
    let dir = TempDir::new().unwrap();
    let path = hardware_file(&dir, HARDWARE);

    let output = iohal(&with_file(&path, &["read", "sim", "1"]));
    assert!(output.status.success());
    assert_eq!(stdout(&output).trim(), "42");

    let output = iohal(&with_file(&path, &["read", "raw", "0"]));
    assert!(!output.status.success(), "uncalibrated pin needs --raw");
    let output = iohal(&with_file(&path, &["read", "raw", "0", "--raw"]));
    assert_eq!(stdout(&output).trim(), "5");
}

#[test]
fn write_and_set_on_mock_transports() {
    let dir = TempDir::new().unwrap();
    let path = hardware_file(&dir, HARDWARE);

    assert!(iohal(&with_file(&path, &["set", "lights", "3", "42.5"])).status.success());
    assert!(iohal(&with_file(&path, &["write", "lights", "3", "on"])).status.success());
    assert!(iohal(&with_file(&path, &["write", "io", "2", "off"])).status.success());

    assert!(!iohal(&with_file(&path, &["set", "lights", "3", "150"])).status.success());
    assert!(!iohal(&with_file(&path, &["set", "lights", "16", "10"])).status.success());
    assert!(!iohal(&with_file(&path, &["set", "sim", "0", "10"])).status.success());
    assert!(!iohal(&with_file(&path, &["read", "missing", "0"])).status.success());
}
