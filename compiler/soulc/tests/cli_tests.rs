//! CLI smoke tests: exit codes and output files.

use std::process::Command;
use tempfile::tempdir;

fn soulc() -> Command {
    Command::new(env!("CARGO_BIN_EXE_soulc"))
}

const GOOD_SOURCE: &str = "processor P {
    output stream float out;
    void run() { loop { out << 0.5f; advance(); } }
}
";

#[test]
fn compile_writes_heart_dump() {
    let dir = tempdir().unwrap();
    let source = dir.path().join("p.soul");
    let output = dir.path().join("p.heart");
    std::fs::write(&source, GOOD_SOURCE).unwrap();

    let status = soulc()
        .args(["compile", source.to_str().unwrap(), "-o", output.to_str().unwrap()])
        .status()
        .unwrap();
    assert_eq!(status.code(), Some(0));

    let text = std::fs::read_to_string(&output).unwrap();
    assert!(text.starts_with("#SOUL-HEART"));
    assert!(text.contains("processor P"));
}

#[test]
fn compile_error_exits_1() {
    let dir = tempdir().unwrap();
    let source = dir.path().join("bad.soul");
    let output = dir.path().join("bad.heart");
    // No output endpoint: a sanity error.
    std::fs::write(&source, "processor P { input stream float in; void run() {} }").unwrap();

    let result = soulc()
        .args(["compile", source.to_str().unwrap(), "-o", output.to_str().unwrap()])
        .output()
        .unwrap();
    assert_eq!(result.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&result.stderr);
    assert!(stderr.contains("E0200"), "stderr: {stderr}");
    assert!(!output.exists());
}

#[test]
fn missing_file_exits_2() {
    let status = soulc()
        .args(["check", "/nonexistent/nowhere.soul"])
        .status()
        .unwrap();
    assert_eq!(status.code(), Some(2));
}

#[test]
fn unknown_command_exits_2() {
    let status = soulc().args(["frobnicate"]).status().unwrap();
    assert_eq!(status.code(), Some(2));
}

#[test]
fn check_reports_ok() {
    let dir = tempdir().unwrap();
    let source = dir.path().join("p.soul");
    std::fs::write(&source, GOOD_SOURCE).unwrap();

    let result = soulc().args(["check", source.to_str().unwrap()]).output().unwrap();
    assert_eq!(result.status.code(), Some(0));
    let stdout = String::from_utf8_lossy(&result.stdout);
    assert!(stdout.contains("ok"));
}

#[test]
fn diagnostics_carry_line_and_column() {
    let dir = tempdir().unwrap();
    let source = dir.path().join("p.soul");
    std::fs::write(
        &source,
        "processor P {\n    output stream float out;\n    void run() { loop { out << nope; advance(); } }\n}\n",
    )
    .unwrap();

    let result = soulc().args(["check", source.to_str().unwrap()]).output().unwrap();
    assert_eq!(result.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&result.stderr);
    // file:line:col: error[code]: ...
    assert!(stderr.contains(":3:"), "stderr: {stderr}");
    assert!(stderr.contains("E0300"), "stderr: {stderr}");
}
