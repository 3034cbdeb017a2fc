//! CLI integration tests for the demo, verify, and bench commands.

use std::fs;
use std::process::Command;

#[test]
fn demo_cli_writes_results_that_verify_cleanly() {
    let bin = env!("CARGO_BIN_EXE_task_server");
    let dir = tempfile::tempdir().expect("tempdir");
    let out_dir = dir.path().join("results");

    // Run the demo with a small, seeded workload.
    let output = Command::new(bin)
        .args(["demo", "--per-client", "10", "--seed", "3", "--idle-wait-ms", "5"])
        .arg("--out-dir")
        .arg(&out_dir)
        .env("RUST_LOG", "warn")
        .output()
        .expect("failed to run demo binary");

    // Demo should exit cleanly.
    assert!(
        output.status.success(),
        "demo exited with non-zero status: {:?}",
        output.status
    );

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(
        stdout.contains("DEMO SUMMARY"),
        "demo summary missing from output"
    );
    let executed_line = stdout
        .lines()
        .find(|line| line.starts_with("executed="))
        .expect("executed line missing");
    assert_eq!(executed_line.trim(), "executed=30");

    let files: Vec<_> = ["sin", "sqrt", "pow"]
        .iter()
        .map(|op| out_dir.join(format!("{op}_results.txt")))
        .collect();
    for file in &files {
        let contents = fs::read_to_string(file).expect("result file missing");
        assert_eq!(contents.lines().count(), 10);
    }

    let output = Command::new(bin)
        .arg("verify")
        .args(&files)
        .output()
        .expect("failed to run verify");
    assert!(output.status.success(), "verify reported problems");
    let stdout = String::from_utf8_lossy(&output.stdout);
    let total = stdout
        .lines()
        .find(|line| line.starts_with("VERIFY TOTAL"))
        .expect("verify total missing");
    assert_eq!(
        total.trim(),
        "VERIFY TOTAL lines=30 matched=30 mismatched=0 malformed=0"
    );
}

#[test]
fn verify_cli_fails_on_tampered_file() {
    let bin = env!("CARGO_BIN_EXE_task_server");
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("sin_results.txt");
    fs::write(
        &path,
        "Task ID 1 operation: sin, number: 1.000000 result: 0.000000\n",
    )
    .expect("write");

    let output = Command::new(bin)
        .arg("verify")
        .arg(&path)
        .env("RUST_LOG", "error")
        .output()
        .expect("failed to run verify");
    assert_eq!(output.status.code(), Some(1));
}

#[test]
fn bench_cli_prints_csv() {
    let bin = env!("CARGO_BIN_EXE_task_server");
    let output = Command::new(bin)
        .args([
            "bench",
            "--producers",
            "1,2",
            "--tasks-per-producer",
            "20",
            "--work-us",
            "0",
            "--idle-wait-ms",
            "5",
        ])
        .env("RUST_LOG", "warn")
        .output()
        .expect("failed to run bench");
    assert!(output.status.success());

    let stdout = String::from_utf8_lossy(&output.stdout);
    let lines: Vec<_> = stdout.lines().collect();
    assert_eq!(lines.len(), 3);
    assert!(lines[0].starts_with("producers,"));
    // Every row should report FIFO order held.
    assert!(lines[1..].iter().all(|row| row.ends_with(",true")));
}

#[test]
fn bench_cli_rejects_zero_producers() {
    let bin = env!("CARGO_BIN_EXE_task_server");
    let output = Command::new(bin)
        .args(["bench", "--producers", "0", "--tasks-per-producer", "5"])
        .env("RUST_LOG", "off")
        .output()
        .expect("failed to run bench");

    assert_eq!(output.status.code(), Some(2));
    assert!(String::from_utf8_lossy(&output.stdout).trim().is_empty());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("invalid configuration"), "stderr: {stderr}");
}
