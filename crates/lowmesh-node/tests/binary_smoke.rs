//! Smoke tests for the `lowmesh-node` binary.

use std::process::{Command, Stdio};
use std::time::Duration;

const BIN: &str = env!("CARGO_BIN_EXE_lowmesh-node");

fn border_router_config() -> tempfile::NamedTempFile {
    let toml = format!(
        r#"
[node]
link_addr = "0011223344556677"
role = "border-router"
enable_storage = false

[security]
pmk = "{}"
"#,
        "42".repeat(32)
    );
    let file = tempfile::NamedTempFile::new().unwrap();
    std::fs::write(file.path(), toml).unwrap();
    file
}

#[cfg(unix)]
#[test]
fn binary_runs_until_interrupted() {
    let config = border_router_config();
    let log = tempfile::NamedTempFile::new().unwrap();

    let child = Command::new(BIN)
        .arg("--config")
        .arg(config.path())
        .env("RUST_LOG_FORMAT", "json")
        .env("RUST_LOG", "info")
        .stdout(Stdio::from(log.reopen().unwrap()))
        .stderr(Stdio::null())
        .spawn()
        .unwrap();
    let pid = child.id().to_string();

    std::thread::sleep(Duration::from_millis(500));
    let interrupted = Command::new("kill").args(["-INT", &pid]).status().unwrap();
    assert!(interrupted.success());

    // Never leave a stuck child behind.
    let _reaper = std::thread::spawn(move || {
        std::thread::sleep(Duration::from_secs(5));
        let _ = Command::new("kill").args(["-9", &pid]).status();
    });

    let status = child.wait_with_output().unwrap().status;
    assert_eq!(status.code(), Some(0));

    let logged = std::fs::read_to_string(log.path()).unwrap();
    let started = logged
        .lines()
        .find(|line| line.contains("interface started"))
        .unwrap_or_else(|| panic!("no startup line in: {logged}"));
    assert!(started.starts_with('{'), "startup line is not JSON: {started}");
    assert!(started.contains("00:11:22:33:44:55:66:77") || started.contains("0011223344556677"));
    assert!(logged.lines().any(|line| line.contains("node stopped")), "{logged}");
}

#[test]
fn binary_rejects_missing_config() {
    let output = Command::new(BIN)
        .args(["--config", "/nonexistent/lowmesh.toml"])
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&output.stderr).contains("failed to load config"));
}

#[test]
fn binary_rejects_router_without_pmk() {
    let file = tempfile::NamedTempFile::new().unwrap();
    std::fs::write(file.path(), "[node]\nrole = \"router\"\nenable_storage = false\n").unwrap();
    let output = Command::new(BIN)
        .arg("--config")
        .arg(file.path())
        .env("RUST_LOG", "error")
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(1));
}
