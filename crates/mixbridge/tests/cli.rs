#![cfg(all(unix, feature = "cli"))]

use std::io::{BufRead, BufReader, Write};
use std::process::{Child, Command, Stdio};
use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant};

fn mixbridge() -> Command {
    let mut command = Command::new(env!("CARGO_BIN_EXE_mixbridge"));
    command
        .env_remove("MIXBRIDGE_CHANNEL_FD")
        .env_remove("NODE_CHANNEL_FD")
        .arg("--log-level")
        .arg("error");
    command
}

fn stdout_lines(child: &mut Child) -> mpsc::Receiver<String> {
    let stdout = child.stdout.take().expect("stdout should be piped");
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        for line in BufReader::new(stdout).lines() {
            let Ok(line) = line else { break };
            if tx.send(line).is_err() {
                break;
            }
        }
    });
    rx
}

fn wait_for_line(lines: &mpsc::Receiver<String>, needle: &str, seen: &mut Vec<String>) {
    let deadline = Instant::now() + Duration::from_secs(10);
    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        let line = lines
            .recv_timeout(remaining)
            .unwrap_or_else(|_| panic!("no line containing {needle}; saw {seen:?}"));
        let found = line.contains(needle);
        seen.push(line);
        if found {
            return;
        }
    }
}

fn wait_for_exit(child: &mut Child, timeout: Duration) -> std::process::ExitStatus {
    let deadline = Instant::now() + timeout;
    loop {
        if let Some(status) = child.try_wait().expect("try_wait should succeed") {
            return status;
        }
        if Instant::now() >= deadline {
            let _ = child.kill();
            panic!("process did not exit in time");
        }
        thread::sleep(Duration::from_millis(25));
    }
}

#[test]
fn version_prints_package_version() {
    let output = mixbridge().arg("version").output().expect("version should run");
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.starts_with("mixbridge "));
    assert!(stdout.contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn envinfo_json_reports_embedded_process() {
    let output = mixbridge()
        .args(["--format", "json", "envinfo"])
        .output()
        .expect("envinfo should run");
    assert!(output.status.success());

    let info: serde_json::Value =
        serde_json::from_slice(&output.stdout).expect("envinfo should print JSON");
    assert_eq!(info["channel"]["process_kind"], "embedded");
    assert_eq!(info["timings"]["invoke_timeout_ms"], 5000);
    assert_eq!(info["version"], env!("CARGO_PKG_VERSION"));
}

#[test]
fn demo_outside_a_host_is_a_usage_error() {
    let output = mixbridge().arg("demo").output().expect("demo should run");
    assert_eq!(output.status.code(), Some(64));
}

#[test]
fn host_with_missing_program_fails() {
    let output = mixbridge()
        .args(["host", "/nonexistent/mixbridge-plugin"])
        .stdin(Stdio::null())
        .output()
        .expect("host should run");
    assert!(!output.status.success());
}

#[test]
fn host_runs_demo_until_close_is_acknowledged() {
    let mut host = mixbridge()
        .args(["--format", "json", "host", env!("CARGO_BIN_EXE_mixbridge")])
        .args(["demo", "--log-level", "error"])
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("host should start");
    let lines = stdout_lines(&mut host);
    let mut seen = Vec::new();

    wait_for_line(&lines, "plugin-ready", &mut seen);
    assert!(seen
        .iter()
        .any(|line| line.contains("plugin-updateAssignment") && line.contains("\"demo\"")));

    let mut stdin = host.stdin.take().expect("stdin should be piped");
    stdin
        .write_all(b"[\"plugin-onVolume-demo\", [0.25]]\n")
        .expect("write volume");
    wait_for_line(&lines, "plugin-setIndicator-volume", &mut seen);

    stdin
        .write_all(b"[\"plugin-close\"]\n")
        .expect("write close");
    wait_for_line(&lines, "plugin-close", &mut seen);

    let status = wait_for_exit(&mut host, Duration::from_secs(10));
    assert!(status.success(), "host exited with {status}; saw {seen:?}");
}

#[test]
fn host_exits_with_stdin_still_open() {
    let mut host = mixbridge()
        .args(["host", "--", "/bin/sh", "-c", "exit 0"])
        .stdin(Stdio::piped())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .expect("host should start");
    // Keep the write end open so the host's stdin read never completes.
    let _stdin = host.stdin.take().expect("stdin should be piped");

    let status = wait_for_exit(&mut host, Duration::from_secs(10));
    assert!(status.code().is_some(), "host was killed: {status}");
}

#[test]
fn host_times_out_when_close_is_ignored() {
    let mut host = mixbridge()
        .args(["host", "--close-timeout", "200ms", "--"])
        .args(["/bin/sh", "-c", "sleep 30"])
        .stdin(Stdio::piped())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .expect("host should start");
    let mut stdin = host.stdin.take().expect("stdin should be piped");
    stdin
        .write_all(b"[\"plugin-close\"]\n")
        .expect("write close");

    let status = wait_for_exit(&mut host, Duration::from_secs(10));
    assert_eq!(status.code(), Some(124), "host exited with {status}");
}
