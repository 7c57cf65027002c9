// End-to-end checks of the stdin/stdout contract: every output line is one
// JSON event and exit codes follow the registry.

use std::io::Write;
use std::process::{Command, Output, Stdio};

fn gridcalc(args: &[&str], stdin: &str, config_dir: &std::path::Path) -> Output {
    let mut child = Command::new(env!("CARGO_BIN_EXE_gridcalc"))
        .args(args)
        .env("GRIDCALC_CONFIG", config_dir.join("engine.toml"))
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("spawn gridcalc");
    child.stdin.take().unwrap().write_all(stdin.as_bytes()).unwrap();
    child.wait_with_output().expect("wait for gridcalc")
}

fn events(output: &Output) -> Vec<serde_json::Value> {
    String::from_utf8_lossy(&output.stdout)
        .lines()
        .map(|line| {
            serde_json::from_str(line).unwrap_or_else(|e| panic!("not JSON ({e}): {line}"))
        })
        .collect()
}

#[test]
fn recompute_flows_through_stdout() {
    let dir = tempfile::tempdir().unwrap();
    let output = gridcalc(
        &[],
        r#"{"op":"set","cell":"A1","text":"2"}
{"op":"set","cell":"A2","text":"=A1*A1"}
{"op":"get","cell":"A2"}
"#,
        dir.path(),
    );

    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));
    let events = events(&output);
    assert_eq!(events.len(), 3);
    assert_eq!(events[2]["data"]["display"], "4");
    assert_eq!(events[2]["data"]["formula"], "=A1*A1");
}

#[test]
fn strict_mode_exit_code() {
    let dir = tempfile::tempdir().unwrap();
    let output = gridcalc(&["--strict"], "{\"op\":\"remove_sheet\",\"sheet\":9}\n", dir.path());

    assert_eq!(output.status.code(), Some(4));
    assert_eq!(events(&output)[0]["event"], "error");
}

#[test]
fn snapshot_save_and_load() {
    let dir = tempfile::tempdir().unwrap();
    let snapshot = dir.path().join("grid.json");
    let snapshot_arg = snapshot.to_str().unwrap();

    let first = gridcalc(
        &["--save", snapshot_arg],
        r#"{"op":"set","cell":"B2","text":"=6*7"}
"#,
        dir.path(),
    );
    assert!(first.status.success());

    let second = gridcalc(&["--load", snapshot_arg], "{\"op\":\"get\",\"cell\":\"B2\"}\n", dir.path());
    assert!(second.status.success());
    assert_eq!(events(&second)[0]["data"]["display"], "42");
}

#[test]
fn broken_snapshot_exit_code() {
    let dir = tempfile::tempdir().unwrap();
    let snapshot = dir.path().join("broken.json");
    std::fs::write(&snapshot, "{\"sheets\": []}").unwrap();

    let output = gridcalc(&["--load", snapshot.to_str().unwrap()], "", dir.path());
    assert_eq!(output.status.code(), Some(3));
}

#[test]
fn write_config_creates_settings_file() {
    let dir = tempfile::tempdir().unwrap();
    let output = gridcalc(&["--write-config"], "", dir.path());

    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));
    assert!(output.stdout.is_empty());
    let written = std::fs::read_to_string(dir.path().join("engine.toml")).unwrap();
    assert!(written.contains("[grid]"));
    assert!(written.contains("change_threshold = 100"));
}
