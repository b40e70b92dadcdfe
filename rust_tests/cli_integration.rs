//! CLI Integration Tests
//!
//! These tests spawn the suitebridge binary against temp projects:
//! - `list` output in JSON format
//! - `prepare` writing the entry manifest
//! - one-shot `run` against an emitted asset directory with a stub runner command

use std::path::{Path, PathBuf};
use std::process::{Command, Output, Stdio};
use std::time::Duration;
use suitebridge::entry::entry_name;
use tempfile::TempDir;
use wait_timeout::ChildExt;

fn write(root: &Path, rel: &str, body: &str) -> PathBuf {
    let path = root.join(rel);
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(&path, body).unwrap();
    path
}

/// Run the binary with a timeout, returning None if it hung
fn run_bridge(root: &Path, args: &[&str], timeout_secs: u64) -> Option<Output> {
    let mut child = Command::new(env!("CARGO_BIN_EXE_suitebridge"))
        .arg("--root")
        .arg(root)
        .args(args)
        .env("RUST_LOG", "warn")
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("Failed to spawn suitebridge");

    match child.wait_timeout(Duration::from_secs(timeout_secs)) {
        Ok(Some(_)) => child.wait_with_output().ok(),
        Ok(None) => {
            let _ = child.kill();
            None
        }
        Err(_) => None,
    }
}

fn project() -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().unwrap();
    let root = temp_dir.path().canonicalize().unwrap();
    write(&root, "src/a.spec.js", "describe('a', () => {});");
    write(&root, "src/util.js", "export const x = 1;");
    (temp_dir, root)
}

/// Emit a bundle for the spec entry the way the bundler would
fn emit_assets(root: &Path) {
    let entry = entry_name(&root.join("src/a.spec.js"));
    write(root, &format!("dist/{}.js", entry), "describe('a', () => {});");
    write(
        root,
        "dist/manifest.json",
        &format!(r#"{{"chunks": {{"{0}": ["{0}.js"]}}}}"#, entry),
    );
}

#[test]
fn test_list_json() {
    let (_temp_dir, root) = project();
    let output = run_bridge(&root, &["--format", "json", "list"], 30).expect("list timed out");
    assert!(output.status.success());

    let stdout = String::from_utf8_lossy(&output.stdout);
    let events: Vec<serde_json::Value> = stdout
        .lines()
        .map(|l| serde_json::from_str(l).expect("stdout must be pure NDJSON"))
        .collect();
    assert_eq!(events.len(), 2);
    assert!(events.iter().all(|e| e["event"] == "module"));

    let spec = root.join("src/a.spec.js");
    let spec_event = events
        .iter()
        .find(|e| e["path"] == spec.to_str().unwrap())
        .unwrap();
    assert_eq!(spec_event["entry"], entry_name(&spec));
}

#[test]
fn test_prepare_writes_entries() {
    let (_temp_dir, root) = project();
    let output = run_bridge(&root, &["prepare"], 30).expect("prepare timed out");
    assert!(output.status.success());

    let entries: serde_json::Value = serde_json::from_str(
        &std::fs::read_to_string(root.join("__build_tests/entries.json")).unwrap(),
    )
    .unwrap();
    let entries = entries.as_object().unwrap();
    assert_eq!(entries.len(), 2);
    assert!(entries.contains_key(&entry_name(&root.join("src/a.spec.js"))));
}

#[test]
fn test_run_once_success() {
    let (_temp_dir, root) = project();
    write(&root, ".wctrc.json", r#"{"command": ["true"]}"#);
    emit_assets(&root);

    let output = run_bridge(
        &root,
        &["--exclude", "**/dist/**", "run", "--assets", "dist"],
        60,
    )
    .expect("run timed out");
    assert!(
        output.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );

    let entry = entry_name(&root.join("src/a.spec.js"));
    let suite = root.join(format!("__build_tests/{}.html", entry));
    assert!(suite.exists());
    // Generated runner config is removed on cleanup
    assert!(!root.join("__build_tests/wct.generated.json").exists());
}

#[test]
fn test_run_once_failing_runner() {
    let (_temp_dir, root) = project();
    write(&root, ".wctrc.json", r#"{"command": ["false"]}"#);
    emit_assets(&root);

    let output = run_bridge(
        &root,
        &["--format", "json", "--exclude", "**/dist/**", "run", "--assets", "dist"],
        60,
    )
    .expect("run timed out");
    assert!(!output.status.success());

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("\"event\":\"cycle_finished\""));
    assert!(stdout.contains("run-tests"));
}

#[test]
fn test_run_missing_manifest() {
    let (_temp_dir, root) = project();
    let output = run_bridge(&root, &["run", "--assets", "dist"], 30).expect("run timed out");
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("FATAL ERROR"));
}
