//! End-to-end tests for the dynarun binary.
//!
//! Tests that need a real interpreter return early when `python3` is missing.

use assert_cmd::Command;
use dynarun_protocol::{fragment_file_name, CoverageReport, MERGED_REPORT_NAME};
use predicates::prelude::*;
use std::path::Path;

fn python_available() -> bool {
    std::process::Command::new("python3")
        .arg("--version")
        .output()
        .map(|out| out.status.success())
        .unwrap_or(false)
}

/// dynarun isolated to `root`: its own HOME (config) and TMPDIR (session artifacts).
fn dynarun(root: &Path) -> Command {
    let mut cmd = Command::cargo_bin("dynarun").expect("dynarun binary");
    cmd.current_dir(root)
        .env("HOME", root)
        .env("TMPDIR", root)
        .env_remove("DYNARUN_PYTHON")
        .env_remove("DYNARUN_LOG_DIR");
    cmd
}

fn session_dirs(root: &Path) -> Vec<std::path::PathBuf> {
    std::fs::read_dir(root)
        .unwrap()
        .map(|e| e.unwrap().path())
        .filter(|p| {
            p.file_name()
                .and_then(|n| n.to_str())
                .map(|n| n.starts_with("dynapyt_coverage-"))
                .unwrap_or(false)
        })
        .collect()
}

#[test]
fn help_lists_run_flags() {
    let temp_dir = tempfile::tempdir().expect("temp dir");
    dynarun(temp_dir.path())
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("--entry"))
        .stdout(predicate::str::contains("--analysis"))
        .stdout(predicate::str::contains("--coverage"));
}

#[test]
fn entry_is_required() {
    let temp_dir = tempfile::tempdir().expect("temp dir");
    dynarun(temp_dir.path())
        .args(["--analysis", "A"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("--entry"));
}

#[test]
fn coverage_dir_requires_coverage() {
    let temp_dir = tempfile::tempdir().expect("temp dir");
    dynarun(temp_dir.path())
        .args(["--entry", "app.py", "--analysis", "A", "--coverage-dir", "out"])
        .assert()
        .failure();
}

#[test]
fn merge_subcommand_unions_fragments() {
    let temp_dir = tempfile::tempdir().expect("temp dir");
    let dir = temp_dir.path().join("dynapyt_coverage-manual");
    std::fs::create_dir_all(&dir).unwrap();
    std::fs::write(dir.join(fragment_file_name("a")), r#"{"a.py": [1, 2]}"#).unwrap();
    std::fs::write(dir.join(fragment_file_name("b")), r#"{"a.py": [2, 3]}"#).unwrap();

    dynarun(temp_dir.path())
        .arg("merge")
        .arg(&dir)
        .assert()
        .success()
        .stdout(predicate::str::contains("2 fragments"));

    let merged = std::fs::read_to_string(dir.join(MERGED_REPORT_NAME)).unwrap();
    assert_eq!(
        CoverageReport::from_json(&merged).unwrap(),
        CoverageReport::from_json(r#"{"a.py": [1, 2, 3]}"#).unwrap()
    );
}

#[test]
fn merge_subcommand_fails_on_malformed_fragment() {
    let temp_dir = tempfile::tempdir().expect("temp dir");
    let dir = temp_dir.path().join("dynapyt_coverage-manual");
    std::fs::create_dir_all(&dir).unwrap();
    std::fs::write(dir.join(fragment_file_name("a")), "{oops").unwrap();

    dynarun(temp_dir.path())
        .arg("merge")
        .arg(&dir)
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Malformed coverage fragment"));

    dynarun(temp_dir.path())
        .args(["merge", "--skip-malformed"])
        .arg(&dir)
        .assert()
        .success()
        .stdout(predicate::str::contains("1 skipped"));
}

#[test]
fn script_scenario_prints_output_and_session_id() {
    if !python_available() {
        return;
    }
    let temp_dir = tempfile::tempdir().expect("temp dir");
    std::fs::write(temp_dir.path().join("script.py"), "print(1+1)\n").unwrap();

    let output = dynarun(temp_dir.path())
        .args(["--entry", "script.py", "--analysis", "A"])
        .output()
        .expect("run dynarun");
    assert!(output.status.success());

    let stdout = String::from_utf8(output.stdout).unwrap();
    let lines: Vec<&str> = stdout.lines().collect();
    assert!(lines.contains(&"2"));
    let session_id = lines.last().expect("session id line");
    assert_eq!(session_id.len(), 36);
    assert_eq!(session_id.matches('-').count(), 4);

    assert!(session_dirs(temp_dir.path()).is_empty());
    let registry = temp_dir
        .path()
        .join(format!("dynapyt_analyses-{}.txt", session_id));
    assert_eq!(std::fs::read_to_string(registry).unwrap(), "A");
}

#[test]
fn missing_module_exits_with_entry_error() {
    if !python_available() {
        return;
    }
    let temp_dir = tempfile::tempdir().expect("temp dir");

    dynarun(temp_dir.path())
        .args(["--entry", "nonexistent.module", "--analysis", "A", "--coverage"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("Could not find entry nonexistent.module"));

    assert!(session_dirs(temp_dir.path()).is_empty());
}

#[test]
fn target_exit_status_passes_through() {
    if !python_available() {
        return;
    }
    let temp_dir = tempfile::tempdir().expect("temp dir");
    std::fs::write(temp_dir.path().join("exit.py"), "import sys\nsys.exit(5)\n").unwrap();

    dynarun(temp_dir.path())
        .args(["--entry", "exit.py", "--analysis", "A"])
        .assert()
        .code(5);
}

#[test]
fn coverage_run_writes_merged_report() {
    if !python_available() {
        return;
    }
    let temp_dir = tempfile::tempdir().expect("temp dir");
    std::fs::write(
        temp_dir.path().join("cov.py"),
        r#"import json, os, subprocess, sys
cov = os.environ["DYNARUN_COVERAGE_DIR"]
with open(os.path.join(cov, "coverage-parent.json"), "w") as f:
    json.dump({"cov.py": [1, 2]}, f)
child = "import json, os; json.dump({'cov.py': [2, 3]}, open(os.path.join(os.environ['DYNARUN_COVERAGE_DIR'], 'coverage-child.json'), 'w'))"
subprocess.check_call([sys.executable, "-c", child])
"#,
    )
    .unwrap();

    dynarun(temp_dir.path())
        .args(["--entry", "cov.py", "--analysis", "A", "--coverage", "--coverage-dir", "out"])
        .assert()
        .success();

    let dirs = session_dirs(&temp_dir.path().join("out"));
    assert_eq!(dirs.len(), 1);
    let merged = std::fs::read_to_string(dirs[0].join(MERGED_REPORT_NAME)).unwrap();
    assert_eq!(
        CoverageReport::from_json(&merged).unwrap(),
        CoverageReport::from_json(r#"{"cov.py": [1, 2, 3]}"#).unwrap()
    );
}
