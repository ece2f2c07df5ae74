//! Binary-level smoke tests: exit codes and on-disk rewrites.

use std::path::{Path, PathBuf};
use std::process::Command;

use tempfile::TempDir;

/// Copy a fixture directory into an isolated temp dir and return both.
fn isolated_fixture(name: &str) -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let src = Path::new("tests/fixtures").join(name);
    let path = tmp.path().to_path_buf();
    copy_dir_recursive(&src, &path);
    (tmp, path)
}

fn copy_dir_recursive(src: &Path, dst: &Path) {
    for entry in std::fs::read_dir(src).unwrap() {
        let entry = entry.unwrap();
        let dest_path = dst.join(entry.file_name());
        if entry.file_type().unwrap().is_dir() {
            std::fs::create_dir_all(&dest_path).unwrap();
            copy_dir_recursive(&entry.path(), &dest_path);
        } else {
            std::fs::copy(entry.path(), &dest_path).unwrap();
        }
    }
}

fn caplint_at(dir: &Path) -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_caplint"));
    cmd.current_dir(dir);
    cmd
}

#[test]
fn analyze_clean_fixture_succeeds() {
    let (_tmp, dir) = isolated_fixture("basic");
    let output = caplint_at(&dir)
        .args(["analyze", "node.can", "common.cin"])
        .output()
        .unwrap();
    assert!(
        output.status.success(),
        "analyze failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    assert!(dir.join("aic.db").exists(), "store not created");
}

#[test]
fn lint_reports_errors_with_exit_one() {
    let (_tmp, dir) = isolated_fixture("basic");
    std::fs::write(
        dir.join("broken.can"),
        "extern int gBad;\nvariables {\n  int gA;\n}\n",
    )
    .unwrap();

    let output = caplint_at(&dir).args(["lint", "broken.can"]).output().unwrap();
    assert_eq!(output.status.code(), Some(1));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("E001"), "got: {stdout}");
}

#[test]
fn lint_fix_rewrites_and_then_passes() {
    let (_tmp, dir) = isolated_fixture("basic");
    std::fs::write(
        dir.join("broken.can"),
        "extern int gBad;\nvariables {\n  int gA;\n}\n",
    )
    .unwrap();

    let fix = caplint_at(&dir)
        .args(["lint", "--fix", "broken.can"])
        .output()
        .unwrap();
    assert!(
        fix.status.success(),
        "fix failed: {}",
        String::from_utf8_lossy(&fix.stderr)
    );

    let content = std::fs::read_to_string(dir.join("broken.can")).unwrap();
    assert!(!content.contains("extern"), "got: {content}");

    let relint = caplint_at(&dir).args(["lint", "broken.can"]).output().unwrap();
    assert!(relint.status.success(), "re-lint should be clean");
}

#[test]
fn format_check_gates_then_format_fixes() {
    let (_tmp, dir) = isolated_fixture("basic");
    std::fs::write(dir.join("messy.can"), "void f(){write(\"x\");}\n").unwrap();

    let check = caplint_at(&dir)
        .args(["format", "--check", "messy.can"])
        .output()
        .unwrap();
    assert_eq!(check.status.code(), Some(1), "check must flag the messy file");

    let format = caplint_at(&dir).args(["format", "messy.can"]).output().unwrap();
    assert!(format.status.success());

    let recheck = caplint_at(&dir)
        .args(["format", "--check", "messy.can"])
        .output()
        .unwrap();
    assert!(recheck.status.success(), "formatted file must pass check");
}

#[test]
fn unknown_rule_filter_is_reported_not_fatal() {
    let (_tmp, dir) = isolated_fixture("basic");
    let output = caplint_at(&dir)
        .args(["lint", "--disable", "E999", "node.can"])
        .output()
        .unwrap();
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("E999"), "got: {stderr}");
    assert!(output.status.success(), "unknown id must not abort");
}
