//! End-to-end tests for CLI exit codes.
//!
//! - Exit code 0: Success, an empty selection, or a partial failure without
//!   `--strict`
//! - Exit code 1: Every build failed, a partial failure with `--strict`, or a
//!   fatal error (configuration, git)
//! - Exit code 2: Invalid command-line usage (handled by clap)

mod common;
use common::prelude::*;

/// Exit code 0 is returned for --help.
#[test]
fn test_exit_code_help() {
    cargo_bin_cmd!("docs-multiversion")
        .arg("--help")
        .assert()
        .code(0)
        .stdout(predicate::str::contains("SOURCE_DIR"))
        .stdout(predicate::str::contains("OUTPUT_DIR"))
        .stdout(predicate::str::contains("--dump-metadata"));
}

/// Exit code 0 is returned for --version.
#[test]
fn test_exit_code_version() {
    cargo_bin_cmd!("docs-multiversion")
        .arg("--version")
        .assert()
        .code(0)
        .stdout(predicate::str::starts_with("docs-multiversion "));
}

/// Exit code 2 is returned when positional arguments are missing.
#[test]
fn test_exit_code_missing_arguments() {
    cargo_bin_cmd!("docs-multiversion")
        .arg("docs")
        .assert()
        .code(2)
        .stderr(predicate::str::contains("OUTPUT_DIR"));
}

/// Exit code 2 is returned for an invalid job count.
#[test]
fn test_exit_code_invalid_jobs() {
    cargo_bin_cmd!("docs-multiversion")
        .args(["docs", "out", "--jobs", "0"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("must be at least 1"));
}

/// Exit code 1 is returned when an explicit configuration file is missing.
#[test]
fn test_exit_code_config_not_found() {
    let temp = TempDir::new().unwrap();

    cargo_bin_cmd!("docs-multiversion")
        .current_dir(temp.path())
        .args(["docs", "out", "--config", "nonexistent.yaml"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Cannot read configuration file"));
}

/// Exit code 1 is returned for unknown configuration keys, with a hint.
#[test]
fn test_exit_code_invalid_config() {
    let temp = TempDir::new().unwrap();
    temp.child("docs/multiversion.yaml")
        .write_str("refz:\n  include: ['*']\n")
        .unwrap();

    cargo_bin_cmd!("docs-multiversion")
        .current_dir(temp.path())
        .args(["docs", "out"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("refz"))
        .stderr(predicate::str::contains("hint:"));
}

/// Exit code 1 is returned when the source directory is not in a git
/// repository.
#[test]
fn test_exit_code_not_a_repository() {
    let temp = TempDir::new().unwrap();
    temp.child("docs/index.txt").write_str("hello").unwrap();

    cargo_bin_cmd!("docs-multiversion")
        .current_dir(temp.path())
        .args(["docs", "out"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Git command failed"));
}

/// Exit code 1 is returned when the source directory does not exist.
#[test]
fn test_exit_code_missing_source_dir() {
    let temp = TempDir::new().unwrap();

    cargo_bin_cmd!("docs-multiversion")
        .current_dir(temp.path())
        .args(["missing", "out"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("not accessible"));
}

/// Exit code 1 is returned when two refs map to the same output directory,
/// before anything is built.
#[cfg(unix)]
#[test]
fn test_exit_code_output_dir_collision() {
    let Some(repo) = GitFixture::new() else {
        return;
    };
    repo.commit_docs(configs::COPY_BUILDER, "page", "initial");
    repo.git(&["branch", "feature/a"]);
    repo.git(&["branch", "feature-a"]);
    let output = TempDir::new().unwrap();

    cargo_bin_cmd!("docs-multiversion")
        .current_dir(repo.path())
        .args(["docs", output.path().to_str().unwrap()])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("both map to output directory"));

    output.child("main").assert(predicate::path::missing());
}
