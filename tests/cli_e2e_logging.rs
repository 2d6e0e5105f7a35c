//! End-to-end tests for log output.

mod common;
use common::prelude::*;

/// Debug records emitted while the configuration is loaded are shown with
/// `--debug`.
#[test]
fn test_debug_flag_covers_configuration_loading() {
    let temp = TempDir::new().unwrap();
    temp.child("docs/index.txt").write_str("hello").unwrap();

    cargo_bin_cmd!("docs-multiversion")
        .current_dir(temp.path())
        .env_remove("RUST_LOG")
        .args(["docs", "out", "--debug"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("No configuration at"));
}

#[test]
fn test_default_level_hides_debug_records() {
    let temp = TempDir::new().unwrap();
    temp.child("docs/index.txt").write_str("hello").unwrap();

    cargo_bin_cmd!("docs-multiversion")
        .current_dir(temp.path())
        .env_remove("RUST_LOG")
        .args(["docs", "out"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("No configuration at").not());
}

/// `debug: true` in the configuration file enables debug records once the
/// file has been read.
#[cfg(unix)]
#[test]
fn test_debug_from_configuration_file() {
    let Some(repo) = GitFixture::new() else {
        return;
    };
    repo.commit_docs(
        &format!("debug: true\n{}", configs::tags_only()),
        "page",
        "initial",
    );
    let output = TempDir::new().unwrap();

    cargo_bin_cmd!("docs-multiversion")
        .current_dir(repo.path())
        .env_remove("RUST_LOG")
        .args(["docs", output.path().to_str().unwrap(), "--dump-metadata"])
        .assert()
        .code(0)
        .stderr(predicate::str::contains("Run state"));
}
