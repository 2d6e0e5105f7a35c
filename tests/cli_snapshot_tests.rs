//! Snapshot tests for user-facing CLI messages using insta.
//!
//! To update snapshots after intentional changes:
//! ```bash
//! cargo insta test --accept
//! ```

use assert_cmd::cargo::cargo_bin_cmd;

/// Fold an error report onto one line, dropping any backtrace
fn normalize_output(output: &str) -> String {
    let report = output.split("\n\nStack backtrace:").next().unwrap_or(output);
    report
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join(" | ")
}

fn stderr_for_config(yaml: &str) -> String {
    let temp = assert_fs::TempDir::new().unwrap();
    let config = temp.path().join("multiversion.yaml");
    std::fs::write(&config, yaml).unwrap();

    let output = cargo_bin_cmd!("docs-multiversion")
        .current_dir(temp.path())
        .args(["docs", "out", "--config"])
        .arg(&config)
        .output()
        .expect("Failed to execute command");
    normalize_output(&String::from_utf8_lossy(&output.stderr))
}

#[test]
fn test_zero_jobs_config_error_snapshot() {
    insta::assert_snapshot!(
        stderr_for_config("jobs: 0\n"),
        @"Error: Configuration error: jobs must be at least 1 | hint: Use `jobs: 1` to build refs sequentially"
    );
}

#[test]
fn test_primary_affinity_without_path_snapshot() {
    insta::assert_snapshot!(
        stderr_for_config("submodules:\n  affinity: primary\n"),
        @"Error: Configuration error: submodules.affinity is 'primary' but no submodules.path is set | hint: Set submodules.path to the submodule that must match"
    );
}

#[test]
fn test_unknown_placeholder_snapshot() {
    insta::assert_snapshot!(
        stderr_for_config("output:\n  dir_format: '{version}'\n"),
        @"Error: Configuration error: Unknown placeholder '{version}' in output.dir_format | hint: Supported placeholders: {name}, {kind}, {remote}, {commit}, {short_commit}"
    );
}
