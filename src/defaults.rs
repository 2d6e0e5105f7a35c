//! Default values for docs-multiversion configuration.
//!
//! This module provides centralized default values used across the library
//! and the CLI, ensuring consistency and avoiding duplication.

use std::path::PathBuf;

/// Name of the configuration file looked up in the documentation source
/// directory, both in the current checkout and inside every ref.
pub const CONFIG_FILE_NAME: &str = "multiversion.yaml";

/// Name of the catalog file written to the root of the output directory.
pub const CATALOG_FILE_NAME: &str = "versions.json";

/// Prefix of every temporary worktree directory.
pub const WORKTREE_PREFIX: &str = "docs-mv-";

/// Prefix of the environment variables exported to the documentation builder.
pub const ENV_PREFIX: &str = "DOCS_MULTIVERSION_";

/// Default output subdirectory format.
pub const DIR_FORMAT: &str = "{name}";

/// Placeholders accepted by `output.dir_format`.
pub const DIR_PLACEHOLDERS: &[&str] = &["name", "kind", "remote", "commit", "short_commit"];

/// Default documentation builder command.
pub const BUILDER_COMMAND: &str = "sphinx-build";

/// Default flag used to pass overlay options to the builder.
pub const DEFINE_FLAG: &str = "-D";

pub fn include_patterns() -> Vec<String> {
    vec!["*".to_string()]
}

pub fn released_patterns() -> Vec<String> {
    vec!["tags/*".to_string()]
}

pub fn builder_args() -> Vec<String> {
    ["-b", "html", "{source}", "{output}"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

pub fn replacement() -> String {
    "$1".to_string()
}

pub fn jobs() -> usize {
    1
}

/// Returns the directory under which temporary worktrees are created.
///
/// Honors `TMPDIR` through `std::env::temp_dir`; overridable with the
/// `DOCS_MULTIVERSION_TMPDIR` environment variable.
pub fn worktree_root() -> PathBuf {
    std::env::var_os(format!("{}TMPDIR", ENV_PREFIX))
        .map(PathBuf::from)
        .unwrap_or_else(std::env::temp_dir)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_args_reference_source_and_output() {
        let args = builder_args();
        assert!(args.contains(&"{source}".to_string()));
        assert!(args.contains(&"{output}".to_string()));
    }

    #[test]
    fn test_worktree_root_is_a_path() {
        let root = worktree_root();
        assert!(!root.as_os_str().is_empty());
    }
}
