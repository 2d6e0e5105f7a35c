//! Shared test utilities for integration and E2E tests.
//!
//! This module provides a fixture for building throwaway git repositories
//! and configuration snippets used across the CLI tests.
//!
//! ## Usage
//!
//! ```rust,ignore
//! mod common;
//! use common::prelude::*;
//!
//! #[test]
//! fn test_example() {
//!     let Some(repo) = GitFixture::new() else { return };
//!     repo.write("docs/index.txt", "hello").commit("initial").tag("v1.0");
//! }
//! ```

use std::path::{Path, PathBuf};
use std::process::Command;

use assert_fs::prelude::*;

/// Re-export commonly used test dependencies for convenience.
pub mod prelude {
    pub use assert_cmd::cargo::cargo_bin_cmd;
    pub use assert_fs::prelude::*;
    #[allow(unused_imports)]
    pub use assert_fs::TempDir;
    pub use predicates::prelude::*;

    #[allow(unused_imports)]
    pub use super::configs;
    #[allow(unused_imports)]
    pub use super::GitFixture;
}

/// Configuration snippets for `docs/multiversion.yaml`.
#[allow(dead_code)]
pub mod configs {
    /// Builder that copies `index.txt` to `index.html` and records the
    /// version label next to it.
    pub const COPY_BUILDER: &str = r#"
builder:
  command: sh
  args:
    - -c
    - >-
      if [ -f "$DOCS_MULTIVERSION_SOURCE_DIR/broken" ]; then
      echo "broken docs in $DOCS_MULTIVERSION_NAME" >&2; exit 1; fi;
      cp "$DOCS_MULTIVERSION_SOURCE_DIR/index.txt" "$DOCS_MULTIVERSION_OUTPUT_DIR/index.html" &&
      echo "$DOCS_MULTIVERSION_VERSION" > "$DOCS_MULTIVERSION_OUTPUT_DIR/version.txt"
  define_flag: null
"#;

    /// `COPY_BUILDER` with `main` excluded and the `v` prefix stripped.
    pub fn tags_only() -> String {
        format!(
            "refs:\n  exclude: [main]\nversion:\n  strip_prefix: v\n{}",
            COPY_BUILDER
        )
    }
}

/// A git repository in a temporary directory.
///
/// Commits get strictly increasing dates so that date ordering is
/// deterministic.
pub struct GitFixture {
    temp_dir: assert_fs::TempDir,
    commits: std::cell::Cell<u32>,
}

#[allow(dead_code)]
impl GitFixture {
    /// Create a repository with a `main` branch, or `None` when git is not
    /// installed.
    pub fn new() -> Option<Self> {
        let available = Command::new("git")
            .arg("--version")
            .output()
            .map(|o| o.status.success())
            .unwrap_or(false);
        if !available {
            eprintln!("git is not available, skipping test");
            return None;
        }

        let fixture = Self {
            temp_dir: assert_fs::TempDir::new().unwrap(),
            commits: std::cell::Cell::new(0),
        };
        fixture.git(&["init", "-q"]);
        fixture.git(&["symbolic-ref", "HEAD", "refs/heads/main"]);
        fixture.git(&["config", "user.name", "Docs Test"]);
        fixture.git(&["config", "user.email", "docs@example.com"]);
        fixture.git(&["config", "commit.gpgsign", "false"]);
        fixture.git(&["config", "tag.gpgsign", "false"]);
        Some(fixture)
    }

    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    pub fn docs(&self) -> PathBuf {
        self.path().join("docs")
    }

    /// Run git in the repository, panicking on failure.
    pub fn git(&self, args: &[&str]) -> String {
        let date = format!("2024-01-{:02}T12:00:00+00:00", self.commits.get() + 1);
        let output = Command::new("git")
            .args(args)
            .current_dir(self.path())
            .env("GIT_AUTHOR_DATE", &date)
            .env("GIT_COMMITTER_DATE", &date)
            .output()
            .unwrap();
        assert!(
            output.status.success(),
            "git {:?} failed: {}",
            args,
            String::from_utf8_lossy(&output.stderr)
        );
        String::from_utf8_lossy(&output.stdout).trim().to_string()
    }

    pub fn write(&self, path: &str, content: &str) -> &Self {
        self.temp_dir.child(path).write_str(content).unwrap();
        self
    }

    pub fn remove(&self, path: &str) -> &Self {
        self.git(&["rm", "-q", path]);
        self
    }

    pub fn commit(&self, message: &str) -> &Self {
        self.git(&["add", "-A"]);
        self.git(&["commit", "-q", "-m", message]);
        self.commits.set(self.commits.get() + 1);
        self
    }

    pub fn tag(&self, name: &str) -> &Self {
        self.git(&["tag", name]);
        self
    }

    pub fn checkout(&self, name: &str) -> &Self {
        self.git(&["checkout", "-q", name]);
        self
    }

    /// Commit `docs/` with the given configuration and page content.
    pub fn commit_docs(&self, config: &str, page: &str, message: &str) -> &Self {
        self.write("docs/multiversion.yaml", config)
            .write("docs/index.txt", page)
            .commit(message)
    }

    /// Add `source` as a submodule at `path`, checked out at its `HEAD`.
    pub fn add_submodule(&self, source: &GitFixture, path: &str) -> &Self {
        let url = source.path().to_string_lossy().into_owned();
        self.git(&[
            "-c",
            "protocol.file.allow=always",
            "submodule",
            "--quiet",
            "add",
            &url,
            path,
        ]);
        self
    }

    /// Check out `commit` in the submodule at `path`; the next commit pins it.
    pub fn pin_submodule(&self, path: &str, commit: &str) -> &Self {
        self.git(&["-C", path, "checkout", "-q", commit]);
        self
    }

    pub fn head(&self) -> String {
        self.git(&["rev-parse", "HEAD"])
    }
}
