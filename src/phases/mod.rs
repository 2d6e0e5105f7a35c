//! Implementation of the phases of a multi-version documentation run.
//!
//! ## Overview
//!
//! A run follows these phases:
//! 1. Discovery - List every branch, tag and remote-tracking branch
//! 2. Filtering - Keep the refs selected by the configuration
//! 3. Planning - Derive labels and output directories, rejecting collisions
//! 4. Building - For each ref: materialize a worktree, build its
//!    configuration overlay, run the documentation builder, release the
//!    worktree
//! 5. Aggregation - Sort successful builds into the version catalog
//!
//! Phases 1-3 are global: any error aborts the run before a single build
//! starts. Errors in phase 4 stay local to their ref.

use std::collections::BTreeMap;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::refs::Ref;

// Phase modules
pub mod aggregate;
pub mod build;
pub mod discovery;
pub mod filter;
pub mod materialize;
pub mod orchestrator;
pub mod overlay;

/// States of a run, recorded in the order they were entered
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum RunState {
    Idle,
    Discovering,
    Filtering,
    Planning,
    Building { name: String },
    Aggregating,
    Done { status: aggregate::RunStatus },
}

/// Locations shared by every build of a run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunLayout {
    /// Documentation source directory relative to the repository root;
    /// the same relative path is used inside every worktree.
    pub source_path: PathBuf,
    /// Root of the combined output; each ref gets a subdirectory.
    pub output_root: PathBuf,
}

impl RunLayout {
    pub fn new(source_path: impl Into<PathBuf>, output_root: impl Into<PathBuf>) -> Self {
        Self {
            source_path: source_path.into(),
            output_root: output_root.into(),
        }
    }

    /// Path of the version catalog written at the end of the run.
    pub fn catalog_path(&self) -> PathBuf {
        self.output_root.join(crate::defaults::CATALOG_FILE_NAME)
    }

    /// Source path in `/`-separated form, as recorded in the catalog.
    pub fn source_label(&self) -> String {
        let label = self
            .source_path
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect::<Vec<_>>()
            .join("/");
        if label.is_empty() {
            ".".to_string()
        } else {
            label
        }
    }
}

/// Resolved configuration for one ref's build
///
/// Built fresh for every ref and never shared, so concurrent builds cannot
/// observe each other's settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BuildContext {
    pub reference: Ref,
    /// Root of the materialized worktree.
    pub worktree_root: PathBuf,
    /// Documentation sources inside the worktree.
    pub source_dir: PathBuf,
    /// Where the builder writes this ref's pages.
    pub output_dir: PathBuf,
    /// `output_dir` relative to the output root.
    pub output_subdir: String,
    pub version: String,
    pub release: String,
    pub is_released: bool,
    pub is_latest: bool,
    pub project: Option<String>,
    /// Global options overridden by the ref's own options.
    pub options: BTreeMap<String, String>,
    pub catalog_path: PathBuf,
}

impl BuildContext {
    /// Options passed to the builder: the merged options plus the computed
    /// labels, which always win.
    pub fn overlay(&self) -> BTreeMap<String, String> {
        let mut overlay = self.options.clone();
        if let Some(project) = &self.project {
            overlay.insert("project".to_string(), project.clone());
        }
        overlay.insert("version".to_string(), self.version.clone());
        overlay.insert("release".to_string(), self.release.clone());
        overlay
    }
}

/// Outcome of one ref's build
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BuildResult {
    pub reference: Ref,
    pub success: bool,
    /// Human readable diagnostic for failed builds.
    pub error: Option<String>,
    pub output_dir: PathBuf,
    pub output_subdir: String,
    pub version: String,
    pub release: String,
    pub is_released: bool,
    pub build_date: DateTime<Utc>,
    pub duration_ms: u64,
}

impl BuildResult {
    pub fn name(&self) -> &str {
        &self.reference.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::refs::RefKind;

    #[test]
    fn test_catalog_path_in_output_root() {
        let layout = RunLayout::new("docs", "/tmp/site");
        assert_eq!(layout.catalog_path(), PathBuf::from("/tmp/site/versions.json"));
    }

    #[test]
    fn test_source_label() {
        assert_eq!(RunLayout::new("docs/source", "out").source_label(), "docs/source");
        assert_eq!(RunLayout::new("", "out").source_label(), ".");
    }

    #[test]
    fn test_overlay_labels_win_over_options() {
        let mut options = BTreeMap::new();
        options.insert("version".to_string(), "stale".to_string());
        options.insert("html_theme".to_string(), "alabaster".to_string());

        let context = BuildContext {
            reference: Ref::new("v1.0", RefKind::Tag, "abc"),
            worktree_root: PathBuf::from("/tmp/wt"),
            source_dir: PathBuf::from("/tmp/wt/docs"),
            output_dir: PathBuf::from("/tmp/site/v1.0"),
            output_subdir: "v1.0".to_string(),
            version: "1.0".to_string(),
            release: "1.0.0".to_string(),
            is_released: true,
            is_latest: false,
            project: Some("Example".to_string()),
            options,
            catalog_path: PathBuf::from("/tmp/site/versions.json"),
        };

        let overlay = context.overlay();
        assert_eq!(overlay["version"], "1.0");
        assert_eq!(overlay["release"], "1.0.0");
        assert_eq!(overlay["project"], "Example");
        assert_eq!(overlay["html_theme"], "alabaster");
    }
}
