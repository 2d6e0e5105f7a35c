//! Phase 5: Aggregation
//!
//! Successful builds become entries of the [`VersionCatalog`], the structure
//! templates use to render cross-version navigation. Failed builds are left
//! out of the catalog and reported through the [`RunReport`] instead.

use std::fs;
use std::path::Path;

use chrono::{DateTime, FixedOffset, Utc};
use serde::{Deserialize, Serialize};

use crate::config::SortPolicy;
use crate::error::Result;
use crate::phases::{BuildResult, RunState};
use crate::refs::RefKind;
use crate::version;

/// One built version, as exposed to templates
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub name: String,
    pub kind: RefKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote: Option<String>,
    pub version: String,
    pub release: String,
    pub is_released: bool,
    pub is_latest: bool,
    pub commit: String,
    /// Creator date of the ref.
    pub date: DateTime<FixedOffset>,
    pub build_date: DateTime<Utc>,
    /// Documentation source path inside the repository.
    pub source: String,
    /// Output subdirectory relative to the output root.
    pub output_dir: String,
}

/// Ordered set of built versions
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionCatalog {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project: Option<String>,
    pub versions: Vec<CatalogEntry>,
}

impl VersionCatalog {
    /// Build the catalog from the successful entries of `results`.
    ///
    /// Entries are ordered by `sort`. The entry named `latest` is flagged as
    /// the latest version; when `latest` is unset or was not built, the first
    /// entry is.
    pub fn from_results(
        results: &[BuildResult],
        sort: SortPolicy,
        latest: Option<&str>,
        source: &str,
        project: Option<String>,
    ) -> Self {
        let mut succeeded: Vec<&BuildResult> = results.iter().filter(|r| r.success).collect();
        version::sort_by_policy(&mut succeeded, sort, |r| &r.reference);

        let latest_index = latest
            .and_then(|name| succeeded.iter().position(|r| r.name() == name))
            .or(if succeeded.is_empty() { None } else { Some(0) });

        let versions = succeeded
            .iter()
            .enumerate()
            .map(|(index, result)| CatalogEntry {
                name: result.reference.name.clone(),
                kind: result.reference.kind,
                remote: result.reference.remote.clone(),
                version: result.version.clone(),
                release: result.release.clone(),
                is_released: result.is_released,
                is_latest: Some(index) == latest_index,
                commit: result.reference.commit.clone(),
                date: result.reference.date,
                build_date: result.build_date,
                source: source.to_string(),
                output_dir: result.output_subdir.clone(),
            })
            .collect();

        Self { project, versions }
    }

    pub fn len(&self) -> usize {
        self.versions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.versions.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&CatalogEntry> {
        self.versions.iter().find(|e| e.name == name)
    }

    pub fn names(&self) -> Vec<&str> {
        self.versions.iter().map(|e| e.name.as_str()).collect()
    }

    pub fn latest(&self) -> Option<&CatalogEntry> {
        self.versions.iter().find(|e| e.is_latest)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Write the catalog as pretty-printed JSON, creating parent directories.
    pub fn write_json(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut json = self.to_json()?;
        json.push('\n');
        fs::write(path, json)?;
        log::debug!("Wrote {} versions to {}", self.len(), path.display());
        Ok(())
    }
}

/// Overall outcome of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// Every selected ref built, or no ref was selected.
    Success,
    /// Some refs built and some failed.
    PartialFailure,
    /// Refs were selected and none built.
    Failure,
}

impl RunStatus {
    pub fn from_counts(succeeded: usize, total: usize) -> Self {
        if succeeded == total {
            RunStatus::Success
        } else if succeeded == 0 {
            RunStatus::Failure
        } else {
            RunStatus::PartialFailure
        }
    }

    /// Process exit code; partial failures only fail in strict mode.
    pub fn exit_code(&self, strict: bool) -> u8 {
        match self {
            RunStatus::Success => 0,
            RunStatus::PartialFailure if strict => 1,
            RunStatus::PartialFailure => 0,
            RunStatus::Failure => 1,
        }
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            RunStatus::Success => "success",
            RunStatus::PartialFailure => "partial failure",
            RunStatus::Failure => "failure",
        };
        f.write_str(s)
    }
}

/// Everything a run produced
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub status: RunStatus,
    pub catalog: VersionCatalog,
    /// One result per selected ref, in plan order.
    pub results: Vec<BuildResult>,
    pub transitions: Vec<RunState>,
}

impl RunReport {
    pub fn failures(&self) -> impl Iterator<Item = &BuildResult> {
        self.results.iter().filter(|r| !r.success)
    }

    pub fn successes(&self) -> impl Iterator<Item = &BuildResult> {
        self.results.iter().filter(|r| r.success)
    }

    pub fn exit_code(&self, strict: bool) -> u8 {
        self.status.exit_code(strict)
    }
}
