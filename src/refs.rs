//! Version-control references as seen by a run.
//!
//! A [`Ref`] is created once during discovery and never mutated afterwards;
//! every later stage only reads it.

use std::collections::BTreeMap;

use chrono::{DateTime, FixedOffset, Utc};
use serde::{Deserialize, Serialize};

/// Submodule path to pinned commit id.
pub type SubmodulePointers = BTreeMap<String, String>;

/// Kind of a ref
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RefKind {
    Branch,
    Tag,
}

impl RefKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RefKind::Branch => "branch",
            RefKind::Tag => "tag",
        }
    }
}

impl std::fmt::Display for RefKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A named version-control reference (branch or tag)
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Ref {
    /// Short name, e.g. `main`, `v1.0` or `feature/x`.
    pub name: String,
    pub kind: RefKind,
    /// Remote name for remote-tracking branches.
    pub remote: Option<String>,
    /// Full refname, e.g. `refs/remotes/origin/main`.
    pub refname: String,
    /// Commit the ref points to (annotated tags are peeled).
    pub commit: String,
    /// Creator date: commit date for branches, tagger date for annotated tags.
    pub date: DateTime<FixedOffset>,
    /// Repository-relative path of the configuration file, if the ref has one.
    pub config_path: Option<String>,
    /// Submodule pointers recorded in the ref's tree.
    pub submodules: SubmodulePointers,
}

impl Ref {
    /// Create a ref with no submodules and no configuration file.
    ///
    /// The refname is derived from the kind and name.
    pub fn new(name: impl Into<String>, kind: RefKind, commit: impl Into<String>) -> Self {
        let name = name.into();
        let refname = match kind {
            RefKind::Branch => format!("refs/heads/{}", name),
            RefKind::Tag => format!("refs/tags/{}", name),
        };
        Self {
            name,
            kind,
            remote: None,
            refname,
            commit: commit.into(),
            date: DateTime::<Utc>::UNIX_EPOCH.fixed_offset(),
            config_path: None,
            submodules: SubmodulePointers::new(),
        }
    }

    pub fn with_remote(mut self, remote: impl Into<String>) -> Self {
        let remote = remote.into();
        self.refname = format!("refs/remotes/{}/{}", remote, self.name);
        self.kind = RefKind::Branch;
        self.remote = Some(remote);
        self
    }

    pub fn with_date(mut self, date: DateTime<FixedOffset>) -> Self {
        self.date = date;
        self
    }

    pub fn with_config_path(mut self, path: impl Into<String>) -> Self {
        self.config_path = Some(path.into());
        self
    }

    pub fn with_submodule(mut self, path: impl Into<String>, commit: impl Into<String>) -> Self {
        self.submodules.insert(path.into(), commit.into());
        self
    }

    pub fn is_remote(&self) -> bool {
        self.remote.is_some()
    }

    /// Namespace the ref lives in: `heads`, `tags` or `remotes/<remote>`.
    pub fn source(&self) -> String {
        match (&self.remote, self.kind) {
            (Some(remote), _) => format!("remotes/{}", remote),
            (None, RefKind::Branch) => "heads".to_string(),
            (None, RefKind::Tag) => "tags".to_string(),
        }
    }

    /// Refname without the leading `refs/`, e.g. `tags/v1.0`.
    pub fn short_refname(&self) -> String {
        format!("{}/{}", self.source(), self.name)
    }

    /// First seven characters of the commit id.
    pub fn short_commit(&self) -> &str {
        let end = self
            .commit
            .char_indices()
            .nth(7)
            .map(|(i, _)| i)
            .unwrap_or(self.commit.len());
        &self.commit[..end]
    }
}
