//! # Version-Control Adapter
//!
//! This module provides the [`Vcs`] trait, the single seam through which the
//! rest of the crate talks to version control, and [`GitRepository`], its
//! implementation on top of the system `git` command.
//!
//! ## Design
//!
//! Keeping git behind a trait separates the orchestration logic from process
//! spawning. Tests substitute an in-memory implementation to simulate
//! repositories with arbitrary refs, submodule states and failures without
//! creating real repositories.
//!
//! All reads go against historical tree objects. Nothing here checks out a
//! ref, touches the index or modifies the caller's working tree.

use std::path::{Path, PathBuf};

use crate::config::AffinityMode;
use crate::error::{Error, Result};
use crate::git;
use crate::refs::{Ref, SubmodulePointers};

/// Lazy sequence of discovered refs.
pub type RefIter<'a> = Box<dyn Iterator<Item = Result<Ref>> + 'a>;

/// Version-control queries needed by a run
pub trait Vcs: Send + Sync {
    /// Enumerate branches, tags and remote-tracking branches.
    ///
    /// Each ref is resolved (submodule pointers, configuration file presence)
    /// only when the iterator reaches it. The iterator is finite and must not
    /// be reused after the repository changes.
    fn refs(&self) -> Result<RefIter<'_>>;

    /// Read `path` at `reference` without checking it out.
    ///
    /// Returns `Ok(None)` when the path does not exist at that ref.
    fn read_file(&self, reference: &Ref, path: &str) -> Result<Option<Vec<u8>>>;

    /// Submodule pointers recorded at `rev` (a commit id or refname).
    fn submodule_pointers(&self, rev: &str) -> Result<SubmodulePointers>;

    /// Submodule pointers of the current checkout.
    fn current_submodule_pointers(&self) -> Result<SubmodulePointers> {
        self.submodule_pointers("HEAD")
    }

    /// Write the tree of `reference` into `dest`, including submodule
    /// contents at their pinned commits.
    fn export_tree(&self, reference: &Ref, dest: &Path) -> Result<()>;
}

/// Compare two submodule pointer maps under the given affinity mode.
///
/// With [`AffinityMode::All`] at least one path must be shared and every
/// shared path must pin the same commit: a ref sharing no submodule with the
/// current checkout never matches vacuously. With [`AffinityMode::Primary`]
/// only `primary` is compared and it must be present on both sides.
pub fn submodules_match(
    candidate: &SubmodulePointers,
    current: &SubmodulePointers,
    mode: AffinityMode,
    primary: Option<&str>,
) -> bool {
    match mode {
        AffinityMode::Off => true,
        AffinityMode::All => {
            let mut shared = candidate
                .iter()
                .filter_map(|(path, commit)| current.get(path).map(|other| commit == other))
                .peekable();
            shared.peek().is_some() && shared.all(|equal| equal)
        }
        AffinityMode::Primary => match primary {
            Some(path) => match (candidate.get(path), current.get(path)) {
                (Some(a), Some(b)) => a == b,
                _ => false,
            },
            None => false,
        },
    }
}

/// [`Vcs`] implementation backed by the system `git` command
#[derive(Debug, Clone)]
pub struct GitRepository {
    root: PathBuf,
    config_path: String,
}

impl GitRepository {
    /// Open the repository at `root`.
    ///
    /// `config_path` is the repository-relative path of the configuration
    /// file whose presence is recorded on every discovered ref.
    pub fn new(root: impl Into<PathBuf>, config_path: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            config_path: config_path.into(),
        }
    }

    /// Open the repository containing `source_dir`.
    ///
    /// Returns the repository together with `source_dir` relative to its
    /// root, which is also where each ref's copy of the documentation lives.
    pub fn discover(source_dir: &Path, config_file: &str) -> Result<(Self, PathBuf)> {
        let source_dir = source_dir.canonicalize().map_err(|e| {
            Error::config(format!(
                "Source directory '{}' is not accessible: {}",
                source_dir.display(),
                e
            ))
        })?;
        let root = git::toplevel(&source_dir)?;
        let root = root.canonicalize().unwrap_or(root);
        let relative = source_dir
            .strip_prefix(&root)
            .map(Path::to_path_buf)
            .map_err(|_| Error::Vcs {
                command: "git rev-parse --show-toplevel".to_string(),
                message: format!(
                    "{} is not inside repository {}",
                    source_dir.display(),
                    root.display()
                ),
            })?;

        let config_path = git_path(&relative.join(config_file));
        Ok((Self::new(root, config_path), relative))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn config_path(&self) -> &str {
        &self.config_path
    }

    fn resolve(&self, reference: Ref) -> Result<Ref> {
        let entries = git::ls_tree(&self.root, &reference.commit, None)?;
        let submodules = git::submodule_pointers(&entries, &reference.refname)?;
        let has_config = match self.locate(&reference.commit, &submodules, &self.config_path) {
            Some((root, _, path)) if root == self.root => entries.iter().any(|e| e.path == path),
            Some((root, pinned, path)) => git::path_exists(&root, pinned, path),
            None => false,
        };

        let mut resolved = Ref {
            submodules,
            ..reference
        };
        if has_config {
            resolved.config_path = Some(self.config_path.clone());
        }
        Ok(resolved)
    }

    /// Where `path` of the tree at `commit` is stored: the repository that
    /// owns it, the commit to read it at and the path inside that repository.
    ///
    /// A path below a submodule lives in the submodule's own repository at
    /// the commit the tree pins. Returns `None` when that submodule is not
    /// initialized in the working tree.
    fn locate<'a>(
        &'a self,
        commit: &'a str,
        submodules: &'a SubmodulePointers,
        path: &'a str,
    ) -> Option<(PathBuf, &'a str, &'a str)> {
        let owner = submodules.iter().find_map(|(gitlink, pinned)| {
            path.strip_prefix(gitlink.as_str())
                .and_then(|rest| rest.strip_prefix('/'))
                .map(|rest| (gitlink, pinned, rest))
        });
        let Some((gitlink, pinned, rest)) = owner else {
            return Some((self.root.clone(), commit, path));
        };

        let root = self.root.join(gitlink);
        if git::is_repository_root(&root) {
            Some((root, pinned.as_str(), rest))
        } else {
            log::debug!(
                "Cannot read {} at {}: submodule '{}' is not initialized",
                path,
                commit,
                gitlink
            );
            None
        }
    }
}

/// Repository-relative path with `/` separators.
fn git_path(path: &Path) -> String {
    path.components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

impl Vcs for GitRepository {
    fn refs(&self) -> Result<RefIter<'_>> {
        let listing = git::for_each_ref(&self.root)?;
        let lines: Vec<String> = listing.lines().map(str::to_string).collect();

        Ok(Box::new(lines.into_iter().filter_map(move |line| {
            match git::parse_ref_line(&line) {
                Some(reference) => Some(self.resolve(reference)),
                None => {
                    log::debug!("Skipping '{}' because it is not a branch or tag", line);
                    None
                }
            }
        })))
    }

    fn read_file(&self, reference: &Ref, path: &str) -> Result<Option<Vec<u8>>> {
        match self.locate(&reference.commit, &reference.submodules, path) {
            Some((root, rev, path)) => git::show_file(&root, rev, path),
            None => Ok(None),
        }
    }

    fn submodule_pointers(&self, rev: &str) -> Result<SubmodulePointers> {
        let entries = git::ls_tree(&self.root, rev, None)?;
        git::submodule_pointers(&entries, rev)
    }

    fn export_tree(&self, reference: &Ref, dest: &Path) -> Result<()> {
        git::export_tree(&self.root, &reference.commit, dest)
    }
}
