//! Phase 4a: Worktree materialization
//!
//! Every build gets a private, temporary copy of its ref's tree. The copy is
//! written from git objects, so the caller's checkout is never touched, and
//! each call uses a fresh directory, so sequential or concurrent builds never
//! share a staging path.
//!
//! A [`Worktree`] is a guard: the directory is removed by
//! [`Worktree::release`] or, failing an explicit call, when the guard is
//! dropped. Both paths remove it at most once.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tempfile::TempDir;
use walkdir::WalkDir;

use crate::defaults;
use crate::error::{Error, Result};
use crate::refs::Ref;
use crate::repository::Vcs;

/// Counters of worktree acquisitions and releases
#[derive(Debug, Default)]
pub struct MaterializeStats {
    acquired: AtomicUsize,
    released: AtomicUsize,
}

impl MaterializeStats {
    pub fn acquired(&self) -> usize {
        self.acquired.load(Ordering::SeqCst)
    }

    pub fn released(&self) -> usize {
        self.released.load(Ordering::SeqCst)
    }

    /// Worktrees currently on disk.
    pub fn live(&self) -> usize {
        self.acquired() - self.released()
    }
}

/// Temporary snapshot of one ref's tree
#[derive(Debug)]
pub struct Worktree {
    dir: Option<TempDir>,
    root: PathBuf,
    reference: Ref,
    stats: Arc<MaterializeStats>,
}

impl Worktree {
    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn reference(&self) -> &Ref {
        &self.reference
    }

    pub fn is_released(&self) -> bool {
        self.dir.is_none()
    }

    /// Remove the worktree from disk.
    ///
    /// Releasing an already released worktree is a no-op.
    pub fn release(&mut self) -> Result<()> {
        let Some(dir) = self.dir.take() else {
            return Ok(());
        };
        self.stats.released.fetch_add(1, Ordering::SeqCst);
        log::debug!(
            "Releasing worktree {} for '{}'",
            self.root.display(),
            self.reference.name
        );
        unseal(dir.path());
        dir.close().map_err(|e| Error::Materialize {
            ref_name: self.reference.name.clone(),
            message: format!("failed to remove {}: {}", self.root.display(), e),
        })
    }
}

impl Drop for Worktree {
    fn drop(&mut self) {
        if let Err(e) = self.release() {
            log::warn!("{}", e);
        }
    }
}

/// Creates worktrees under a parent directory
pub struct Materializer {
    vcs: Arc<dyn Vcs>,
    parent: PathBuf,
    stats: Arc<MaterializeStats>,
}

impl Materializer {
    pub fn new(vcs: Arc<dyn Vcs>) -> Self {
        Self::with_parent(vcs, defaults::worktree_root())
    }

    pub fn with_parent(vcs: Arc<dyn Vcs>, parent: impl Into<PathBuf>) -> Self {
        Self {
            vcs,
            parent: parent.into(),
            stats: Arc::new(MaterializeStats::default()),
        }
    }

    pub fn stats(&self) -> Arc<MaterializeStats> {
        Arc::clone(&self.stats)
    }

    /// Write `reference`'s tree into a fresh temporary directory.
    ///
    /// On failure the partially written directory is removed before the
    /// error is returned.
    pub fn materialize(&self, reference: &Ref) -> Result<Worktree> {
        let failed = |message: String| Error::Materialize {
            ref_name: reference.name.clone(),
            message,
        };

        fs::create_dir_all(&self.parent).map_err(|e| {
            failed(format!("cannot create {}: {}", self.parent.display(), e))
        })?;
        let dir = tempfile::Builder::new()
            .prefix(defaults::WORKTREE_PREFIX)
            .tempdir_in(&self.parent)
            .map_err(|e| failed(format!("cannot create temporary directory: {}", e)))?;

        self.stats.acquired.fetch_add(1, Ordering::SeqCst);
        let mut worktree = Worktree {
            root: dir.path().to_path_buf(),
            dir: Some(dir),
            reference: reference.clone(),
            stats: Arc::clone(&self.stats),
        };
        log::debug!(
            "Materializing '{}' ({}) into {}",
            reference.name,
            reference.short_commit(),
            worktree.root.display()
        );

        let populated = self
            .vcs
            .export_tree(reference, &worktree.root)
            .and_then(|()| seal(&worktree.root));
        if let Err(e) = populated {
            if let Err(cleanup) = worktree.release() {
                log::warn!("{}", cleanup);
            }
            return Err(match e {
                Error::Materialize { .. } => e,
                other => failed(other.to_string()),
            });
        }

        Ok(worktree)
    }
}

/// Mark every regular file read-only.
fn seal(root: &Path) -> Result<()> {
    for entry in WalkDir::new(root) {
        let entry = entry.map_err(|e| Error::Io(e.into()))?;
        if entry.file_type().is_file() {
            let mut permissions = entry.metadata().map_err(|e| Error::Io(e.into()))?.permissions();
            permissions.set_readonly(true);
            fs::set_permissions(entry.path(), permissions)?;
        }
    }
    Ok(())
}

/// Restore write access so the tree can be removed on every platform.
fn unseal(root: &Path) {
    for entry in WalkDir::new(root).into_iter().filter_map(|e| e.ok()) {
        if entry.file_type().is_file() {
            if let Ok(metadata) = entry.metadata() {
                let mut permissions = metadata.permissions();
                #[allow(clippy::permissions_set_readonly_false)]
                permissions.set_readonly(false);
                let _ = fs::set_permissions(entry.path(), permissions);
            }
        }
    }
}
