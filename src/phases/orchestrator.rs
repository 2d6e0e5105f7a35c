//! Orchestrator for a complete multi-version run
//!
//! This module coordinates all phases:
//! 1. Discover refs through the [`Vcs`] adapter
//! 2. Filter them with the configured [`FilterPolicy`]
//! 3. Plan labels and output directories (collisions abort here)
//! 4. For each planned ref: materialize, overlay, build, release
//! 5. Aggregate the results and write the version catalog
//!
//! Phases 1-3 return errors to the caller. From phase 4 on, failures are
//! recorded per ref and the run always reaches phase 5.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use chrono::Utc;
use rayon::prelude::*;

use super::aggregate::{RunReport, RunStatus, VersionCatalog};
use super::build::{BuildDriver, DocBuilder};
use super::filter::{self, FilterPolicy};
use super::materialize::{MaterializeStats, Materializer};
use super::overlay::{self, PlannedRef};
use super::{discovery, BuildResult, RunLayout, RunState};
use crate::config::{Config, RefConfig};
use crate::error::{Error, Result};
use crate::refs::SubmodulePointers;
use crate::repository::Vcs;

/// Progress hooks, called from build threads
pub trait RunObserver: Send + Sync {
    fn on_plan(&self, _planned: &[PlannedRef]) {}
    fn on_build_started(&self, _planned: &PlannedRef) {}
    fn on_build_finished(&self, _result: &BuildResult) {}
}

/// Observer that ignores every event
#[derive(Debug, Default)]
pub struct NoopObserver;

impl RunObserver for NoopObserver {}

/// Drives one run from discovery to the version catalog
pub struct Orchestrator {
    vcs: Arc<dyn Vcs>,
    driver: BuildDriver,
    config: Config,
    layout: RunLayout,
    materializer: Materializer,
    observer: Arc<dyn RunObserver>,
    cancel: Arc<AtomicBool>,
    transitions: Mutex<Vec<RunState>>,
}

impl Orchestrator {
    pub fn new(
        vcs: Arc<dyn Vcs>,
        builder: Arc<dyn DocBuilder>,
        config: Config,
        layout: RunLayout,
    ) -> Self {
        Self {
            materializer: Materializer::new(Arc::clone(&vcs)),
            vcs,
            driver: BuildDriver::new(builder),
            config,
            layout,
            observer: Arc::new(NoopObserver),
            cancel: Arc::new(AtomicBool::new(false)),
            transitions: Mutex::new(vec![RunState::Idle]),
        }
    }

    pub fn with_observer(mut self, observer: Arc<dyn RunObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Create worktrees under `root` instead of the system temporary
    /// directory.
    pub fn with_worktree_root(mut self, root: impl Into<std::path::PathBuf>) -> Self {
        self.materializer = Materializer::with_parent(Arc::clone(&self.vcs), root);
        self
    }

    /// Flag that stops the run from starting further builds once set.
    pub fn cancel_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    pub fn materialize_stats(&self) -> Arc<MaterializeStats> {
        self.materializer.stats()
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// States entered so far, in order.
    pub fn transitions(&self) -> Result<Vec<RunState>> {
        self.transitions
            .lock()
            .map(|t| t.clone())
            .map_err(|_| Error::LockPoisoned {
                context: "run state transitions".to_string(),
            })
    }

    fn enter(&self, state: RunState) {
        log::debug!("Run state: {:?}", state);
        match self.transitions.lock() {
            Ok(mut transitions) => transitions.push(state),
            Err(_) => log::warn!("Cannot record run state {:?}: lock poisoned", state),
        }
    }

    /// Execute phases 1-3.
    pub fn plan(&self) -> Result<Vec<PlannedRef>> {
        self.enter(RunState::Discovering);
        let refs = discovery::execute(self.vcs.as_ref())?;

        self.enter(RunState::Filtering);
        let policy = FilterPolicy::from_config(&self.config)?;
        let current = if policy.needs_current_pointers() {
            self.vcs.current_submodule_pointers()?
        } else {
            SubmodulePointers::new()
        };
        let selected = filter::filter(&refs, &policy, &current);
        log::info!("Selected {} of {} refs", selected.len(), refs.len());

        self.enter(RunState::Planning);
        overlay::plan(selected, &self.config)
    }

    /// Catalog of the planned refs, with labels resolved from each ref's
    /// configuration file, without building anything.
    pub fn dump_metadata(&self) -> Result<VersionCatalog> {
        let planned = self.plan()?;
        let now = Utc::now();

        let mut results = Vec::with_capacity(planned.len());
        for p in &planned {
            let ref_config = self.stored_ref_config(p);
            let labels = overlay::resolve_labels(p, &ref_config, &self.config);
            results.push(BuildResult {
                reference: p.reference.clone(),
                success: true,
                error: None,
                output_dir: self.layout.output_root.join(&p.output_subdir),
                output_subdir: p.output_subdir.clone(),
                version: labels.version,
                release: labels.release,
                is_released: p.is_released,
                build_date: now,
                duration_ms: 0,
            });
        }

        Ok(VersionCatalog::from_results(
            &results,
            self.config.sort,
            self.config.latest.as_deref(),
            &self.layout.source_label(),
            self.config.project.clone(),
        ))
    }

    /// The ref's own configuration file, read from the repository.
    ///
    /// A file that cannot be read or parsed only affects this ref: its
    /// labels fall back to the ones derived from the ref name.
    fn stored_ref_config(&self, planned: &PlannedRef) -> RefConfig {
        let Some(path) = &planned.reference.config_path else {
            return RefConfig::default();
        };
        let loaded = self
            .vcs
            .read_file(&planned.reference, path)
            .and_then(|content| content.map(|c| RefConfig::parse(&c)).transpose());
        match loaded {
            Ok(ref_config) => ref_config.unwrap_or_default(),
            Err(e) => {
                log::warn!(
                    "Ignoring configuration of '{}': {}",
                    planned.reference.name,
                    e
                );
                RefConfig::default()
            }
        }
    }

    /// Execute the whole run.
    ///
    /// Returns an error only when discovery, filtering or planning fails;
    /// per-ref failures are part of the report.
    pub fn run(&self) -> Result<RunReport> {
        let planned = self.plan()?;
        self.observer.on_plan(&planned);
        if planned.is_empty() {
            log::info!("No refs selected, nothing to build");
        }

        let results: Vec<BuildResult> = if self.config.jobs <= 1 {
            planned.iter().map(|p| self.build_one(p)).collect()
        } else {
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(self.config.jobs)
                .thread_name(|i| format!("docs-build-{}", i))
                .build()
                .map_err(|e| {
                    Error::config(format!(
                        "cannot start {} build threads: {}",
                        self.config.jobs, e
                    ))
                })?;
            pool.install(|| planned.par_iter().map(|p| self.build_one(p)).collect())
        };

        self.enter(RunState::Aggregating);
        let succeeded = results.iter().filter(|r| r.success).count();
        let status = RunStatus::from_counts(succeeded, results.len());
        let catalog = VersionCatalog::from_results(
            &results,
            self.config.sort,
            self.config.latest.as_deref(),
            &self.layout.source_label(),
            self.config.project.clone(),
        );
        if !catalog.is_empty() {
            catalog.write_json(&self.layout.catalog_path())?;
        }

        self.enter(RunState::Done { status });
        log::info!(
            "Run finished with {}: {} built, {} failed",
            status,
            succeeded,
            results.len() - succeeded
        );

        Ok(RunReport {
            status,
            catalog,
            results,
            transitions: self.transitions()?,
        })
    }

    /// Materialize, overlay and build one ref. Never fails.
    fn build_one(&self, planned: &PlannedRef) -> BuildResult {
        let started = Instant::now();
        let output_dir = self.layout.output_root.join(&planned.output_subdir);

        if self.cancel.load(Ordering::SeqCst) {
            log::warn!("Skipping '{}': run cancelled", planned.reference.name);
            let result = BuildResult::failed(planned, output_dir, "cancelled", started);
            self.observer.on_build_finished(&result);
            return result;
        }

        self.enter(RunState::Building {
            name: planned.reference.name.clone(),
        });
        self.observer.on_build_started(planned);

        let result = match self.materializer.materialize(&planned.reference) {
            Ok(mut worktree) => {
                let result =
                    match overlay::build_context(planned, &worktree, &self.config, &self.layout) {
                        Ok(context) => self.driver.run(&context),
                        Err(e) => {
                            log::warn!("{}", e);
                            BuildResult::failed(planned, output_dir, e.to_string(), started)
                        }
                    };
                if let Err(e) = worktree.release() {
                    log::warn!("{}", e);
                }
                result
            }
            Err(e) => {
                log::warn!("{}", e);
                BuildResult::failed(planned, output_dir, e.to_string(), started)
            }
        };

        self.observer.on_build_finished(&result);
        result
    }
}
