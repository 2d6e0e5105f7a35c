//! # CLI Command Implementations
//!
//! The tool has two modes, each in its own file:
//! - `build`: the full run, with a progress bar and a summary.
//! - `dump`: discovery, filtering and planning only; prints the catalog the
//!   run would produce.
//!
//! Both start from a [`Session`]: the loaded configuration with CLI
//! overrides applied, the repository and the run layout.

pub mod build;
pub mod dump;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};

use docs_multiversion::config::{self, Config};
use docs_multiversion::defaults;
use docs_multiversion::output::OutputConfig;
use docs_multiversion::phases::build::CommandBuilder;
use docs_multiversion::phases::orchestrator::Orchestrator;
use docs_multiversion::phases::RunLayout;
use docs_multiversion::repository::GitRepository;

use crate::cli::Cli;

/// Everything a command needs, resolved from the CLI arguments
pub struct Session {
    pub config: Config,
    pub repository: Arc<GitRepository>,
    pub layout: RunLayout,
    pub output: OutputConfig,
}

impl Session {
    pub fn prepare(cli: &Cli) -> Result<Self> {
        let (config_path, explicit) = match &cli.config {
            Some(path) => (path.clone(), true),
            None => (cli.source_dir.join(defaults::CONFIG_FILE_NAME), false),
        };

        let mut config = if explicit {
            config::from_file(&config_path)?
        } else {
            config::from_file_or_default(&config_path)?
        };
        if cli.strict {
            config.strict = true;
        }
        if let Some(jobs) = cli.jobs {
            config.jobs = jobs;
        }
        if cli.debug {
            config.debug = true;
        }

        // Each ref's own copy of the file sits next to its documentation
        // sources, under the same file name as the global one.
        let config_file = ref_config_file_name(&config_path);
        let (repository, source_path) = GitRepository::discover(&cli.source_dir, &config_file)?;

        let output_root = std::path::absolute(&cli.output_dir).with_context(|| {
            format!("Invalid output directory '{}'", cli.output_dir.display())
        })?;

        Ok(Self {
            config,
            repository: Arc::new(repository),
            layout: RunLayout::new(source_path, output_root),
            output: OutputConfig::from_env_and_flag(&cli.color),
        })
    }

    pub fn orchestrator(&self) -> Orchestrator {
        Orchestrator::new(
            self.repository.clone(),
            Arc::new(CommandBuilder::new(self.config.builder.clone())),
            self.config.clone(),
            self.layout.clone(),
        )
    }
}

fn ref_config_file_name(config_path: &Path) -> String {
    config_path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| defaults::CONFIG_FILE_NAME.to_string())
}

/// Output directory of a result, relative to the current directory when
/// possible.
pub fn display_path(path: &Path) -> PathBuf {
    std::env::current_dir()
        .ok()
        .and_then(|cwd| path.strip_prefix(cwd).ok().map(Path::to_path_buf))
        .unwrap_or_else(|| path.to_path_buf())
}
