//! CLI argument parsing and command dispatch

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::Parser;
use log::LevelFilter;

use crate::commands;

/// Build the documentation of every selected branch and tag of a git
/// repository into one multi-version site
#[derive(Parser, Debug)]
#[command(name = "docs-multiversion")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Documentation source directory inside a git repository
    #[arg(value_name = "SOURCE_DIR")]
    pub source_dir: PathBuf,

    /// Output directory; every version is built into a subdirectory
    #[arg(value_name = "OUTPUT_DIR")]
    pub output_dir: PathBuf,

    /// Path to the configuration file [default: SOURCE_DIR/multiversion.yaml]
    #[arg(short, long, value_name = "PATH", env = "DOCS_MULTIVERSION_CONFIG")]
    pub config: Option<PathBuf>,

    /// Exit with an error when any version fails to build
    #[arg(long)]
    pub strict: bool,

    /// Number of versions built concurrently
    #[arg(short, long, value_name = "N", value_parser = parse_jobs)]
    pub jobs: Option<usize>,

    /// Print the version catalog as JSON without building anything
    #[arg(long)]
    pub dump_metadata: bool,

    /// Enable debug logging
    #[arg(short, long)]
    pub debug: bool,

    /// Suppress all output except errors
    #[arg(short, long)]
    pub quiet: bool,

    /// Colorize output (always, never, auto)
    #[arg(long, value_name = "WHEN", default_value = "auto")]
    pub color: String,

    /// Set log level (error, warn, info, debug, trace)
    #[arg(long, value_name = "LEVEL", default_value = "info")]
    pub log_level: String,
}

fn parse_jobs(value: &str) -> std::result::Result<usize, String> {
    match value.parse::<usize>() {
        Ok(0) => Err("must be at least 1".to_string()),
        Ok(jobs) => Ok(jobs),
        Err(e) => Err(e.to_string()),
    }
}

/// Initialize `env_logger` at `level`. `RUST_LOG` takes precedence.
///
/// Without `RUST_LOG` the logger itself accepts debug records and `level` is
/// applied as the global maximum, so [`raise_to_debug`] can still enable them
/// once the configuration file has been read.
fn init_logging(level: LevelFilter) {
    if std::env::var_os("RUST_LOG").is_some() {
        let _ = env_logger::Builder::from_default_env()
            .format_timestamp(None)
            .format_target(false)
            .try_init();
        return;
    }

    let initialized = env_logger::Builder::new()
        .filter_level(level.max(LevelFilter::Debug))
        .format_timestamp(None)
        .format_target(false)
        .try_init();
    if initialized.is_ok() {
        log::set_max_level(level);
    }
}

/// Enable debug records requested by `debug: true` in the configuration.
fn raise_to_debug() {
    if std::env::var_os("RUST_LOG").is_none() && log::max_level() < LevelFilter::Debug {
        log::set_max_level(LevelFilter::Debug);
    }
}

impl Cli {
    fn level_filter(&self) -> Result<LevelFilter> {
        if self.debug {
            return Ok(LevelFilter::Debug);
        }
        self.log_level
            .parse::<LevelFilter>()
            .map_err(|_| anyhow::anyhow!("Invalid log level '{}'", self.log_level))
    }

    /// Execute the CLI command
    pub fn execute(self) -> Result<ExitCode> {
        init_logging(self.level_filter()?);

        let session = commands::Session::prepare(&self)?;
        if session.config.debug {
            raise_to_debug();
        }

        if self.dump_metadata {
            commands::dump::execute(&session)
        } else {
            commands::build::execute(&session, self.quiet)
        }
    }
}
