//! # docs-multiversion CLI
//!
//! This is the binary entry point for the `docs-multiversion` command-line
//! tool.
//!
//! Its primary responsibilities are:
//! - Parsing command-line arguments using `clap`.
//! - Setting up logging and terminal output.
//! - Translating the outcome of a run into the process exit code.
//!
//! The core logic lives in the `docs_multiversion` library crate; the binary
//! is a thin wrapper around it.

mod cli;
mod commands;

use std::process::ExitCode;

use anyhow::Result;
use clap::Parser;

fn main() -> Result<ExitCode> {
    let cli = cli::Cli::parse();
    cli.execute()
}
