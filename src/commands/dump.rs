//! `--dump-metadata` implementation
//!
//! Prints the version catalog the run would produce, as JSON on stdout.
//! Labels come from each ref's configuration file read straight from git;
//! nothing is materialized or built.

use std::process::ExitCode;

use anyhow::Result;

use super::Session;

pub fn execute(session: &Session) -> Result<ExitCode> {
    let catalog = session.orchestrator().dump_metadata()?;
    println!("{}", catalog.to_json()?);
    Ok(ExitCode::SUCCESS)
}
