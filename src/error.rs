//! # Error Handling
//!
//! This module defines the centralized error type for `docs-multiversion`.
//! It uses `thiserror` to build a single `Error` enum whose variants follow
//! the run's failure taxonomy:
//!
//! - **`Vcs`**: git could not answer a query (corrupt repository, a ref that
//!   no longer resolves, missing submodule metadata). Fatal to discovery.
//! - **`Config`**: malformed configuration or colliding output directories.
//!   Fatal, raised before any build starts.
//! - **`Materialize`**: a ref's tree could not be written to its temporary
//!   worktree. Contained to that ref.
//! - **`Build`**: the external documentation builder failed for one ref.
//!   Contained to that ref.
//!
//! The remaining variants wrap errors from the libraries we lean on (I/O,
//! YAML, JSON, glob, regex) so that `?` works everywhere.

use thiserror::Error;

/// Main error type for docs-multiversion operations
#[derive(Error, Debug)]
pub enum Error {
    /// A git command failed or produced output we could not interpret.
    #[error("Git command failed: {command} - {message}")]
    Vcs { command: String, message: String },

    /// The configuration is malformed or inconsistent.
    ///
    /// Includes an optional hint about how to fix it.
    #[error("Configuration error: {message}{}", hint.as_ref().map(|h| format!("\n  hint: {}", h)).unwrap_or_default())]
    Config {
        message: String,
        /// Optional hint for how to fix the configuration issue
        hint: Option<String>,
    },

    /// A ref's tree could not be materialized into a worktree.
    #[error("Failed to materialize '{ref_name}': {message}")]
    Materialize { ref_name: String, message: String },

    /// The external documentation builder failed for a ref.
    #[error("Build failed for '{ref_name}': {message}")]
    Build { ref_name: String, message: String },

    /// An I/O error, wrapped from `std::io::Error`.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A YAML parsing error, wrapped from `serde_yaml::Error`.
    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// A JSON serialization error, wrapped from `serde_json::Error`.
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    /// A regular expression error, wrapped from `regex::Error`.
    #[error("Regex error: {0}")]
    Regex(#[from] regex::Error),

    /// A glob pattern error, wrapped from `glob::PatternError`.
    #[error("Glob pattern error: {0}")]
    Glob(#[from] glob::PatternError),

    /// An error indicating that a mutex or other lock has been poisoned.
    #[error("Lock poisoned: {context}")]
    LockPoisoned { context: String },
}

impl Error {
    /// Shorthand for a `Config` error without a hint.
    pub fn config(message: impl Into<String>) -> Self {
        Error::Config {
            message: message.into(),
            hint: None,
        }
    }

    /// Shorthand for a `Config` error carrying a hint.
    pub fn config_with_hint(message: impl Into<String>, hint: impl Into<String>) -> Self {
        Error::Config {
            message: message.into(),
            hint: Some(hint.into()),
        }
    }
}

/// A convenient type alias for `Result<T, Error>`.
pub type Result<T> = std::result::Result<T, Error>;
