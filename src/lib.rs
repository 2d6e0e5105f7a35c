//! # docs-multiversion
//!
//! This library builds a multi-version documentation site from a git
//! repository: it discovers branches and tags, builds the documentation of
//! each selected ref in an isolated snapshot of its tree, and records the
//! built versions in a catalog that templates use for cross-version
//! navigation. It is designed to be used by the `docs-multiversion`
//! command-line tool but works with any [`phases::build::DocBuilder`].
//!
//! ## Quick Example
//!
//! ```
//! use docs_multiversion::config;
//! use docs_multiversion::phases::filter::{filter, FilterPolicy};
//! use docs_multiversion::refs::{Ref, RefKind, SubmodulePointers};
//!
//! let config = config::parse("refs:\n  exclude: [main]\n  require_config: false\n").unwrap();
//! let policy = FilterPolicy::from_config(&config).unwrap();
//!
//! let refs = vec![
//!     Ref::new("main", RefKind::Branch, "a1b2c3d"),
//!     Ref::new("v1.0", RefKind::Tag, "e4f5a6b"),
//! ];
//! let selected = filter(&refs, &policy, &SubmodulePointers::new());
//! assert_eq!(selected.len(), 1);
//! assert_eq!(selected[0].name, "v1.0");
//! ```
//!
//! ## Core Concepts
//!
//! - **Configuration (`config`)**: The `multiversion.yaml` schema: ref
//!   selection, label rules, output layout, catalog ordering and the
//!   external builder.
//! - **Refs (`refs`)**: Immutable descriptions of discovered branches and
//!   tags, including their submodule pointers.
//! - **Version control (`repository`, `git`)**: The [`repository::Vcs`]
//!   trait and its implementation on top of the `git` command. All reads use
//!   git objects; the working tree is never modified.
//! - **Phases (`phases`)**: Discovery, filtering, planning, materialization,
//!   configuration overlays, building and aggregation.
//! - **Ordering (`version`)**: Date, name and semantic-version ordering of
//!   the catalog.
//!
//! ## Execution Flow
//!
//! The main entry point is [`phases::orchestrator::Orchestrator`]:
//!
//! 1.  **Discovery**: List branches, tags and remote-tracking branches.
//! 2.  **Filtering**: Apply patterns, de-duplicate names, check submodule
//!     affinity.
//! 3.  **Planning**: Derive labels and output directories; reject
//!     collisions.
//! 4.  **Building**: Per ref, snapshot its tree into a temporary directory,
//!     merge its configuration over the global one and run the builder.
//! 5.  **Aggregation**: Sort the successful builds into `versions.json`.

pub mod config;
pub mod defaults;
pub mod error;
pub mod git;
pub mod output;
pub mod phases;
pub mod refs;
pub mod repository;
pub mod version;
