//! Phase 3 and 4b: Planning and configuration overlays
//!
//! Planning runs once, before any build: it derives each ref's labels and
//! output subdirectory and rejects configurations under which two refs would
//! write to the same directory.
//!
//! The overlay is built per ref, after its worktree exists: the ref's own
//! copy of the configuration file is read from the worktree and merged over
//! the global configuration. The ref's values win key by key; anything the
//! ref does not define falls back to the global value.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::sync::OnceLock;

use regex::Regex;

use crate::config::{self, option_string, Config, RefConfig};
use crate::error::{Error, Result};
use crate::phases::materialize::Worktree;
use crate::phases::{BuildContext, RunLayout};
use crate::refs::Ref;
use crate::version;

/// A ref selected for building, with everything derivable before checkout
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedRef {
    pub reference: Ref,
    pub output_subdir: String,
    /// Version label derived from the ref name.
    pub version: String,
    /// Release label derived from the ref name.
    pub release: String,
    pub is_released: bool,
    /// Head of the catalog order, or the ref named by `latest`.
    pub is_latest: bool,
}

fn placeholder_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| Regex::new(r"\{([A-Za-z_]+)\}").expect("placeholder regex is valid"))
}

/// Replace every character that is unsafe in a directory name with `-`.
///
/// # Examples
///
/// ```
/// use docs_multiversion::phases::overlay::sanitize;
///
/// assert_eq!(sanitize("feature/new docs"), "feature-new-docs");
/// assert_eq!(sanitize("v1.0+build"), "v1.0+build");
/// ```
pub fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '+' | '-') {
                c
            } else {
                '-'
            }
        })
        .collect()
}

/// Expand `format` for `reference` and sanitize the result.
pub fn output_subdir(reference: &Ref, format: &str) -> Result<String> {
    config::check_dir_format(format)?;

    let expanded = placeholder_regex().replace_all(format, |captures: &regex::Captures| {
        match &captures[1] {
            "name" => reference.name.clone(),
            "kind" => reference.kind.to_string(),
            "remote" => reference.remote.clone().unwrap_or_default(),
            "commit" => reference.commit.clone(),
            "short_commit" => reference.short_commit().to_string(),
            _ => String::new(),
        }
    });

    let subdir = sanitize(&expanded);
    if subdir.is_empty() || subdir.chars().all(|c| c == '.') {
        return Err(Error::config(format!(
            "output.dir_format '{}' gives the unusable directory name '{}' for '{}'",
            format, subdir, reference.name
        )));
    }
    Ok(subdir)
}

/// Plan the build of every filtered ref.
///
/// Fails with a configuration error when two distinct refs map to the same
/// output subdirectory.
pub fn plan(refs: Vec<Ref>, config: &Config) -> Result<Vec<PlannedRef>> {
    let released = config
        .refs
        .released
        .iter()
        .map(|p| glob::Pattern::new(p))
        .collect::<std::result::Result<Vec<_>, _>>()?;

    let mut taken: HashMap<String, String> = HashMap::new();
    let mut planned = Vec::with_capacity(refs.len());

    for reference in refs {
        let output_subdir = output_subdir(&reference, &config.output.dir_format)?;
        if let Some(other) = taken.get(&output_subdir) {
            if *other != reference.name {
                return Err(Error::config_with_hint(
                    format!(
                        "Refs '{}' and '{}' both map to output directory '{}'",
                        other, reference.name, output_subdir
                    ),
                    "Add {kind} or {short_commit} to output.dir_format, or exclude one of the refs",
                ));
            }
        }
        taken.insert(output_subdir.clone(), reference.name.clone());

        let version = config.version.apply(&reference.name)?;
        let release = match &config.release {
            Some(rule) => rule.apply(&reference.name)?,
            None => version.clone(),
        };
        let short_refname = reference.short_refname();
        let is_released = released.iter().any(|p| p.matches(&short_refname));

        planned.push(PlannedRef {
            reference,
            output_subdir,
            version,
            release,
            is_released,
            is_latest: false,
        });
    }

    let latest = match &config.latest {
        Some(name) => {
            let found = planned.iter().position(|p| p.reference.name == *name);
            if found.is_none() && !planned.is_empty() {
                log::warn!("Latest version '{}' is not among the selected refs", name);
            }
            found
        }
        None => (0..planned.len()).min_by(|&a, &b| {
            version::compare(config.sort, &planned[a].reference, &planned[b].reference)
        }),
    };
    if let Some(index) = latest {
        planned[index].is_latest = true;
    }

    Ok(planned)
}

/// Read the ref's configuration file from its worktree.
pub fn load_ref_config(worktree: &Worktree) -> Result<RefConfig> {
    let Some(relative) = &worktree.reference().config_path else {
        return Ok(RefConfig::default());
    };
    let path = worktree.root().join(relative);
    let content = fs::read(&path).map_err(|e| {
        Error::config(format!(
            "Cannot read {} of '{}': {}",
            relative,
            worktree.reference().name,
            e
        ))
    })?;
    RefConfig::parse(&content).map_err(|e| {
        Error::config(format!(
            "Invalid {} in '{}': {}",
            relative,
            worktree.reference().name,
            e
        ))
    })
}

/// Labels and options after merging a ref's configuration over the plan
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedLabels {
    pub version: String,
    pub release: String,
    pub project: Option<String>,
    pub options: BTreeMap<String, String>,
}

/// Merge `ref_config` over the global configuration for `planned`.
///
/// Explicit labels in the ref's file win over derived ones. Without an
/// explicit release the release rule applies, or the final version label
/// when there is no rule.
pub fn resolve_labels(planned: &PlannedRef, ref_config: &RefConfig, config: &Config) -> ResolvedLabels {
    let version = ref_config
        .version
        .clone()
        .unwrap_or_else(|| planned.version.clone());
    let release = ref_config.release.clone().unwrap_or_else(|| {
        if config.release.is_some() {
            planned.release.clone()
        } else {
            version.clone()
        }
    });

    let mut options: BTreeMap<String, String> = config
        .options
        .iter()
        .map(|(k, v)| (k.clone(), option_string(v)))
        .collect();
    for (key, value) in &ref_config.options {
        options.insert(key.clone(), option_string(value));
    }

    ResolvedLabels {
        version,
        release,
        project: ref_config.project.clone().or_else(|| config.project.clone()),
        options,
    }
}

/// Build the overlay for one materialized ref.
pub fn build_context(
    planned: &PlannedRef,
    worktree: &Worktree,
    config: &Config,
    layout: &RunLayout,
) -> Result<BuildContext> {
    let ref_config = load_ref_config(worktree)?;
    let labels = resolve_labels(planned, &ref_config, config);

    Ok(BuildContext {
        reference: planned.reference.clone(),
        worktree_root: worktree.root().to_path_buf(),
        source_dir: worktree.root().join(&layout.source_path),
        output_dir: layout.output_root.join(&planned.output_subdir),
        output_subdir: planned.output_subdir.clone(),
        version: labels.version,
        release: labels.release,
        is_released: planned.is_released,
        is_latest: planned.is_latest,
        project: labels.project,
        options: labels.options,
        catalog_path: layout.catalog_path(),
    })
}
