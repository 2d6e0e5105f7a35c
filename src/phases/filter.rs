//! Phase 2: Filtering
//!
//! Selects the refs to build. The filter is a pure function of the
//! discovered refs, the policy and the current checkout's submodule
//! pointers; it preserves the relative order of its input and is
//! idempotent.
//!
//! ## Steps
//!
//! 1.  **Kind**: branches and tags are toggled independently; remote-tracking
//!     branches additionally need their remote to match `refs.remotes`.
//! 2.  **Include**: the name must match at least one include glob.
//! 3.  **Exclude**: a name matching any exclude glob is dropped, even if it
//!     was included.
//! 4.  **Configuration**: refs without their own configuration file are
//!     dropped unless `refs.require_config` is off.
//! 5.  **De-duplication**: a local branch and a remote-tracking branch with the
//!     same name are reduced to one, the local one unless
//!     `refs.prefer_remote` is set.
//! 6.  **Submodule affinity**: with affinity enabled, refs whose submodule
//!     pointers disagree with the current checkout are dropped.

use std::collections::HashMap;

use glob::Pattern;

use crate::config::{AffinityMode, Config};
use crate::error::Result;
use crate::refs::{Ref, SubmodulePointers};
use crate::repository::submodules_match;

/// Compiled ref selection rules
#[derive(Debug, Clone)]
pub struct FilterPolicy {
    pub include: Vec<Pattern>,
    pub exclude: Vec<Pattern>,
    pub remotes: Vec<Pattern>,
    pub branches: bool,
    pub tags: bool,
    pub prefer_remote: bool,
    pub require_config: bool,
    pub affinity: AffinityMode,
    pub primary_submodule: Option<String>,
}

impl FilterPolicy {
    pub fn from_config(config: &Config) -> Result<Self> {
        Ok(Self {
            include: compile(&config.refs.include)?,
            exclude: compile(&config.refs.exclude)?,
            remotes: compile(&config.refs.remotes)?,
            branches: config.refs.branches,
            tags: config.refs.tags,
            prefer_remote: config.refs.prefer_remote,
            require_config: config.refs.require_config,
            affinity: config.submodules.affinity,
            primary_submodule: config.submodules.path.clone(),
        })
    }

    /// Whether submodule pointers of the current checkout are needed.
    pub fn needs_current_pointers(&self) -> bool {
        self.affinity != AffinityMode::Off
    }

    fn skip_reason(&self, reference: &Ref) -> Option<String> {
        use crate::refs::RefKind;

        match (&reference.remote, reference.kind) {
            (_, RefKind::Tag) if !self.tags => {
                return Some("tags are disabled".to_string());
            }
            (None, RefKind::Branch) if !self.branches => {
                return Some("branches are disabled".to_string());
            }
            (Some(remote), RefKind::Branch) => {
                if !self.branches {
                    return Some("branches are disabled".to_string());
                }
                if !self.remotes.iter().any(|p| p.matches(remote)) {
                    return Some(format!("remote '{}' is not whitelisted", remote));
                }
            }
            _ => {}
        }

        if !self.include.iter().any(|p| p.matches(&reference.name)) {
            return Some("it matches no include pattern".to_string());
        }

        if let Some(pattern) = self.exclude.iter().find(|p| p.matches(&reference.name)) {
            return Some(format!("it matches exclude pattern '{}'", pattern));
        }

        if self.require_config && reference.config_path.is_none() {
            return Some("it has no configuration file".to_string());
        }

        None
    }
}

impl Default for FilterPolicy {
    fn default() -> Self {
        Self {
            include: vec![Pattern::new("*").expect("'*' is a valid glob")],
            exclude: Vec::new(),
            remotes: Vec::new(),
            branches: true,
            tags: true,
            prefer_remote: false,
            require_config: true,
            affinity: AffinityMode::Off,
            primary_submodule: None,
        }
    }
}

fn compile(patterns: &[String]) -> Result<Vec<Pattern>> {
    patterns
        .iter()
        .map(|p| Pattern::new(p).map_err(Into::into))
        .collect()
}

/// Executes Phase 2 of the pipeline.
///
/// An empty result is not an error.
pub fn filter(refs: &[Ref], policy: &FilterPolicy, current: &SubmodulePointers) -> Vec<Ref> {
    let candidates: Vec<&Ref> = refs
        .iter()
        .filter(|reference| match policy.skip_reason(reference) {
            Some(reason) => {
                log::debug!("Skipping '{}' because {}", reference.refname, reason);
                false
            }
            None => true,
        })
        .collect();

    let winners = dedup_winners(&candidates, policy.prefer_remote);

    candidates
        .into_iter()
        .enumerate()
        .filter(|(index, reference)| {
            if winners.get(reference.name.as_str()) != Some(index) {
                log::debug!(
                    "Skipping '{}' because another ref is named '{}'",
                    reference.refname,
                    reference.name
                );
                return false;
            }
            if !submodules_match(
                &reference.submodules,
                current,
                policy.affinity,
                policy.primary_submodule.as_deref(),
            ) {
                log::debug!(
                    "Skipping '{}' because its submodule pointers differ from the current checkout",
                    reference.refname
                );
                return false;
            }
            true
        })
        .map(|(_, reference)| reference.clone())
        .collect()
}

/// Index of the ref kept for every name.
///
/// The first local ref wins, or the first remote one with `prefer_remote`;
/// when no ref of the preferred side exists the first ref of the name wins.
fn dedup_winners<'a>(candidates: &[&'a Ref], prefer_remote: bool) -> HashMap<&'a str, usize> {
    let mut winners: HashMap<&str, usize> = HashMap::new();
    for (index, &reference) in candidates.iter().enumerate() {
        let preferred = reference.is_remote() == prefer_remote;
        match winners.get(reference.name.as_str()) {
            None => {
                winners.insert(reference.name.as_str(), index);
            }
            Some(&current) => {
                let current_preferred = candidates[current].is_remote() == prefer_remote;
                if preferred && !current_preferred {
                    winners.insert(reference.name.as_str(), index);
                }
            }
        }
    }
    winners
}
