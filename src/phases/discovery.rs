//! Phase 1: Discovery
//!
//! Drains the adapter's lazy ref listing into a vector. Any error is fatal:
//! when one ref cannot be resolved, none of the listing can be trusted.

use crate::error::Result;
use crate::refs::Ref;
use crate::repository::Vcs;

/// Executes Phase 1 of the pipeline.
pub fn execute(vcs: &dyn Vcs) -> Result<Vec<Ref>> {
    let mut refs = Vec::new();
    for reference in vcs.refs()? {
        let reference = reference?;
        log::debug!(
            "Discovered {} '{}' at {}",
            reference.kind,
            reference.refname,
            reference.short_commit()
        );
        refs.push(reference);
    }
    log::info!("Discovered {} refs", refs.len());
    Ok(refs)
}
