//! # Version Ordering
//!
//! The version catalog is ordered by one of three policies (see
//! [`SortPolicy`]). This module holds the comparison logic shared by the
//! planner, which needs the head of the order to pick the latest version,
//! and the aggregator, which sorts the successful builds.
//!
//! ## Semantic versions
//!
//! Ref names are parsed leniently: a leading `v` is ignored and missing
//! minor or patch components are padded with zeros, so `v1.2` compares as
//! `1.2.0`. Names that still fail to parse sort after every semantic
//! version, in lexical order.

use std::cmp::Ordering;

use semver::Version;

use crate::config::SortPolicy;
use crate::refs::Ref;

/// Parse a ref name as a semantic version.
///
/// # Examples
///
/// ```
/// use docs_multiversion::version::parse_version;
///
/// assert_eq!(parse_version("v1.2").unwrap().to_string(), "1.2.0");
/// assert_eq!(parse_version("2.0.1-rc.1").unwrap().to_string(), "2.0.1-rc.1");
/// assert!(parse_version("main").is_none());
/// ```
pub fn parse_version(name: &str) -> Option<Version> {
    let name = name.strip_prefix("refs/tags/").unwrap_or(name);
    let bare = name
        .strip_prefix('v')
        .or_else(|| name.strip_prefix('V'))
        .unwrap_or(name);

    if let Ok(version) = Version::parse(bare) {
        return Some(version);
    }

    // Pad `1` and `1.2` to three components, keeping any pre-release or
    // build suffix in place.
    let split = bare.find(['-', '+']).unwrap_or(bare.len());
    let (core, suffix) = bare.split_at(split);
    let components = core.split('.').count();
    if core.is_empty() || components >= 3 {
        return None;
    }
    let padding = ".0".repeat(3 - components);
    Version::parse(&format!("{}{}{}", core, padding, suffix)).ok()
}

/// Order two semantic-version names: highest first, unparsable last.
fn compare_semver(a: &str, b: &str) -> Ordering {
    match (parse_version(a), parse_version(b)) {
        (Some(va), Some(vb)) => vb.cmp(&va).then_with(|| a.cmp(b)),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => a.cmp(b),
    }
}

/// Compare two refs under `policy`.
///
/// Every policy is total: ties fall back to the ref name.
pub fn compare(policy: SortPolicy, a: &Ref, b: &Ref) -> Ordering {
    match policy {
        SortPolicy::Date => b.date.cmp(&a.date).then_with(|| a.name.cmp(&b.name)),
        SortPolicy::Name => a.name.cmp(&b.name),
        SortPolicy::Semver => compare_semver(&a.name, &b.name),
    }
}

/// Sort `items` in place by the ref each one carries.
pub fn sort_by_policy<T>(items: &mut [T], policy: SortPolicy, reference: impl Fn(&T) -> &Ref) {
    items.sort_by(|a, b| compare(policy, reference(a), reference(b)));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::refs::RefKind;
    use chrono::DateTime;

    fn names(refs: &[Ref]) -> Vec<&str> {
        refs.iter().map(|r| r.name.as_str()).collect()
    }

    fn dated(name: &str, date: &str) -> Ref {
        Ref::new(name, RefKind::Tag, "abc").with_date(DateTime::parse_from_rfc3339(date).unwrap())
    }

    #[test]
    fn test_parse_version() {
        assert_eq!(parse_version("v1.2.3"), Some(Version::new(1, 2, 3)));
        assert_eq!(parse_version("1.2.3"), Some(Version::new(1, 2, 3)));
        assert_eq!(parse_version("refs/tags/v1.2.3"), Some(Version::new(1, 2, 3)));
        assert_eq!(parse_version("v1.2"), Some(Version::new(1, 2, 0)));
        assert_eq!(parse_version("v2"), Some(Version::new(2, 0, 0)));
        assert_eq!(parse_version("main"), None);
        assert_eq!(parse_version("v"), None);
        assert_eq!(parse_version("1.2.3.4"), None);
    }

    #[test]
    fn test_parse_version_padded_prerelease() {
        let version = parse_version("v1.2-beta.1").unwrap();
        assert_eq!(version.to_string(), "1.2.0-beta.1");
        assert!(version < Version::new(1, 2, 0));
    }

    #[test]
    fn test_sort_semver_descending_non_semver_last() {
        let mut refs: Vec<Ref> = ["v1.10", "main", "v1.2.0", "develop", "v2.0.0-rc.1", "v2.0"]
            .iter()
            .map(|n| Ref::new(*n, RefKind::Tag, "abc"))
            .collect();
        sort_by_policy(&mut refs, SortPolicy::Semver, |r| r);
        assert_eq!(
            names(&refs),
            vec!["v2.0", "v2.0.0-rc.1", "v1.10", "v1.2.0", "develop", "main"]
        );
    }

    #[test]
    fn test_sort_date_newest_first_ties_by_name() {
        let mut refs = vec![
            dated("b", "2024-01-01T00:00:00+00:00"),
            dated("old", "2020-01-01T00:00:00+00:00"),
            dated("a", "2024-01-01T00:00:00+00:00"),
            dated("new", "2025-06-01T12:00:00+02:00"),
        ];
        sort_by_policy(&mut refs, SortPolicy::Date, |r| r);
        assert_eq!(names(&refs), vec!["new", "a", "b", "old"]);
    }

    #[test]
    fn test_sort_date_compares_instants_across_offsets() {
        // 10:00+02:00 is earlier than 09:00+00:00
        let mut refs = vec![
            dated("east", "2024-01-01T10:00:00+02:00"),
            dated("utc", "2024-01-01T09:00:00+00:00"),
        ];
        sort_by_policy(&mut refs, SortPolicy::Date, |r| r);
        assert_eq!(names(&refs), vec!["utc", "east"]);
    }

    #[test]
    fn test_sort_name_lexical() {
        let mut refs: Vec<Ref> = ["v2.0", "main", "v10.0"]
            .iter()
            .map(|n| Ref::new(*n, RefKind::Branch, "abc"))
            .collect();
        sort_by_policy(&mut refs, SortPolicy::Name, |r| r);
        assert_eq!(names(&refs), vec!["main", "v10.0", "v2.0"]);
    }
}
