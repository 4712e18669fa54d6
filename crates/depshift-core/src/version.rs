//! Semantic-version distance and upgrade-target extraction.
//!
//! Both functions are deliberately forgiving: audit data is loose text, so a
//! version that does not parse degrades to the least disruptive answer rather
//! than an error.

use std::sync::OnceLock;

use regex::Regex;
use semver::Version;

use crate::domain::ChangeClass;

fn triplet_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\d+\.\d+\.\d+").expect("static version pattern is valid"))
}

/// Parse a version, tolerating surrounding whitespace and a leading `v` or `=`.
pub fn parse_loose(raw: &str) -> Option<Version> {
    let trimmed = raw.trim().trim_start_matches('=').trim_start_matches('v').trim();
    Version::parse(trimmed).ok()
}

/// First concrete version named in a declared range (`^4.17.19` gives
/// `4.17.19`).
pub fn first_concrete(range: &str) -> Option<Version> {
    triplet_regex()
        .find(range)
        .and_then(|m| Version::parse(m.as_str()).ok())
}

/// Semantic distance between `from` and `to`.
///
/// Pre-release distances fold into their stable counterpart (a pre-major is a
/// major). Unparseable input yields [`ChangeClass::Patch`].
pub fn classify_distance(from: &str, to: &str) -> ChangeClass {
    match (parse_loose(from), parse_loose(to)) {
        (Some(a), Some(b)) => classify_versions(&a, &b),
        _ => ChangeClass::Patch,
    }
}

pub fn classify_versions(from: &Version, to: &Version) -> ChangeClass {
    if from.major != to.major {
        ChangeClass::Major
    } else if from.minor != to.minor {
        ChangeClass::Minor
    } else {
        ChangeClass::Patch
    }
}

/// Next patch release. A pre-release bumps to its own release
/// (`1.2.3-rc.1` becomes `1.2.3`). `None` when the patch number is
/// already at its maximum.
pub fn bump_patch(version: &Version) -> Option<Version> {
    if version.pre.is_empty() {
        let patch = version.patch.checked_add(1)?;
        Some(Version::new(version.major, version.minor, patch))
    } else {
        Some(Version::new(version.major, version.minor, version.patch))
    }
}

/// Target chosen by [`resolve_target_detailed`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetResolution {
    pub version: Version,
    /// True when the patched range did not supply the target and the
    /// installed version was patch-bumped instead.
    pub fallback: bool,
}

/// Highest concrete version named in `patched_range`, never at or below
/// `current_version`.
pub fn resolve_target(patched_range: &str, current_version: &str) -> Option<Version> {
    resolve_target_detailed(patched_range, current_version).map(|r| r.version)
}

pub fn resolve_target_detailed(
    patched_range: &str,
    current_version: &str,
) -> Option<TargetResolution> {
    let current = parse_loose(current_version);
    let fallback = || {
        current.as_ref().and_then(bump_patch).map(|version| TargetResolution {
            version,
            fallback: true,
        })
    };

    let highest = triplet_regex()
        .find_iter(patched_range)
        .filter_map(|m| Version::parse(m.as_str()).ok())
        .max();

    let Some(highest) = highest else {
        return fallback();
    };

    match &current {
        Some(c) if highest <= *c => fallback(),
        _ => Some(TargetResolution {
            version: highest,
            fallback: false,
        }),
    }
}
