//! Upgrade planning: audit snapshot + risk strategy to an ordered proposal set.
//!
//! Security fixes are always proposed; the strategy only bounds
//! staleness-driven upgrades. A security fix that jumps further than the
//! strategy allows is still proposed but flagged with
//! [`Caution::ExceedsStrategy`].

use std::collections::{HashMap, HashSet};

use chrono::Utc;
use semver::Version;
use tracing::debug;
use uuid::Uuid;

use crate::domain::{
    AuditSnapshot, Caution, OutdatedPackage, ProposalSet, ProposalSource, Result, RiskStrategy,
    Severity, SkipReason, SkippedPackage, UpgradeProposal, Vulnerability,
};
use crate::metrics::METRICS;
use crate::obs::emit_plan_completed;
use crate::version::{classify_distance, parse_loose, resolve_target_detailed};

/// Security proposal under construction; several advisories may merge into one.
struct SecurityDraft {
    package: String,
    from_version: String,
    target: Version,
    fallback: bool,
    fix_ids: Vec<String>,
    severity: Severity,
}

/// Plan upgrades for `snapshot` under `strategy`.
///
/// Pure apart from id generation: two calls on the same input yield the same
/// `(package, from, to, class)` tuples in the same order.
pub fn plan(snapshot: &AuditSnapshot, strategy: RiskStrategy) -> ProposalSet {
    let mut skipped = Vec::new();

    let drafts = collect_security_drafts(&snapshot.vulnerabilities, &mut skipped);
    let covered: HashSet<String> = drafts.iter().map(|d| d.package.clone()).collect();

    let mut proposals: Vec<UpgradeProposal> = drafts
        .into_iter()
        .map(|draft| security_proposal(draft, strategy))
        .collect();

    let mut staleness_seen = HashSet::new();
    for pkg in &snapshot.outdated_packages {
        if covered.contains(&pkg.name) || !staleness_seen.insert(pkg.name.clone()) {
            continue;
        }
        match staleness_proposal(pkg, strategy) {
            Ok(proposal) => proposals.push(proposal),
            Err(reason) => skipped.push(SkippedPackage {
                package: pkg.name.clone(),
                reason,
            }),
        }
    }

    // Advisories that resolved nothing are moot once another advisory for
    // the same package produced a proposal.
    skipped.retain(|s| !covered.contains(&s.package) || !is_security_skip(&s.reason));

    proposals.sort_by_key(|p| !p.is_security_fix());

    let set = ProposalSet {
        strategy,
        proposals,
        skipped,
        planned_at: Utc::now(),
    };

    METRICS.inc_proposals_planned(set.len() as u64);
    emit_plan_completed(
        strategy.as_str(),
        set.len(),
        set.security_count(),
        set.skipped.len(),
    );
    set
}

/// Parse a snapshot document and plan it. A malformed snapshot is an error,
/// never an empty plan.
pub fn plan_json(snapshot_json: &str, strategy: RiskStrategy) -> Result<ProposalSet> {
    let snapshot = AuditSnapshot::from_json(snapshot_json)?;
    Ok(plan(&snapshot, strategy))
}

fn is_security_skip(reason: &SkipReason) -> bool {
    matches!(
        reason,
        SkipReason::UnresolvableTarget { .. } | SkipReason::NoOp
    )
}

fn collect_security_drafts(
    vulnerabilities: &[Vulnerability],
    skipped: &mut Vec<SkippedPackage>,
) -> Vec<SecurityDraft> {
    let mut drafts: Vec<SecurityDraft> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();

    for vuln in vulnerabilities {
        let range = vuln.patched_versions_range.as_deref().unwrap_or("");
        let Some(resolution) = resolve_target_detailed(range, &vuln.current_version) else {
            debug!(
                package = %vuln.package,
                advisory = %vuln.id,
                "no upgrade target resolvable for advisory"
            );
            skipped.push(SkippedPackage {
                package: vuln.package.clone(),
                reason: SkipReason::UnresolvableTarget {
                    advisory_id: vuln.id.clone(),
                },
            });
            continue;
        };

        if is_noop(&vuln.current_version, &resolution.version) {
            skipped.push(SkippedPackage {
                package: vuln.package.clone(),
                reason: SkipReason::NoOp,
            });
            continue;
        }

        match index.get(&vuln.package) {
            Some(&i) => {
                let draft = &mut drafts[i];
                if !draft.fix_ids.contains(&vuln.id) {
                    draft.fix_ids.push(vuln.id.clone());
                }
                if resolution.version > draft.target {
                    draft.target = resolution.version;
                    draft.fallback = resolution.fallback;
                }
                draft.severity = draft.severity.max(vuln.severity);
            }
            None => {
                index.insert(vuln.package.clone(), drafts.len());
                drafts.push(SecurityDraft {
                    package: vuln.package.clone(),
                    from_version: vuln.current_version.clone(),
                    target: resolution.version,
                    fallback: resolution.fallback,
                    fix_ids: vec![vuln.id.clone()],
                    severity: vuln.severity,
                });
            }
        }
    }

    drafts
}

fn is_noop(current: &str, target: &Version) -> bool {
    match parse_loose(current) {
        Some(c) => c == *target,
        None => current.trim() == target.to_string(),
    }
}

fn security_proposal(draft: SecurityDraft, strategy: RiskStrategy) -> UpgradeProposal {
    let to_version = draft.target.to_string();
    let change_class = classify_distance(&draft.from_version, &to_version);

    let mut cautions = Vec::new();
    if draft.fallback {
        cautions.push(Caution::FallbackTarget);
    }
    if !strategy.allows(change_class) {
        cautions.push(Caution::ExceedsStrategy {
            strategy,
            change_class,
        });
    }

    UpgradeProposal {
        id: Uuid::new_v4(),
        package: draft.package,
        from_version: draft.from_version,
        to_version,
        change_class,
        security_fix_ids: draft.fix_ids,
        source: ProposalSource::Security,
        severity: Some(draft.severity),
        cautions,
    }
}

fn staleness_proposal(
    pkg: &OutdatedPackage,
    strategy: RiskStrategy,
) -> std::result::Result<UpgradeProposal, SkipReason> {
    let distance = classify_distance(&pkg.current, &pkg.latest);
    if !strategy.allows(distance) {
        return Err(SkipReason::ExcludedByStrategy {
            strategy,
            change_class: distance,
        });
    }

    let target = match strategy {
        RiskStrategy::Conservative => &pkg.wanted,
        RiskStrategy::Balanced | RiskStrategy::Aggressive => &pkg.latest,
    };
    if target.trim() == pkg.current.trim() || target.trim().is_empty() {
        return Err(SkipReason::NoOp);
    }
    // npm reports `wanted` below `current` when the installed copy is
    // outside the declared range
    if let (Some(to), Some(from)) = (parse_loose(target), parse_loose(&pkg.current)) {
        if to < from {
            return Err(SkipReason::NotAnUpgrade {
                target: target.trim().to_string(),
            });
        }
        if to == from {
            return Err(SkipReason::NoOp);
        }
    }

    Ok(UpgradeProposal {
        id: Uuid::new_v4(),
        package: pkg.name.clone(),
        from_version: pkg.current.clone(),
        to_version: target.trim().to_string(),
        change_class: classify_distance(&pkg.current, target),
        security_fix_ids: Vec::new(),
        source: ProposalSource::Staleness,
        severity: None,
        cautions: Vec::new(),
    })
}
