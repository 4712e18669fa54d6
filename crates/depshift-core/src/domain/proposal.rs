//! Upgrade proposals and the risk strategies that shape them.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::audit::Severity;

/// Semantic-version distance of an upgrade, ordered by disruption.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeClass {
    Patch,
    Minor,
    Major,
}

impl ChangeClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Patch => "patch",
            Self::Minor => "minor",
            Self::Major => "major",
        }
    }
}

impl std::fmt::Display for ChangeClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Policy bounding how far staleness-driven upgrades may move.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskStrategy {
    /// Patch releases only.
    Conservative,
    /// Patch and minor releases.
    #[default]
    Balanced,
    /// Any release.
    Aggressive,
}

impl RiskStrategy {
    /// Largest change class this strategy accepts.
    pub fn ceiling(&self) -> ChangeClass {
        match self {
            Self::Conservative => ChangeClass::Patch,
            Self::Balanced => ChangeClass::Minor,
            Self::Aggressive => ChangeClass::Major,
        }
    }

    pub fn allows(&self, class: ChangeClass) -> bool {
        class <= self.ceiling()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Conservative => "conservative",
            Self::Balanced => "balanced",
            Self::Aggressive => "aggressive",
        }
    }
}

impl std::fmt::Display for RiskStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RiskStrategy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "conservative" => Ok(Self::Conservative),
            "balanced" => Ok(Self::Balanced),
            "aggressive" => Ok(Self::Aggressive),
            other => Err(format!(
                "unknown risk strategy '{other}' (expected conservative, balanced or aggressive)"
            )),
        }
    }
}

/// What triggered a proposal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProposalSource {
    Security,
    Staleness,
}

/// Signals the caller should weigh before applying a proposal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Caution {
    /// A security fix needs a larger jump than the strategy normally allows.
    ExceedsStrategy {
        strategy: RiskStrategy,
        change_class: ChangeClass,
    },
    /// The patched range named no usable version; the target is a patch bump
    /// of the installed version.
    FallbackTarget,
}

/// A concrete, immutable upgrade suggestion for one package.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpgradeProposal {
    pub id: Uuid,
    pub package: String,
    pub from_version: String,
    pub to_version: String,
    pub change_class: ChangeClass,
    #[serde(default)]
    pub security_fix_ids: Vec<String>,
    pub source: ProposalSource,
    /// Highest severity among the fixed advisories.
    #[serde(default)]
    pub severity: Option<Severity>,
    #[serde(default)]
    pub cautions: Vec<Caution>,
}

impl UpgradeProposal {
    pub fn is_security_fix(&self) -> bool {
        !self.security_fix_ids.is_empty()
    }

    /// `(package, from, to, class)`: everything except the generated id.
    pub fn key(&self) -> (&str, &str, &str, ChangeClass) {
        (
            &self.package,
            &self.from_version,
            &self.to_version,
            self.change_class,
        )
    }
}

/// Why a package got no proposal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum SkipReason {
    /// Neither the patched range nor the installed version yielded a target.
    UnresolvableTarget { advisory_id: String },
    /// The target equals the installed version.
    NoOp,
    /// The reported target sorts below the installed version.
    NotAnUpgrade { target: String },
    /// The strategy excludes this distance.
    ExcludedByStrategy {
        strategy: RiskStrategy,
        change_class: ChangeClass,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedPackage {
    pub package: String,
    #[serde(flatten)]
    pub reason: SkipReason,
}

/// Output of one planning call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProposalSet {
    pub strategy: RiskStrategy,
    pub proposals: Vec<UpgradeProposal>,
    #[serde(default)]
    pub skipped: Vec<SkippedPackage>,
    pub planned_at: DateTime<Utc>,
}

impl ProposalSet {
    pub fn len(&self) -> usize {
        self.proposals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.proposals.is_empty()
    }

    pub fn get(&self, package: &str) -> Option<&UpgradeProposal> {
        self.proposals.iter().find(|p| p.package == package)
    }

    pub fn security_count(&self) -> usize {
        self.proposals.iter().filter(|p| p.is_security_fix()).count()
    }
}
