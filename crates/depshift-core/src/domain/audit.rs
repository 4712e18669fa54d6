//! Audit snapshot: vulnerabilities and outdated packages for one project.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::error::{DepshiftError, Result};

/// Advisory severity, ordered from least to most severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    /// Lenient parse for scanner output. Unknown labels become [`Severity::Info`].
    pub fn parse_lenient(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "critical" => Self::Critical,
            "high" => Self::High,
            "moderate" | "medium" => Self::Medium,
            "low" => Self::Low,
            _ => Self::Info,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Manifest section a package is declared in.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DependencyType {
    #[default]
    #[serde(rename = "dependencies")]
    Dependencies,
    #[serde(rename = "devDependencies")]
    DevDependencies,
    #[serde(rename = "peerDependencies")]
    PeerDependencies,
}

impl DependencyType {
    /// Lenient parse for scanner output. Unknown sections become
    /// [`DependencyType::Dependencies`].
    pub fn parse_lenient(raw: &str) -> Self {
        match raw.trim() {
            "devDependencies" | "dev" => Self::DevDependencies,
            "peerDependencies" | "peer" => Self::PeerDependencies,
            _ => Self::Dependencies,
        }
    }
}

/// A single advisory affecting an installed package.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vulnerability {
    /// Advisory identifier (GHSA id, CVE, or scanner-specific number).
    pub id: String,

    pub severity: Severity,

    /// Affected package name.
    pub package: String,

    /// Installed version.
    pub current_version: String,

    /// Free-form "patched versions" text. May hold comparators, several
    /// alternatives, or nothing useful at all.
    #[serde(default)]
    pub patched_versions_range: Option<String>,

    #[serde(default)]
    pub vulnerable_versions_range: Option<String>,
}

/// A package with a newer version available.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutdatedPackage {
    pub name: String,
    pub current: String,
    /// Highest version satisfying the declared range.
    pub wanted: String,
    /// Highest published version.
    pub latest: String,
    #[serde(default)]
    pub dependency_type: DependencyType,
}

/// Immutable audit facts for one project, produced once per scan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditSnapshot {
    #[serde(default)]
    pub vulnerabilities: Vec<Vulnerability>,

    #[serde(default)]
    pub outdated_packages: Vec<OutdatedPackage>,

    #[serde(default)]
    pub total_packages: u32,

    #[serde(default = "Utc::now")]
    pub scanned_at: DateTime<Utc>,
}

impl AuditSnapshot {
    pub fn new(
        vulnerabilities: Vec<Vulnerability>,
        outdated_packages: Vec<OutdatedPackage>,
        total_packages: u32,
    ) -> Self {
        Self {
            vulnerabilities,
            outdated_packages,
            total_packages,
            scanned_at: Utc::now(),
        }
    }

    /// Parse a snapshot document. Malformed input is a hard error, never an
    /// empty snapshot.
    pub fn from_json(input: &str) -> Result<Self> {
        serde_json::from_str(input).map_err(|e| DepshiftError::InvalidSnapshot(e.to_string()))
    }

    pub fn is_empty(&self) -> bool {
        self.vulnerabilities.is_empty() && self.outdated_packages.is_empty()
    }
}
