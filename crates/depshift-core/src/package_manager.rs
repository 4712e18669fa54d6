//! Package-manager detection and command lines.

use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::process::CommandSpec;

/// Manifest file name.
pub const MANIFEST_FILE: &str = "package.json";

/// Lockfiles in detection priority order.
pub const LOCKFILES: [(&str, PackageManager); 3] = [
    ("pnpm-lock.yaml", PackageManager::Pnpm),
    ("package-lock.json", PackageManager::Npm),
    ("yarn.lock", PackageManager::Yarn),
];

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PackageManager {
    #[default]
    Npm,
    Pnpm,
    Yarn,
}

impl PackageManager {
    /// Detect from lockfile presence; npm when no lockfile exists.
    pub fn detect(project: &Path) -> Self {
        LOCKFILES
            .iter()
            .find(|(file, _)| project.join(file).is_file())
            .map(|(_, pm)| *pm)
            .unwrap_or_default()
    }

    /// Explicit override, else detection.
    pub fn resolve(project: &Path, explicit: Option<PackageManager>) -> Self {
        explicit.unwrap_or_else(|| Self::detect(project))
    }

    pub fn binary(&self) -> &'static str {
        match self {
            Self::Npm => "npm",
            Self::Pnpm => "pnpm",
            Self::Yarn => "yarn",
        }
    }

    pub fn lockfile(&self) -> &'static str {
        match self {
            Self::Npm => "package-lock.json",
            Self::Pnpm => "pnpm-lock.yaml",
            Self::Yarn => "yarn.lock",
        }
    }

    pub fn install_command(&self) -> CommandSpec {
        CommandSpec::new(self.binary(), ["install"])
    }

    pub fn test_command(&self) -> CommandSpec {
        CommandSpec::new(self.binary(), ["test"])
    }
}

impl std::fmt::Display for PackageManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.binary())
    }
}

impl FromStr for PackageManager {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "npm" => Ok(Self::Npm),
            "pnpm" => Ok(Self::Pnpm),
            "yarn" => Ok(Self::Yarn),
            other => Err(format!(
                "unknown package manager '{other}' (expected npm, pnpm or yarn)"
            )),
        }
    }
}
