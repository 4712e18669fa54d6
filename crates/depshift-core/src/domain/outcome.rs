//! Structured outcomes of mutation and recovery operations.

use std::path::PathBuf;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::package_manager::PackageManager;

/// Why a mutation did not complete.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MutationFailure {
    PackageNotFound,
    ManifestUnreadable,
    BackupFailed,
    ManifestWriteFailed,
    InstallTimedOut,
    InstallFailed,
}

/// Outcome of one mutator invocation. Immutable once returned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MutationResult {
    pub success: bool,
    pub package: String,
    /// Target version requested.
    pub version: String,
    pub message: String,
    pub applied_at: DateTime<Utc>,
    pub package_manager: PackageManager,
    /// Declared version before the edit, when the package was found.
    #[serde(default)]
    pub previous_version: Option<String>,
    #[serde(default)]
    pub failure: Option<MutationFailure>,
    /// Backup taken before the edit, if one was requested and written.
    #[serde(default)]
    pub backup: Option<PathBuf>,
}

impl MutationResult {
    pub(crate) fn succeeded(
        package: &str,
        version: &str,
        package_manager: PackageManager,
        message: impl Into<String>,
    ) -> Self {
        Self {
            success: true,
            package: package.to_string(),
            version: version.to_string(),
            message: message.into(),
            applied_at: Utc::now(),
            package_manager,
            previous_version: None,
            failure: None,
            backup: None,
        }
    }

    pub(crate) fn failed(
        package: &str,
        version: &str,
        package_manager: PackageManager,
        failure: MutationFailure,
        message: impl Into<String>,
    ) -> Self {
        Self {
            success: false,
            failure: Some(failure),
            ..Self::succeeded(package, version, package_manager, message)
        }
    }

    pub(crate) fn with_previous_version(mut self, previous: Option<String>) -> Self {
        self.previous_version = previous;
        self
    }

    pub(crate) fn with_backup(mut self, backup: Option<PathBuf>) -> Self {
        self.backup = backup;
        self
    }
}

/// Recovery method requested by the caller.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecoveryRequest {
    Git,
    Backup,
    /// Git first, then backup.
    #[default]
    Auto,
}

impl FromStr for RecoveryRequest {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "git" => Ok(Self::Git),
            "backup" => Ok(Self::Backup),
            "auto" => Ok(Self::Auto),
            other => Err(format!(
                "unknown recovery method '{other}' (expected git, backup or auto)"
            )),
        }
    }
}

/// Method that produced a recovery result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecoveryMethod {
    Git,
    Backup,
    /// Nothing automated was available; a human has to restore the project.
    Manual,
}

impl std::fmt::Display for RecoveryMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Git => "git",
            Self::Backup => "backup",
            Self::Manual => "manual",
        })
    }
}

/// Version declared for the package that was being upgraded, read back from
/// the restored manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RestoredVersion {
    pub package: String,
    pub version: String,
}

/// One strategy attempt inside a recovery call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecoveryAttempt {
    pub method: RecoveryMethod,
    pub success: bool,
    pub message: String,
}

/// Outcome of one recovery coordinator invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecoveryResult {
    pub success: bool,
    pub method: RecoveryMethod,
    pub message: String,
    pub restored_at: DateTime<Utc>,
    #[serde(default)]
    pub restored_version: Option<RestoredVersion>,
    /// Every strategy tried, in order.
    #[serde(default)]
    pub attempts: Vec<RecoveryAttempt>,
}
