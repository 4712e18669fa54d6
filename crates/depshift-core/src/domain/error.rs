//! Error taxonomy for depshift.

use std::time::Duration;

/// depshift errors.
#[derive(Debug, thiserror::Error)]
pub enum DepshiftError {
    #[error("invalid audit snapshot: {0}")]
    InvalidSnapshot(String),

    #[error("package '{package}' not found in manifest (checked dependencies and devDependencies)")]
    PackageNotFound { package: String },

    #[error("manifest error: {0}")]
    Manifest(String),

    #[error("backup error: {0}")]
    Backup(String),

    #[error("no backups found in {0}")]
    NoBackups(String),

    #[error("git error: {0}")]
    Git(String),

    #[error("command `{command}` failed: {message}")]
    CommandFailed { command: String, message: String },

    #[error("command `{command}` timed out after {after:?}; {remediation}")]
    Timeout {
        command: String,
        after: Duration,
        remediation: String,
    },

    #[error("risk service error: {0}")]
    Risk(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl DepshiftError {
    /// Whether this error is a timeout of an external tool.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}

impl From<reqwest::Error> for DepshiftError {
    fn from(err: reqwest::Error) -> Self {
        DepshiftError::Risk(err.to_string())
    }
}

impl From<toml::de::Error> for DepshiftError {
    fn from(err: toml::de::Error) -> Self {
        DepshiftError::Config(err.to_string())
    }
}

/// Result type for depshift operations.
pub type Result<T> = std::result::Result<T, DepshiftError>;
