//! Configuration: `depshift.toml` plus environment overrides.
//!
//! ```toml
//! install_timeout_secs = 120
//! default_strategy = "conservative"
//! install_command = ["npm", "ci"]
//!
//! [risk]
//! endpoint = "https://risk.example.com/v1/assess"
//! ```
//!
//! `DEPSHIFT_RISK_ENDPOINT` and `DEPSHIFT_RISK_API_KEY` override the `[risk]`
//! table. Values are resolved once and injected into the components that
//! need them; nothing reads the environment later.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::backup::DEFAULT_BACKUP_DIR;
use crate::domain::{DepshiftError, Result, RiskStrategy};
use crate::package_manager::PackageManager;

/// Config file looked up in the project root.
pub const CONFIG_FILE: &str = "depshift.toml";

pub const ENV_RISK_ENDPOINT: &str = "DEPSHIFT_RISK_ENDPOINT";
pub const ENV_RISK_API_KEY: &str = "DEPSHIFT_RISK_API_KEY";

/// Settings for the optional risk-narration service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskConfig {
    pub endpoint: Option<String>,
    pub api_key: Option<String>,
    pub timeout_secs: u64,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            api_key: None,
            timeout_secs: 20,
        }
    }
}

impl RiskConfig {
    /// Whether the service can be called at all.
    pub fn is_configured(&self) -> bool {
        self.api_key.as_deref().is_some_and(|k| !k.trim().is_empty())
            && self.endpoint.as_deref().is_some_and(|e| !e.trim().is_empty())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DepshiftConfig {
    pub install_timeout_secs: u64,
    pub test_timeout_secs: u64,
    pub scan_timeout_secs: u64,
    /// Relative to the project root.
    pub backup_dir: PathBuf,
    pub default_strategy: RiskStrategy,
    pub package_manager: Option<PackageManager>,
    pub install_command: Option<Vec<String>>,
    pub test_command: Option<Vec<String>>,
    pub risk: RiskConfig,
}

impl Default for DepshiftConfig {
    fn default() -> Self {
        Self {
            install_timeout_secs: 120,
            test_timeout_secs: 300,
            scan_timeout_secs: 60,
            backup_dir: PathBuf::from(DEFAULT_BACKUP_DIR),
            default_strategy: RiskStrategy::default(),
            package_manager: None,
            install_command: None,
            test_command: None,
            risk: RiskConfig::default(),
        }
    }
}

impl DepshiftConfig {
    pub fn from_toml_str(input: &str) -> Result<Self> {
        let config: Self = toml::from_str(input)?;
        config.validate()?;
        Ok(config)
    }

    /// Load `explicit` if given (it must exist), else `<project>/depshift.toml`
    /// when present, else defaults. Environment overrides apply last.
    pub fn load(project: &Path, explicit: Option<&Path>) -> Result<Self> {
        let mut config = match explicit {
            Some(path) => Self::from_file(path)?,
            None => {
                let candidate = project.join(CONFIG_FILE);
                if candidate.is_file() {
                    Self::from_file(&candidate)?
                } else {
                    Self::default()
                }
            }
        };
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            DepshiftError::Config(format!("failed to read {}: {e}", path.display()))
        })?;
        Self::from_toml_str(&raw)
            .map_err(|e| DepshiftError::Config(format!("{}: {e}", path.display())))
    }

    /// Apply environment overrides through `lookup`.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(endpoint) = lookup(ENV_RISK_ENDPOINT).filter(|v| !v.trim().is_empty()) {
            self.risk.endpoint = Some(endpoint);
        }
        if let Some(key) = lookup(ENV_RISK_API_KEY).filter(|v| !v.trim().is_empty()) {
            self.risk.api_key = Some(key);
        }
    }

    fn validate(&self) -> Result<()> {
        for (name, argv) in [
            ("install_command", &self.install_command),
            ("test_command", &self.test_command),
        ] {
            if argv.as_ref().is_some_and(|a| a.is_empty()) {
                return Err(DepshiftError::Config(format!("{name} must not be empty")));
            }
        }
        for (name, secs) in [
            ("install_timeout_secs", self.install_timeout_secs),
            ("test_timeout_secs", self.test_timeout_secs),
            ("scan_timeout_secs", self.scan_timeout_secs),
            ("risk.timeout_secs", self.risk.timeout_secs),
        ] {
            if secs == 0 {
                return Err(DepshiftError::Config(format!(
                    "{name} must be greater than zero"
                )));
            }
        }
        Ok(())
    }

    pub fn install_timeout(&self) -> Duration {
        Duration::from_secs(self.install_timeout_secs)
    }

    pub fn test_timeout(&self) -> Duration {
        Duration::from_secs(self.test_timeout_secs)
    }

    pub fn scan_timeout(&self) -> Duration {
        Duration::from_secs(self.scan_timeout_secs)
    }
}
