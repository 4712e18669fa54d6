//! Scanner adapters: raw audit tooling in, [`AuditSnapshot`] out.
//!
//! Tool output is loose JSON and goes through the `normalize_*` functions,
//! which apply fixed defaults:
//!
//! - unknown severity becomes `info`
//! - unknown dependency type becomes `dependencies`
//! - entries without an installed version are skipped
//!
//! A tool that fails or prints something unparseable leaves its facet empty
//! and logs a `scan.degraded` warning; scanning itself never fails.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use crate::domain::{
    AuditSnapshot, DependencyType, DepshiftError, OutdatedPackage, Result, Severity,
    Vulnerability,
};
use crate::manifest::Manifest;
use crate::obs::emit_scan_degraded;
use crate::process::{run_bounded, CommandOutcome, CommandSpec};
use crate::version::first_concrete;

#[async_trait]
pub trait Scanner: Send + Sync {
    /// Collect audit facts for `project`.
    async fn scan(&self, project: &Path) -> AuditSnapshot;
}

/// Runs `npm ls`, `npm audit` and `npm outdated`.
#[derive(Debug, Clone)]
pub struct NpmScanner {
    pub time_budget: Duration,
}

impl Default for NpmScanner {
    fn default() -> Self {
        Self {
            time_budget: Duration::from_secs(60),
        }
    }
}

impl NpmScanner {
    pub fn new(time_budget: Duration) -> Self {
        Self { time_budget }
    }

    /// Run an npm command that reports JSON on stdout. A non-zero exit is
    /// normal for `audit` and `outdated` when they have findings.
    async fn run_json(&self, project: &Path, args: &[&str]) -> Result<Value> {
        let spec = CommandSpec::new("npm", args.iter().copied());
        let output = match run_bounded(&spec, project, self.time_budget).await? {
            CommandOutcome::Completed(output) => output,
            CommandOutcome::TimedOut { after } => {
                return Err(DepshiftError::Timeout {
                    command: spec.display(),
                    after,
                    remediation: "raise scan_timeout_secs or run the command by hand".to_string(),
                })
            }
        };
        let stdout = output.stdout.trim();
        if stdout.is_empty() {
            if output.success {
                return Ok(Value::Object(Default::default()));
            }
            return Err(DepshiftError::CommandFailed {
                command: spec.display(),
                message: format!("no output: {}", output.stderr.trim()),
            });
        }
        serde_json::from_str(stdout).map_err(|e| DepshiftError::CommandFailed {
            command: spec.display(),
            message: format!("unparseable JSON: {e}"),
        })
    }

    async fn facet(&self, project: &Path, args: &[&str]) -> Option<Value> {
        match self.run_json(project, args).await {
            Ok(value) => Some(value),
            Err(e) => {
                emit_scan_degraded(&format!("npm {}", args.join(" ")), &e);
                None
            }
        }
    }
}

#[async_trait]
impl Scanner for NpmScanner {
    async fn scan(&self, project: &Path) -> AuditSnapshot {
        let mut installed = self
            .facet(project, &["ls", "--json", "--depth=0"])
            .await
            .map(|v| normalize_npm_ls(&v))
            .unwrap_or_default();
        // fill gaps from the manifest's declared ranges
        if let Ok(manifest) = Manifest::load(project) {
            for (name, range) in manifest.all_declared() {
                if let Some(v) = first_concrete(&range) {
                    installed.entry(name).or_insert_with(|| v.to_string());
                }
            }
        }

        let (vulnerabilities, audit_total) =
            match self.facet(project, &["audit", "--json"]).await {
                Some(v) => (normalize_npm_audit(&v, &installed), audit_total(&v)),
                None => (Vec::new(), None),
            };

        let outdated = self
            .facet(project, &["outdated", "--json", "--long"])
            .await
            .map(|v| normalize_npm_outdated(&v))
            .unwrap_or_default();

        let total = audit_total.unwrap_or(installed.len() as u32);
        debug!(
            vulnerabilities = vulnerabilities.len(),
            outdated = outdated.len(),
            total,
            "scan complete"
        );
        AuditSnapshot::new(vulnerabilities, outdated, total)
    }
}

/// Installed top-level versions from `npm ls --json --depth=0`.
pub fn normalize_npm_ls(value: &Value) -> BTreeMap<String, String> {
    value
        .get("dependencies")
        .and_then(Value::as_object)
        .map(|deps| {
            deps.iter()
                .filter_map(|(name, entry)| {
                    let version = entry.get("version")?.as_str()?;
                    Some((name.clone(), version.to_string()))
                })
                .collect()
        })
        .unwrap_or_default()
}

/// Total dependency count from audit metadata (v2 or v1 layout).
pub fn audit_total(value: &Value) -> Option<u32> {
    let metadata = value.get("metadata")?;
    let total = metadata
        .get("dependencies")
        .and_then(|d| d.get("total").or(Some(d)))
        .and_then(Value::as_u64)
        .or_else(|| metadata.get("totalDependencies").and_then(Value::as_u64))?;
    u32::try_from(total).ok()
}

/// Advisories from `npm audit --json`, either the v2 `vulnerabilities` map
/// (npm 7+) or the v1 `advisories` map. `installed` supplies the current
/// version where the report lacks one.
pub fn normalize_npm_audit(
    value: &Value,
    installed: &BTreeMap<String, String>,
) -> Vec<Vulnerability> {
    let mut out = Vec::new();
    let mut seen = BTreeSet::new();
    let mut push = |v: Vulnerability| {
        if seen.insert((v.id.clone(), v.package.clone())) {
            out.push(v);
        }
    };

    if let Some(vulns) = value.get("vulnerabilities").and_then(Value::as_object) {
        for (package, entry) in vulns {
            let Some(current) = installed.get(package) else {
                debug!(package, "skipping advisory for package with no installed version");
                continue;
            };
            let fix_version = entry
                .get("fixAvailable")
                .filter(|f| f.get("name").and_then(Value::as_str) == Some(package.as_str()))
                .and_then(|f| f.get("version"))
                .and_then(Value::as_str);
            let advisories = entry
                .get("via")
                .and_then(Value::as_array)
                .into_iter()
                .flatten()
                .filter(|via| via.is_object());
            for via in advisories {
                let range = str_field(via, "range").or_else(|| str_field(entry, "range"));
                let patched = fix_version
                    .map(|v| format!(">={v}"))
                    .or_else(|| range.as_deref().and_then(invert_upper_bound));
                push(Vulnerability {
                    id: advisory_id(via),
                    severity: Severity::parse_lenient(
                        via.get("severity")
                            .or_else(|| entry.get("severity"))
                            .and_then(Value::as_str)
                            .unwrap_or_default(),
                    ),
                    package: package.clone(),
                    current_version: current.clone(),
                    patched_versions_range: patched,
                    vulnerable_versions_range: range,
                });
            }
        }
    }

    if let Some(advisories) = value.get("advisories").and_then(Value::as_object) {
        for (key, adv) in advisories {
            let Some(package) = str_field(adv, "module_name") else {
                continue;
            };
            let current = adv
                .get("findings")
                .and_then(Value::as_array)
                .and_then(|f| f.first())
                .and_then(|f| str_field(f, "version"))
                .or_else(|| installed.get(&package).cloned());
            let Some(current) = current else {
                continue;
            };
            push(Vulnerability {
                id: str_field(adv, "github_advisory_id").unwrap_or_else(|| key.clone()),
                severity: Severity::parse_lenient(
                    adv.get("severity").and_then(Value::as_str).unwrap_or_default(),
                ),
                package,
                current_version: current,
                patched_versions_range: str_field(adv, "patched_versions"),
                vulnerable_versions_range: str_field(adv, "vulnerable_versions"),
            });
        }
    }

    out
}

/// Packages from `npm outdated --json --long`. Uninstalled entries (no
/// `current`) are skipped.
pub fn normalize_npm_outdated(value: &Value) -> Vec<OutdatedPackage> {
    let Some(entries) = value.as_object() else {
        return Vec::new();
    };
    entries
        .iter()
        .filter_map(|(name, entry)| {
            // workspaces report one entry per location
            let entry = entry.as_array().and_then(|a| a.first()).unwrap_or(entry);
            let current = str_field(entry, "current")?;
            let latest = str_field(entry, "latest")?;
            Some(OutdatedPackage {
                name: name.clone(),
                wanted: str_field(entry, "wanted").unwrap_or_else(|| current.clone()),
                current,
                latest,
                dependency_type: DependencyType::parse_lenient(
                    entry.get("type").and_then(Value::as_str).unwrap_or_default(),
                ),
            })
        })
        .collect()
}

fn str_field(value: &Value, key: &str) -> Option<String> {
    value
        .get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// GHSA id from the advisory URL, else the numeric source id.
fn advisory_id(via: &Value) -> String {
    str_field(via, "url")
        .and_then(|url| url.rsplit('/').next().map(str::to_string))
        .filter(|id| id.starts_with("GHSA-"))
        .or_else(|| via.get("source").map(|s| s.to_string().trim_matches('"').to_string()))
        .or_else(|| str_field(via, "title"))
        .unwrap_or_else(|| "unknown".to_string())
}

/// `<4.17.21` becomes `>=4.17.21`. Anything more complex is left alone.
fn invert_upper_bound(range: &str) -> Option<String> {
    let bound = range.trim().strip_prefix('<')?;
    if bound.starts_with('=') || bound.contains(' ') || bound.contains("||") {
        return None;
    }
    first_concrete(bound).map(|v| format!(">={v}"))
}
