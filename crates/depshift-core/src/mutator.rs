//! Transactional manifest mutation.
//!
//! Order is fixed: resolve package manager, locate the package, back up,
//! rewrite, install. A requested backup that cannot be written stops the
//! mutation before the manifest is touched. An install failure or timeout
//! leaves the edited manifest in place; restoring it is an explicit
//! [`crate::recovery`] call.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

use crate::backup::{BackupMetadata, BackupStore, DEFAULT_BACKUP_DIR};
use crate::config::DepshiftConfig;
use crate::domain::{DepshiftError, MutationFailure, MutationResult, UpgradeProposal};
use crate::manifest::Manifest;
use crate::metrics::METRICS;
use crate::obs::emit_mutation_finished;
use crate::package_manager::PackageManager;
use crate::process::{run_bounded, tail, CommandOutcome, CommandSpec};

/// Which package to move to which version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplyRequest {
    pub package: String,
    pub to_version: String,
    #[serde(default)]
    pub from_version: Option<String>,
    #[serde(default)]
    pub proposal_id: Option<Uuid>,
}

impl ApplyRequest {
    pub fn new(package: impl Into<String>, to_version: impl Into<String>) -> Self {
        Self {
            package: package.into(),
            to_version: to_version.into(),
            from_version: None,
            proposal_id: None,
        }
    }
}

impl From<&UpgradeProposal> for ApplyRequest {
    fn from(proposal: &UpgradeProposal) -> Self {
        Self {
            package: proposal.package.clone(),
            to_version: proposal.to_version.clone(),
            from_version: Some(proposal.from_version.clone()),
            proposal_id: Some(proposal.id),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApplyOptions {
    pub create_backup: bool,
    pub skip_install: bool,
    /// Upper bound for the install step.
    pub time_budget: Duration,
    /// Overrides lockfile detection.
    pub package_manager: Option<PackageManager>,
    /// Replaces `<pm> install`.
    pub install_command: Option<Vec<String>>,
    /// Relative to the project root.
    pub backup_dir: PathBuf,
}

impl Default for ApplyOptions {
    fn default() -> Self {
        Self {
            create_backup: true,
            skip_install: false,
            time_budget: Duration::from_secs(120),
            package_manager: None,
            install_command: None,
            backup_dir: PathBuf::from(DEFAULT_BACKUP_DIR),
        }
    }
}

impl ApplyOptions {
    pub fn from_config(config: &DepshiftConfig) -> Self {
        Self {
            time_budget: config.install_timeout(),
            package_manager: config.package_manager,
            install_command: config.install_command.clone(),
            backup_dir: config.backup_dir.clone(),
            ..Self::default()
        }
    }
}

/// Command used for the install step.
pub(crate) fn install_spec(
    pm: PackageManager,
    override_argv: Option<&[String]>,
) -> crate::domain::Result<CommandSpec> {
    match override_argv {
        Some(argv) => CommandSpec::from_argv(argv),
        None => Ok(pm.install_command()),
    }
}

/// Apply one upgrade to `<project>/package.json`.
///
/// Never fails past this boundary: every outcome, including a missing
/// package or an install timeout, is a [`MutationResult`].
pub async fn apply(project: &Path, request: &ApplyRequest, options: &ApplyOptions) -> MutationResult {
    let result = apply_inner(project, request, options).await;
    METRICS.record_mutation(result.success);
    emit_mutation_finished(
        &result.package,
        &result.version,
        result.success,
        &result.message,
    );
    result
}

async fn apply_inner(
    project: &Path,
    request: &ApplyRequest,
    options: &ApplyOptions,
) -> MutationResult {
    let pm = PackageManager::resolve(project, options.package_manager);
    let package = request.package.as_str();
    let target = request.to_version.trim();
    let fail = |failure: MutationFailure, message: String| {
        MutationResult::failed(package, target, pm, failure, message)
    };

    let mut manifest = match Manifest::load(project) {
        Ok(m) => m,
        Err(e) => return fail(MutationFailure::ManifestUnreadable, e.to_string()),
    };

    let Some(previous) = manifest.declared_version(package).map(str::to_string) else {
        let err = DepshiftError::PackageNotFound {
            package: package.to_string(),
        };
        return fail(MutationFailure::PackageNotFound, err.to_string());
    };

    let backup = if options.create_backup {
        let store = BackupStore::for_project(project, &options.backup_dir);
        let metadata = BackupMetadata {
            package: package.to_string(),
            from_version: Some(previous.clone()),
            to_version: target.to_string(),
            proposal_id: request.proposal_id,
        };
        match store.create(manifest.path(), Some(&metadata)) {
            Ok(record) => Some(record.path),
            Err(e) => {
                return fail(
                    MutationFailure::BackupFailed,
                    format!("{e}; manifest left unchanged"),
                )
                .with_previous_version(Some(previous))
            }
        }
    } else {
        None
    };

    if let Err(e) = manifest.set_version(package, target).and_then(|_| manifest.save()) {
        return fail(MutationFailure::ManifestWriteFailed, e.to_string())
            .with_previous_version(Some(previous))
            .with_backup(backup);
    }
    debug!(package, from = %previous, to = target, "manifest updated");

    if options.skip_install {
        return MutationResult::succeeded(
            package,
            target,
            pm,
            format!(
                "updated {package} from {previous} to {target} in package.json; install skipped, run `{}` before testing",
                pm.install_command().display()
            ),
        )
        .with_previous_version(Some(previous))
        .with_backup(backup);
    }

    let spec = match install_spec(pm, options.install_command.as_deref()) {
        Ok(spec) => spec,
        Err(e) => {
            return fail(MutationFailure::InstallFailed, e.to_string())
                .with_previous_version(Some(previous))
                .with_backup(backup)
        }
    };

    info!(command = %spec.display(), budget_secs = options.time_budget.as_secs(), "installing");
    let result = match run_bounded(&spec, project, options.time_budget).await {
        Ok(CommandOutcome::Completed(output)) if output.success => MutationResult::succeeded(
            package,
            target,
            pm,
            format!("updated {package} from {previous} to {target} and installed"),
        ),
        Ok(CommandOutcome::Completed(output)) => fail(
            MutationFailure::InstallFailed,
            format!(
                "package.json now declares {package}@{target} but `{}` failed (exit code {}): {}. Fix the error and run it manually, or recover to restore the previous manifest",
                spec.display(),
                output
                    .exit_code
                    .map(|c| c.to_string())
                    .unwrap_or_else(|| "none".to_string()),
                tail(output.combined().trim(), 10)
            ),
        ),
        Ok(CommandOutcome::TimedOut { after }) => fail(
            MutationFailure::InstallTimedOut,
            format!(
                "install timed out after {after:?}; package.json already declares {package}@{target}. Run `{}` manually, retry with a larger time budget or skip_install, or recover to restore the previous manifest",
                spec.display()
            ),
        ),
        Err(e) => fail(
            MutationFailure::InstallFailed,
            format!(
                "package.json now declares {package}@{target} but install could not run: {e}. Run `{}` manually",
                spec.display()
            ),
        ),
    };

    result.with_previous_version(Some(previous)).with_backup(backup)
}
