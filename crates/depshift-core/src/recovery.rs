//! Recovery coordination: restore the manifest through an ordered chain of
//! strategies, stopping at the first that succeeds.
//!
//! `auto` tries git before backups: a checkout restores lockfiles along with
//! the manifest, while a backup restores only the manifest and needs a
//! reinstall afterwards.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tracing::{debug, warn};

use crate::backup::{BackupMetadata, BackupStore, DEFAULT_BACKUP_DIR};
use crate::config::DepshiftConfig;
use crate::domain::{
    DepshiftError, RecoveryAttempt, RecoveryMethod, RecoveryRequest, RecoveryResult, Result,
    RestoredVersion,
};
use crate::git;
use crate::manifest::Manifest;
use crate::metrics::METRICS;
use crate::mutator::install_spec;
use crate::obs::{emit_recovery_attempted, emit_recovery_finished};
use crate::package_manager::{PackageManager, LOCKFILES, MANIFEST_FILE};
use crate::process::{run_bounded, CommandOutcome};

/// One way of putting the manifest back.
#[async_trait]
pub trait RecoveryStrategy: Send + Sync {
    fn method(&self) -> RecoveryMethod;

    /// Restore `project`. `Ok` carries a human-readable summary.
    async fn attempt(&self, project: &Path) -> Result<String>;
}

/// Check the manifest (and tracked lockfiles) out of `HEAD`.
#[derive(Debug, Clone, Default)]
pub struct GitRecovery;

#[async_trait]
impl RecoveryStrategy for GitRecovery {
    fn method(&self) -> RecoveryMethod {
        RecoveryMethod::Git
    }

    async fn attempt(&self, project: &Path) -> Result<String> {
        let project = project.to_path_buf();
        tokio::task::spawn_blocking(move || restore_from_head(&project))
            .await
            .map_err(|e| DepshiftError::Git(format!("git recovery task failed: {e}")))?
    }
}

fn restore_from_head(project: &Path) -> Result<String> {
    if !git::is_git_repo(project) {
        return Err(DepshiftError::Git(format!(
            "{} is not a git repository",
            project.display()
        )));
    }
    let sha = git::capture_head_sha(project)?;
    if !git::is_tracked_in_head(project, MANIFEST_FILE) {
        return Err(DepshiftError::Git(format!(
            "{MANIFEST_FILE} is not committed at HEAD"
        )));
    }
    if !git::is_modified(project, MANIFEST_FILE)? {
        debug!("manifest already matches HEAD");
    }
    git::checkout_from_head(project, MANIFEST_FILE)?;

    let mut restored = vec![MANIFEST_FILE];
    for (lockfile, _) in LOCKFILES {
        if !git::is_tracked_in_head(project, lockfile) {
            continue;
        }
        // lockfiles are best-effort
        match git::checkout_from_head(project, lockfile) {
            Ok(()) => restored.push(lockfile),
            Err(e) => warn!(lockfile, error = %e, "lockfile not restored"),
        }
    }

    let short = sha.get(..8).unwrap_or(&sha);
    Ok(format!(
        "restored {} from git HEAD ({short})",
        restored.join(", ")
    ))
}

/// Copy the newest backup over the manifest, then reinstall.
#[derive(Debug, Clone)]
pub struct BackupRecovery {
    pub backup_dir: PathBuf,
    pub package_manager: Option<PackageManager>,
    pub install_command: Option<Vec<String>>,
    pub reinstall: bool,
    pub time_budget: Duration,
}

impl Default for BackupRecovery {
    fn default() -> Self {
        Self {
            backup_dir: PathBuf::from(DEFAULT_BACKUP_DIR),
            package_manager: None,
            install_command: None,
            reinstall: true,
            time_budget: Duration::from_secs(120),
        }
    }
}

impl BackupRecovery {
    pub fn from_config(config: &DepshiftConfig) -> Self {
        Self {
            backup_dir: config.backup_dir.clone(),
            package_manager: config.package_manager,
            install_command: config.install_command.clone(),
            reinstall: true,
            time_budget: config.install_timeout(),
        }
    }

    /// Reinstall after restoring. A failed reinstall does not undo the
    /// restore; it is reported in the message.
    async fn resync(&self, project: &Path) -> String {
        let pm = PackageManager::resolve(project, self.package_manager);
        let spec = match install_spec(pm, self.install_command.as_deref()) {
            Ok(spec) => spec,
            Err(e) => {
                return format!(
                    "reinstall not started ({e}); run `{}` manually",
                    pm.install_command().display()
                )
            }
        };
        match run_bounded(&spec, project, self.time_budget).await {
            Ok(CommandOutcome::Completed(output)) if output.success => {
                format!("reinstalled with `{}`", spec.display())
            }
            Ok(CommandOutcome::Completed(output)) => format!(
                "`{}` exited with {}; run install manually",
                spec.display(),
                output
                    .exit_code
                    .map(|c| format!("code {c}"))
                    .unwrap_or_else(|| "a signal".to_string())
            ),
            Ok(CommandOutcome::TimedOut { after }) => format!(
                "`{}` timed out after {after:?}; run install manually",
                spec.display()
            ),
            Err(e) => format!("reinstall failed ({e}); run install manually"),
        }
    }
}

#[async_trait]
impl RecoveryStrategy for BackupRecovery {
    fn method(&self) -> RecoveryMethod {
        RecoveryMethod::Backup
    }

    async fn attempt(&self, project: &Path) -> Result<String> {
        let store = BackupStore::for_project(project, &self.backup_dir);
        let record = store.restore_latest(&project.join(MANIFEST_FILE))?;
        let restored = format!("restored {MANIFEST_FILE} from {}", record.file_name);
        if !self.reinstall {
            return Ok(restored);
        }
        let install = self.resync(project).await;
        Ok(format!("{restored}; {install}"))
    }
}

/// Runs strategies in order until one succeeds.
pub struct RecoveryCoordinator {
    strategies: Vec<Box<dyn RecoveryStrategy>>,
    backup_dir: PathBuf,
}

impl RecoveryCoordinator {
    pub fn new(strategies: Vec<Box<dyn RecoveryStrategy>>) -> Self {
        Self {
            strategies,
            backup_dir: PathBuf::from(DEFAULT_BACKUP_DIR),
        }
    }

    /// Backup area consulted for the restored-version lookup.
    pub fn with_backup_dir(mut self, backup_dir: impl Into<PathBuf>) -> Self {
        self.backup_dir = backup_dir.into();
        self
    }

    /// Chain for a caller-chosen method.
    pub fn for_request(request: RecoveryRequest, config: &DepshiftConfig) -> Self {
        let git: Box<dyn RecoveryStrategy> = Box::new(GitRecovery);
        let backup: Box<dyn RecoveryStrategy> = Box::new(BackupRecovery::from_config(config));
        let strategies = match request {
            RecoveryRequest::Git => vec![git],
            RecoveryRequest::Backup => vec![backup],
            RecoveryRequest::Auto => vec![git, backup],
        };
        Self::new(strategies).with_backup_dir(config.backup_dir.clone())
    }

    pub fn methods(&self) -> Vec<RecoveryMethod> {
        self.strategies.iter().map(|s| s.method()).collect()
    }

    /// Restore `project`. Always returns a result; when every strategy fails
    /// the last failure is reported.
    pub async fn recover(&self, project: &Path) -> RecoveryResult {
        METRICS.inc_recoveries();
        let pending = self.pending_backup(project);
        let mut attempts = Vec::with_capacity(self.strategies.len());

        for strategy in &self.strategies {
            let method = strategy.method();
            let attempt = match strategy.attempt(project).await {
                Ok(message) => RecoveryAttempt {
                    method,
                    success: true,
                    message,
                },
                Err(e) => RecoveryAttempt {
                    method,
                    success: false,
                    message: e.to_string(),
                },
            };
            emit_recovery_attempted(&method.to_string(), attempt.success, &attempt.message);
            let succeeded = attempt.success;
            attempts.push(attempt);
            if succeeded {
                break;
            }
            debug!(%method, "recovery strategy failed, trying next");
        }

        let last = attempts.last().map(|a| (a.method, a.success, a.message.clone()));
        let result = match last {
            Some((method, true, message)) => RecoveryResult {
                success: true,
                method,
                message,
                restored_at: Utc::now(),
                restored_version: restored_version(project, method, pending),
                attempts,
            },
            Some((method, false, _)) => {
                let summary = attempts
                    .iter()
                    .map(|a| format!("{}: {}", a.method, a.message))
                    .collect::<Vec<_>>()
                    .join("; ");
                RecoveryResult {
                    success: false,
                    method,
                    message: format!("{summary}; restore {MANIFEST_FILE} manually"),
                    restored_at: Utc::now(),
                    restored_version: None,
                    attempts,
                }
            }
            None => RecoveryResult {
                success: false,
                method: RecoveryMethod::Manual,
                message: format!(
                    "no recovery method available; restore {MANIFEST_FILE} manually"
                ),
                restored_at: Utc::now(),
                restored_version: None,
                attempts,
            },
        };

        emit_recovery_finished(&result.method.to_string(), result.success);
        result
    }

    /// Newest backup sidecar, paired with what the manifest declares for its
    /// package before anything is restored.
    fn pending_backup(&self, project: &Path) -> Option<(BackupMetadata, Option<String>)> {
        let store = BackupStore::for_project(project, &self.backup_dir);
        let metadata = store.latest().ok()??.metadata?;
        let before = Manifest::load(project)
            .ok()
            .and_then(|m| m.declared_version(&metadata.package).map(str::to_string));
        Some((metadata, before))
    }
}

/// Version now declared for the package named by the newest backup.
///
/// A backup restore always undoes that backup's change. Any other method
/// only counts when the manifest still carried the sidecar's target and the
/// restore changed it; otherwise the sidecar belongs to an unrelated apply.
fn restored_version(
    project: &Path,
    method: RecoveryMethod,
    pending: Option<(BackupMetadata, Option<String>)>,
) -> Option<RestoredVersion> {
    let (metadata, before) = pending?;
    let version = Manifest::load(project)
        .ok()?
        .declared_version(&metadata.package)?
        .to_string();
    let undid_backup = method == RecoveryMethod::Backup
        || before.as_deref().is_some_and(|b| {
            b != version && b.trim_start_matches(['^', '~']).trim() == metadata.to_version.trim()
        });
    undid_backup.then(|| RestoredVersion {
        package: metadata.package,
        version,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed {
        method: RecoveryMethod,
        ok: bool,
    }

    #[async_trait]
    impl RecoveryStrategy for Fixed {
        fn method(&self) -> RecoveryMethod {
            self.method
        }

        async fn attempt(&self, _project: &Path) -> Result<String> {
            if self.ok {
                Ok(format!("{} ok", self.method))
            } else {
                Err(DepshiftError::Backup(format!("{} broke", self.method)))
            }
        }
    }

    fn fixed(method: RecoveryMethod, ok: bool) -> Box<dyn RecoveryStrategy> {
        Box::new(Fixed { method, ok })
    }

    #[tokio::test]
    async fn test_empty_chain_is_manual() {
        let dir = tempfile::tempdir().unwrap();
        let result = RecoveryCoordinator::new(vec![]).recover(dir.path()).await;
        assert!(!result.success);
        assert_eq!(result.method, RecoveryMethod::Manual);
        assert!(result.message.contains("manually"));
    }

    #[tokio::test]
    async fn test_reports_last_failure() {
        let dir = tempfile::tempdir().unwrap();
        let coordinator = RecoveryCoordinator::new(vec![
            fixed(RecoveryMethod::Git, false),
            fixed(RecoveryMethod::Backup, false),
        ]);
        let result = coordinator.recover(dir.path()).await;
        assert!(!result.success);
        assert_eq!(result.method, RecoveryMethod::Backup);
        assert_eq!(result.attempts.len(), 2);
        assert!(result.message.contains("backup broke"));
    }

    #[tokio::test]
    async fn test_fallback_success() {
        let dir = tempfile::tempdir().unwrap();
        let coordinator = RecoveryCoordinator::new(vec![
            fixed(RecoveryMethod::Git, false),
            fixed(RecoveryMethod::Backup, true),
        ]);
        let result = coordinator.recover(dir.path()).await;
        assert!(result.success);
        assert_eq!(result.method, RecoveryMethod::Backup);
        assert!(!result.attempts[0].success);
    }

    #[test]
    fn test_for_request_chains() {
        let config = DepshiftConfig::default();
        assert_eq!(
            RecoveryCoordinator::for_request(RecoveryRequest::Auto, &config).methods(),
            vec![RecoveryMethod::Git, RecoveryMethod::Backup]
        );
        assert_eq!(
            RecoveryCoordinator::for_request(RecoveryRequest::Backup, &config).methods(),
            vec![RecoveryMethod::Backup]
        );
    }

    #[tokio::test]
    async fn test_git_recovery_outside_repo_fails() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(MANIFEST_FILE), "{}").unwrap();
        let err = GitRecovery.attempt(dir.path()).await.unwrap_err();
        assert!(err.to_string().contains("not a git repository"));
    }

    #[tokio::test]
    async fn test_backup_recovery_without_backups() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(MANIFEST_FILE), "{}").unwrap();
        let err = BackupRecovery::default().attempt(dir.path()).await.unwrap_err();
        assert!(err.to_string().contains("no backups found"));
    }
}
