//! Mutation and recovery against scratch projects on disk.

use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use depshift_core::{
    apply, ApplyOptions, ApplyRequest, BackupStore, DepshiftConfig, Manifest, MutationFailure,
    RecoveryCoordinator, RecoveryMethod, RecoveryRequest, RecoveryStrategy, Result,
    DEFAULT_BACKUP_DIR,
};

const MANIFEST: &str = r#"{
  "name": "fixture",
  "version": "1.0.0",
  "dependencies": {
    "lodash": "^4.17.19"
  },
  "devDependencies": {
    "jest": "29.0.0"
  }
}
"#;

fn project() -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("package.json"), MANIFEST).unwrap();
    dir
}

fn git(dir: &Path, args: &[&str]) {
    let output = Command::new("git")
        .args(args)
        .current_dir(dir)
        .output()
        .unwrap();
    assert!(
        output.status.success(),
        "git {:?} failed: {}",
        args,
        String::from_utf8_lossy(&output.stderr)
    );
}

fn git_project() -> tempfile::TempDir {
    let dir = project();
    git(dir.path(), &["init"]);
    git(dir.path(), &["config", "user.name", "test-user"]);
    git(dir.path(), &["config", "user.email", "test@example.com"]);
    git(dir.path(), &["add", "package.json"]);
    git(dir.path(), &["commit", "-m", "initial"]);
    dir
}

fn manifest_text(dir: &Path) -> String {
    std::fs::read_to_string(dir.join("package.json")).unwrap()
}

fn argv(parts: &[&str]) -> Option<Vec<String>> {
    Some(parts.iter().map(|s| s.to_string()).collect())
}

fn skip_install() -> ApplyOptions {
    ApplyOptions {
        skip_install: true,
        ..ApplyOptions::default()
    }
}

#[tokio::test]
async fn missing_package_fails_before_any_backup() {
    let dir = project();
    let result = apply(
        dir.path(),
        &ApplyRequest::new("react", "18.2.0"),
        &ApplyOptions::default(),
    )
    .await;

    assert!(!result.success);
    assert_eq!(result.failure, Some(MutationFailure::PackageNotFound));
    assert!(result.message.contains("not found in manifest"));
    assert!(result.backup.is_none());
    assert!(!dir.path().join(DEFAULT_BACKUP_DIR).exists());
    assert_eq!(manifest_text(dir.path()), MANIFEST);
}

#[tokio::test]
async fn install_timeout_is_distinct_and_keeps_edit() {
    let dir = project();
    let options = ApplyOptions {
        install_command: argv(&["sleep", "5"]),
        time_budget: Duration::from_millis(200),
        ..ApplyOptions::default()
    };
    let result = apply(dir.path(), &ApplyRequest::new("lodash", "4.17.21"), &options).await;

    assert!(!result.success);
    assert_eq!(result.failure, Some(MutationFailure::InstallTimedOut));
    assert!(result.message.contains("timed out"));
    assert!(result.message.contains("manually"));
    assert!(result.backup.as_ref().is_some_and(|b| b.exists()));

    let manifest = Manifest::load(dir.path()).unwrap();
    assert_eq!(manifest.declared_version("lodash"), Some("^4.17.21"));
}

#[tokio::test]
async fn install_failure_is_not_reported_as_timeout() {
    let dir = project();
    let options = ApplyOptions {
        install_command: argv(&["sh", "-c", "echo 'ERESOLVE could not resolve' >&2; exit 1"]),
        ..ApplyOptions::default()
    };
    let result = apply(dir.path(), &ApplyRequest::new("lodash", "4.17.21"), &options).await;

    assert!(!result.success);
    assert_eq!(result.failure, Some(MutationFailure::InstallFailed));
    assert!(!result.message.contains("timed out"));
    assert!(result.message.contains("ERESOLVE"));
}

#[tokio::test]
async fn backup_failure_leaves_manifest_untouched() {
    let dir = project();
    std::fs::write(dir.path().join("blocker"), "not a directory").unwrap();
    let options = ApplyOptions {
        backup_dir: PathBuf::from("blocker/backups"),
        ..skip_install()
    };
    let result = apply(dir.path(), &ApplyRequest::new("lodash", "4.17.21"), &options).await;

    assert!(!result.success);
    assert_eq!(result.failure, Some(MutationFailure::BackupFailed));
    assert!(result.message.contains("manifest left unchanged"));
    assert_eq!(manifest_text(dir.path()), MANIFEST);
}

#[tokio::test]
async fn successful_apply_records_backup_metadata() {
    let dir = project();
    let result = apply(dir.path(), &ApplyRequest::new("lodash", "4.17.21"), &skip_install()).await;
    assert!(result.success, "{}", result.message);
    assert_eq!(result.previous_version.as_deref(), Some("^4.17.19"));

    let store = BackupStore::for_project(dir.path(), Path::new(DEFAULT_BACKUP_DIR));
    let latest = store.latest().unwrap().unwrap();
    let meta = latest.metadata.unwrap();
    assert_eq!(meta.package, "lodash");
    assert_eq!(meta.to_version, "4.17.21");
    assert_eq!(std::fs::read_to_string(&latest.path).unwrap(), MANIFEST);
}

#[cfg(unix)]
#[tokio::test]
async fn apply_keeps_manifest_permissions() {
    use std::os::unix::fs::PermissionsExt;

    let dir = project();
    let path = dir.path().join("package.json");
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o644)).unwrap();

    let result = apply(dir.path(), &ApplyRequest::new("lodash", "4.17.21"), &skip_install()).await;
    assert!(result.success, "{}", result.message);

    let mode = std::fs::metadata(&path).unwrap().permissions().mode() & 0o777;
    assert_eq!(mode, 0o644);
}

struct Counting {
    method: RecoveryMethod,
    succeed: bool,
    calls: Arc<AtomicUsize>,
}

#[async_trait]
impl RecoveryStrategy for Counting {
    fn method(&self) -> RecoveryMethod {
        self.method
    }

    async fn attempt(&self, _project: &Path) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.succeed {
            Ok("restored".to_string())
        } else {
            Err(depshift_core::DepshiftError::Git("not a git repository".to_string()))
        }
    }
}

#[tokio::test]
async fn git_success_means_backup_is_never_attempted() {
    let dir = project();
    let git_calls = Arc::new(AtomicUsize::new(0));
    let backup_calls = Arc::new(AtomicUsize::new(0));
    let coordinator = RecoveryCoordinator::new(vec![
        Box::new(Counting {
            method: RecoveryMethod::Git,
            succeed: true,
            calls: git_calls.clone(),
        }),
        Box::new(Counting {
            method: RecoveryMethod::Backup,
            succeed: true,
            calls: backup_calls.clone(),
        }),
    ]);

    let result = coordinator.recover(dir.path()).await;
    assert!(result.success);
    assert_eq!(result.method, RecoveryMethod::Git);
    assert_eq!(git_calls.load(Ordering::SeqCst), 1);
    assert_eq!(backup_calls.load(Ordering::SeqCst), 0);
    assert_eq!(result.attempts.len(), 1);
}

#[tokio::test]
async fn git_failure_falls_back_to_backup() {
    let dir = project();
    let git_calls = Arc::new(AtomicUsize::new(0));
    let backup_calls = Arc::new(AtomicUsize::new(0));
    let coordinator = RecoveryCoordinator::new(vec![
        Box::new(Counting {
            method: RecoveryMethod::Git,
            succeed: false,
            calls: git_calls.clone(),
        }),
        Box::new(Counting {
            method: RecoveryMethod::Backup,
            succeed: true,
            calls: backup_calls.clone(),
        }),
    ]);

    let result = coordinator.recover(dir.path()).await;
    assert!(result.success);
    assert_eq!(result.method, RecoveryMethod::Backup);
    assert_eq!(git_calls.load(Ordering::SeqCst), 1);
    assert_eq!(backup_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn auto_recovery_uses_git_in_a_repository() {
    let dir = git_project();
    let result = apply(dir.path(), &ApplyRequest::new("lodash", "4.17.21"), &skip_install()).await;
    assert!(result.success, "{}", result.message);
    assert_ne!(manifest_text(dir.path()), MANIFEST);

    let coordinator =
        RecoveryCoordinator::for_request(RecoveryRequest::Auto, &DepshiftConfig::default());
    let recovered = coordinator.recover(dir.path()).await;

    assert!(recovered.success, "{}", recovered.message);
    assert_eq!(recovered.method, RecoveryMethod::Git);
    assert_eq!(manifest_text(dir.path()), MANIFEST);
    let restored = recovered.restored_version.unwrap();
    assert_eq!(restored.package, "lodash");
    assert_eq!(restored.version, "^4.17.19");
}

#[tokio::test]
async fn git_recovery_ignores_unrelated_backup_metadata() {
    let dir = git_project();
    let first = apply(dir.path(), &ApplyRequest::new("lodash", "4.17.21"), &skip_install()).await;
    assert!(first.success, "{}", first.message);
    git(dir.path(), &["add", "package.json"]);
    git(dir.path(), &["commit", "-m", "lodash 4.17.21"]);

    let without_backup = ApplyOptions {
        create_backup: false,
        ..skip_install()
    };
    let second = apply(dir.path(), &ApplyRequest::new("jest", "29.7.0"), &without_backup).await;
    assert!(second.success, "{}", second.message);

    let recovered = RecoveryCoordinator::for_request(RecoveryRequest::Git, &DepshiftConfig::default())
        .recover(dir.path())
        .await;

    assert!(recovered.success, "{}", recovered.message);
    assert_eq!(recovered.method, RecoveryMethod::Git);
    let manifest = Manifest::load(dir.path()).unwrap();
    assert_eq!(manifest.declared_version("jest"), Some("29.0.0"));
    assert_eq!(manifest.declared_version("lodash"), Some("^4.17.21"));
    assert!(recovered.restored_version.is_none());
}

#[tokio::test]
async fn auto_recovery_falls_back_to_backup_outside_git() {
    let dir = project();
    let result = apply(dir.path(), &ApplyRequest::new("jest", "29.7.0"), &skip_install()).await;
    assert!(result.success, "{}", result.message);

    let config = DepshiftConfig {
        install_command: argv(&["true"]),
        ..DepshiftConfig::default()
    };
    let recovered = RecoveryCoordinator::for_request(RecoveryRequest::Auto, &config)
        .recover(dir.path())
        .await;

    assert!(recovered.success, "{}", recovered.message);
    assert_eq!(recovered.method, RecoveryMethod::Backup);
    assert_eq!(recovered.attempts.len(), 2);
    assert!(!recovered.attempts[0].success);
    assert!(recovered.message.contains("reinstalled"));
    assert_eq!(manifest_text(dir.path()), MANIFEST);
    assert_eq!(
        recovered.restored_version.map(|r| r.version).as_deref(),
        Some("29.0.0")
    );
}

#[tokio::test]
async fn backup_recovery_reinstall_failure_still_restores() {
    let dir = project();
    apply(dir.path(), &ApplyRequest::new("jest", "29.7.0"), &skip_install()).await;

    let config = DepshiftConfig {
        install_command: argv(&["false"]),
        ..DepshiftConfig::default()
    };
    let recovered = RecoveryCoordinator::for_request(RecoveryRequest::Backup, &config)
        .recover(dir.path())
        .await;

    assert!(recovered.success);
    assert!(recovered.message.contains("run install manually"));
    assert_eq!(manifest_text(dir.path()), MANIFEST);
}

#[tokio::test]
async fn nothing_to_recover_from() {
    let dir = project();
    let recovered = RecoveryCoordinator::for_request(RecoveryRequest::Auto, &DepshiftConfig::default())
        .recover(dir.path())
        .await;

    assert!(!recovered.success);
    assert_eq!(recovered.method, RecoveryMethod::Backup);
    assert!(recovered.message.contains("no backups found"));
    assert!(recovered.message.contains("manually"));
}
