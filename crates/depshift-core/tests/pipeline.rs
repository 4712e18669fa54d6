//! Full pipeline on a scratch project: scan, plan, apply, test, recover.

use std::path::Path;

use async_trait::async_trait;
use depshift_core::{
    apply, plan, run_tests, ApplyOptions, ApplyRequest, AuditSnapshot, DepshiftConfig,
    OutdatedPackage, RecoveryCoordinator, RecoveryMethod, RecoveryRequest, RiskAssessor,
    RiskStrategy, Scanner, Severity, TestRunOptions, Vulnerability,
};

const MANIFEST: &str = r#"{
  "name": "pipeline-fixture",
  "dependencies": {
    "lodash": "4.17.19",
    "express": "~4.17.1"
  }
}
"#;

struct FixedScanner;

#[async_trait]
impl Scanner for FixedScanner {
    async fn scan(&self, _project: &Path) -> AuditSnapshot {
        AuditSnapshot::new(
            vec![Vulnerability {
                id: "GHSA-35jh-r3h4-6jhm".to_string(),
                severity: Severity::High,
                package: "lodash".to_string(),
                current_version: "4.17.19".to_string(),
                patched_versions_range: Some(">=4.17.21".to_string()),
                vulnerable_versions_range: Some("<4.17.21".to_string()),
            }],
            vec![OutdatedPackage {
                name: "express".to_string(),
                current: "4.17.1".to_string(),
                wanted: "4.17.3".to_string(),
                latest: "4.18.2".to_string(),
                dependency_type: Default::default(),
            }],
            57,
        )
    }
}

fn argv(parts: &[&str]) -> Option<Vec<String>> {
    Some(parts.iter().map(|s| s.to_string()).collect())
}

#[tokio::test]
async fn failed_tests_trigger_backup_recovery() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("package.json"), MANIFEST).unwrap();

    let snapshot = FixedScanner.scan(dir.path()).await;
    let proposals = plan(&snapshot, RiskStrategy::Balanced);
    assert_eq!(proposals.len(), 2);

    let assessment = RiskAssessor::disabled().assess(&proposals.proposals[0]).await;
    assert!(assessment.opinion.is_none());

    let options = ApplyOptions {
        install_command: argv(&["true"]),
        ..ApplyOptions::default()
    };
    let lodash = proposals.get("lodash").unwrap();
    let applied = apply(dir.path(), &ApplyRequest::from(lodash), &options).await;
    assert!(applied.success, "{}", applied.message);

    let report = run_tests(
        dir.path(),
        &TestRunOptions {
            command: argv(&["sh", "-c", "echo 'Tests:       1 failed, 3 passed, 4 total'; exit 1"]),
            ..TestRunOptions::default()
        },
    )
    .await
    .unwrap();
    assert!(!report.success);
    assert_eq!(report.counts.failed, 1);

    let config = DepshiftConfig {
        install_command: argv(&["true"]),
        ..DepshiftConfig::default()
    };
    let recovered = RecoveryCoordinator::for_request(RecoveryRequest::Auto, &config)
        .recover(dir.path())
        .await;
    assert!(recovered.success, "{}", recovered.message);
    assert_eq!(recovered.method, RecoveryMethod::Backup);
    assert_eq!(
        std::fs::read_to_string(dir.path().join("package.json")).unwrap(),
        MANIFEST
    );
    let restored = recovered.restored_version.unwrap();
    assert_eq!((restored.package.as_str(), restored.version.as_str()), ("lodash", "4.17.19"));
}

#[tokio::test]
async fn tilde_range_survives_upgrade() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("package.json"), MANIFEST).unwrap();

    let proposals = plan(&FixedScanner.scan(dir.path()).await, RiskStrategy::Balanced);
    let express = proposals.get("express").unwrap();
    let options = ApplyOptions {
        skip_install: true,
        create_backup: false,
        ..ApplyOptions::default()
    };
    let applied = apply(dir.path(), &ApplyRequest::from(express), &options).await;
    assert!(applied.success);

    let text = std::fs::read_to_string(dir.path().join("package.json")).unwrap();
    assert!(text.contains("\"express\": \"~4.18.2\""));
}
