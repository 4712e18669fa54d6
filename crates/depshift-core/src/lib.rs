//! depshift Core Library
//!
//! Dependency-upgrade decisions and recovery for npm-style projects: plan
//! version targets from audit facts, apply one upgrade behind a backup, run
//! the tests, and restore the manifest when something breaks.

pub mod backup;
pub mod config;
pub mod domain;
pub mod git;
pub mod manifest;
pub mod metrics;
pub mod mutator;
pub mod obs;
pub mod package_manager;
pub mod planner;
pub mod process;
pub mod recovery;
pub mod risk;
pub mod scanner;
pub mod telemetry;
pub mod test_output;
pub mod test_runner;
pub mod transport;
pub mod version;

/// Crate version, reported by the CLI.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub use domain::{
    AuditSnapshot, Caution, ChangeClass, DependencyType, DepshiftError, MutationFailure,
    MutationResult, OutdatedPackage, ProposalSet, ProposalSource, RecoveryAttempt, RecoveryMethod,
    RecoveryRequest, RecoveryResult, RestoredVersion, Result, RiskStrategy, Severity,
    SkipReason, SkippedPackage, UpgradeProposal, Vulnerability,
};

pub use backup::{BackupMetadata, BackupRecord, BackupStore, DEFAULT_BACKUP_DIR};
pub use config::{DepshiftConfig, RiskConfig};
pub use manifest::Manifest;
pub use metrics::METRICS;
pub use mutator::{apply, ApplyOptions, ApplyRequest};
pub use package_manager::PackageManager;
pub use planner::{plan, plan_json};
pub use recovery::{BackupRecovery, GitRecovery, RecoveryCoordinator, RecoveryStrategy};
pub use risk::{
    HttpRiskNarrator, Recommendation, RiskAssessment, RiskAssessor, RiskNarrator, RiskOpinion,
};
pub use scanner::{NpmScanner, Scanner};
pub use test_output::{RunnerFormat, TestCounts};
pub use telemetry::init_tracing;
pub use test_runner::{run_tests, TestRunOptions, TestRunReport};
pub use transport::{sanitize_text, to_transport_json};
pub use version::{classify_distance, resolve_target};
