//! Domain models for depshift.
//!
//! Canonical definitions for the pipeline entities:
//! - `AuditSnapshot`: vulnerabilities and outdated packages from one scan
//! - `UpgradeProposal`: a concrete version target for one package
//! - `MutationResult` / `RecoveryResult`: structured operation outcomes

pub mod audit;
pub mod error;
pub mod outcome;
pub mod proposal;

pub use audit::{AuditSnapshot, DependencyType, OutdatedPackage, Severity, Vulnerability};
pub use error::{DepshiftError, Result};
pub use outcome::{
    MutationFailure, MutationResult, RecoveryAttempt, RecoveryMethod, RecoveryRequest,
    RecoveryResult, RestoredVersion,
};
pub use proposal::{
    Caution, ChangeClass, ProposalSet, ProposalSource, RiskStrategy, SkipReason, SkippedPackage,
    UpgradeProposal,
};
