//! Structured observability hooks for pipeline operations.
//!
//! - `PipelineSpan` RAII guard tags every event of one operation with the
//!   operation name and project path
//! - `emit_*` functions log the outcome of each pipeline stage
//!
//! Events are emitted at `info!` (failures at `warn!`). Filter with
//! `RUST_LOG`; pass `--json-logs` to the CLI for JSON lines.

use std::path::Path;

use tracing::{info, warn};

/// RAII guard that keeps an operation-scoped span entered.
///
/// ```ignore
/// let _span = PipelineSpan::enter("apply", project_dir);
/// // every event below carries operation = "apply" and the project path
/// ```
pub struct PipelineSpan {
    _span: tracing::span::EnteredSpan,
}

impl PipelineSpan {
    pub fn enter(operation: &str, project: &Path) -> Self {
        let span = tracing::info_span!(
            "depshift.op",
            operation = %operation,
            project = %project.display()
        );
        Self {
            _span: span.entered(),
        }
    }
}

pub fn emit_plan_completed(strategy: &str, proposals: usize, security: usize, skipped: usize) {
    info!(
        event = "plan.completed",
        strategy = %strategy,
        proposals = proposals,
        security = security,
        skipped = skipped,
    );
}

pub fn emit_mutation_finished(package: &str, version: &str, success: bool, message: &str) {
    if success {
        info!(event = "mutation.applied", package = %package, version = %version);
    } else {
        warn!(
            event = "mutation.failed",
            package = %package,
            version = %version,
            message = %message,
        );
    }
}

pub fn emit_recovery_attempted(method: &str, success: bool, message: &str) {
    info!(
        event = "recovery.attempt",
        method = %method,
        success = success,
        message = %message,
    );
}

pub fn emit_recovery_finished(method: &str, success: bool) {
    if success {
        info!(event = "recovery.finished", method = %method, success = true);
    } else {
        warn!(event = "recovery.finished", method = %method, success = false);
    }
}

pub fn emit_test_run_finished(
    success: bool,
    timed_out: bool,
    passed: u32,
    failed: u32,
    duration_ms: u64,
) {
    info!(
        event = "tests.finished",
        success = success,
        timed_out = timed_out,
        passed = passed,
        failed = failed,
        duration_ms = duration_ms,
    );
}

/// A scanner facet degraded to empty.
pub fn emit_scan_degraded(tool: &str, error: &dyn std::fmt::Display) {
    warn!(event = "scan.degraded", tool = %tool, error = %error);
}
