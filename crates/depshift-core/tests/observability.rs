//! Observability tests for depshift pipeline tracing.
//!
//! Each pipeline stage emits one structured event; these check the event
//! names and the fields operators filter on.

use std::path::Path;

use depshift_core::obs::{
    emit_mutation_finished, emit_plan_completed, emit_recovery_attempted,
    emit_recovery_finished, emit_scan_degraded, emit_test_run_finished, PipelineSpan,
};
use depshift_core::{plan, AuditSnapshot, RiskStrategy, METRICS};
use tracing_test::traced_test;

#[traced_test]
#[test]
fn test_emit_plan_completed() {
    emit_plan_completed("balanced", 3, 1, 2);
    assert!(logs_contain("plan.completed"));
    assert!(logs_contain("strategy=balanced"));
    assert!(logs_contain("proposals=3"));
    assert!(logs_contain("skipped=2"));
}

#[traced_test]
#[test]
fn test_plan_logs_its_completion() {
    let snapshot = AuditSnapshot::from_json(
        r#"{"outdated_packages":[{"name":"jest","current":"29.0.0","wanted":"29.0.3","latest":"29.0.5"}]}"#,
    )
    .unwrap();
    let set = plan(&snapshot, RiskStrategy::Conservative);
    assert_eq!(set.len(), 1);
    assert!(logs_contain("plan.completed"));
    assert!(logs_contain("strategy=conservative"));
}

#[traced_test]
#[test]
fn test_emit_mutation_finished_success_and_failure() {
    emit_mutation_finished("lodash", "4.17.21", true, "installed");
    assert!(logs_contain("mutation.applied"));
    assert!(!logs_contain("mutation.failed"));

    emit_mutation_finished("lodash", "4.17.21", false, "install timed out after 1s");
    assert!(logs_contain("mutation.failed"));
    assert!(logs_contain("package=lodash"));
    assert!(logs_contain("install timed out after 1s"));
}

#[traced_test]
#[test]
fn test_emit_recovery_events() {
    emit_recovery_attempted("git", false, "not a git repository");
    emit_recovery_attempted("backup", true, "restored package.json");
    emit_recovery_finished("backup", true);
    emit_recovery_finished("manual", false);

    assert!(logs_contain("recovery.attempt"));
    assert!(logs_contain("method=git"));
    assert!(logs_contain("not a git repository"));
    assert!(logs_contain("recovery.finished"));
    assert!(logs_contain("method=manual"));
}

#[traced_test]
#[test]
fn test_emit_test_run_finished() {
    emit_test_run_finished(false, true, 0, 0, 300_000);
    assert!(logs_contain("tests.finished"));
    assert!(logs_contain("timed_out=true"));
    assert!(logs_contain("duration_ms=300000"));
}

#[traced_test]
#[test]
fn test_emit_scan_degraded() {
    emit_scan_degraded("npm audit --json", &"unparseable JSON");
    assert!(logs_contain("scan.degraded"));
    assert!(logs_contain("npm audit --json"));
    assert!(logs_contain("unparseable JSON"));
}

#[traced_test]
#[test]
fn test_pipeline_span_nests_events() {
    let span = PipelineSpan::enter("apply", Path::new("/tmp/project"));
    emit_mutation_finished("react", "18.2.0", true, "ok");
    drop(span);
    assert!(logs_contain("depshift.op"));
    assert!(logs_contain("operation=apply"));
    assert!(logs_contain("package=react"));
}

#[traced_test]
#[test]
fn test_metrics_flush() {
    METRICS.inc_proposals_planned(2);
    METRICS.record_mutation(true);
    METRICS.flush();
    assert!(METRICS.proposals_planned() >= 2);
    assert!(logs_contain("metric=\"flush\""));
    assert!(logs_contain("proposals_planned="));
}
