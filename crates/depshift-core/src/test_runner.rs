//! Bounded test execution.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::DepshiftConfig;
use crate::domain::Result;
use crate::obs::emit_test_run_finished;
use crate::package_manager::PackageManager;
use crate::process::{run_bounded, tail, CommandOutcome, CommandSpec};
use crate::test_output::{self, TestCounts};

const OUTPUT_TAIL_LINES: usize = 40;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestRunOptions {
    pub time_budget: Duration,
    pub package_manager: Option<PackageManager>,
    /// Replaces `<pm> test`.
    pub command: Option<Vec<String>>,
}

impl Default for TestRunOptions {
    fn default() -> Self {
        Self {
            time_budget: Duration::from_secs(300),
            package_manager: None,
            command: None,
        }
    }
}

impl TestRunOptions {
    pub fn from_config(config: &DepshiftConfig) -> Self {
        Self {
            time_budget: config.test_timeout(),
            package_manager: config.package_manager,
            command: config.test_command.clone(),
        }
    }
}

/// Outcome of one test run. `success` comes from the exit code only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestRunReport {
    pub success: bool,
    pub command: String,
    #[serde(default)]
    pub exit_code: Option<i32>,
    pub timed_out: bool,
    pub counts: TestCounts,
    pub duration_ms: u64,
    pub output_tail: String,
    pub message: String,
}

/// Run the project's tests within the budget.
///
/// Errors only when the command cannot be launched; a timeout is a failed
/// report with `timed_out` set.
pub async fn run_tests(project: &Path, options: &TestRunOptions) -> Result<TestRunReport> {
    let pm = PackageManager::resolve(project, options.package_manager);
    let spec = match &options.command {
        Some(argv) => CommandSpec::from_argv(argv)?,
        None => pm.test_command(),
    };

    let report = match run_bounded(&spec, project, options.time_budget).await? {
        CommandOutcome::Completed(output) => {
            let combined = output.combined();
            let counts = test_output::parse(&combined);
            let message = match (output.success, counts.recognized) {
                (true, true) => format!("{} passed of {}", counts.passed, counts.total),
                (true, false) => "tests passed (summary not recognized)".to_string(),
                (false, true) => format!(
                    "{} failed, {} passed of {}",
                    counts.failed, counts.passed, counts.total
                ),
                (false, false) => format!(
                    "`{}` exited with {}",
                    spec.display(),
                    output
                        .exit_code
                        .map(|c| format!("code {c}"))
                        .unwrap_or_else(|| "a signal".to_string())
                ),
            };
            TestRunReport {
                success: output.success,
                command: spec.display(),
                exit_code: output.exit_code,
                timed_out: false,
                counts,
                duration_ms: output.duration_ms,
                output_tail: tail(&combined, OUTPUT_TAIL_LINES),
                message,
            }
        }
        CommandOutcome::TimedOut { after } => TestRunReport {
            success: false,
            command: spec.display(),
            exit_code: None,
            timed_out: true,
            counts: TestCounts::unrecognized(),
            duration_ms: after.as_millis() as u64,
            output_tail: String::new(),
            message: format!(
                "tests timed out after {after:?}; the result is unknown, rerun with a larger budget"
            ),
        },
    };

    emit_test_run_finished(
        report.success,
        report.timed_out,
        report.counts.passed,
        report.counts.failed,
        report.duration_ms,
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn argv(parts: &[&str]) -> Option<Vec<String>> {
        Some(parts.iter().map(|s| s.to_string()).collect())
    }

    #[tokio::test]
    async fn test_passing_run_parses_counts() {
        let dir = tempfile::tempdir().unwrap();
        let options = TestRunOptions {
            command: argv(&["sh", "-c", "echo '  3 passing (4ms)'"]),
            ..TestRunOptions::default()
        };
        let report = run_tests(dir.path(), &options).await.unwrap();
        assert!(report.success);
        assert_eq!(report.counts.passed, 3);
        assert_eq!(report.exit_code, Some(0));
    }

    #[tokio::test]
    async fn test_exit_code_is_authoritative() {
        let dir = tempfile::tempdir().unwrap();
        let options = TestRunOptions {
            command: argv(&["sh", "-c", "echo 'Tests:       4 passed, 4 total'; exit 1"]),
            ..TestRunOptions::default()
        };
        let report = run_tests(dir.path(), &options).await.unwrap();
        assert!(!report.success);
        assert_eq!(report.counts.failed, 0);
        assert_eq!(report.counts.passed, 4);
    }

    #[tokio::test]
    async fn test_timeout_is_explicit_failure() {
        let dir = tempfile::tempdir().unwrap();
        let options = TestRunOptions {
            command: argv(&["sleep", "5"]),
            time_budget: Duration::from_millis(100),
            ..TestRunOptions::default()
        };
        let report = run_tests(dir.path(), &options).await.unwrap();
        assert!(!report.success);
        assert!(report.timed_out);
        assert!(report.message.contains("timed out"));
    }

    #[tokio::test]
    async fn test_missing_binary_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let options = TestRunOptions {
            command: argv(&["depshift-no-such-runner"]),
            ..TestRunOptions::default()
        };
        assert!(run_tests(dir.path(), &options).await.is_err());
    }
}
