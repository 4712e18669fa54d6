//! Bounded execution of external commands.
//!
//! Every external tool (installer, test runner, scanners) runs through
//! [`run_bounded`]. A command that outlives its budget is killed and reported
//! as [`CommandOutcome::TimedOut`], never as an ambiguous success.

use std::path::Path;
use std::process::Stdio;
use std::time::{Duration, Instant};

use tokio::process::Command;
use tracing::debug;

use crate::domain::{DepshiftError, Result};

/// Program plus arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
}

impl CommandSpec {
    pub fn new<I, S>(program: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    /// Build from an argv list such as a configured override.
    pub fn from_argv(argv: &[String]) -> Result<Self> {
        let (program, args) = argv.split_first().ok_or_else(|| DepshiftError::CommandFailed {
            command: String::new(),
            message: "empty command".to_string(),
        })?;
        Ok(Self::new(program.clone(), args.iter().cloned()))
    }

    pub fn display(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Captured output of a command that ran to completion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    /// `None` when the process was terminated by a signal.
    pub exit_code: Option<i32>,
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
    pub duration_ms: u64,
}

impl CommandOutput {
    /// stdout followed by stderr.
    pub fn combined(&self) -> String {
        if self.stderr.is_empty() {
            self.stdout.clone()
        } else if self.stdout.is_empty() {
            self.stderr.clone()
        } else {
            format!("{}\n{}", self.stdout, self.stderr)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandOutcome {
    Completed(CommandOutput),
    TimedOut { after: Duration },
}

/// Run `spec` in `cwd`, killing it if it outlives `budget`.
///
/// Returns an error only when the process cannot be launched.
pub async fn run_bounded(spec: &CommandSpec, cwd: &Path, budget: Duration) -> Result<CommandOutcome> {
    let start = Instant::now();
    debug!(command = %spec.display(), cwd = %cwd.display(), budget_ms = budget.as_millis() as u64, "spawning");

    let child = Command::new(&spec.program)
        .args(&spec.args)
        .current_dir(cwd)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| DepshiftError::CommandFailed {
            command: spec.display(),
            message: format!("failed to launch: {e}"),
        })?;

    let output = match tokio::time::timeout(budget, child.wait_with_output()).await {
        Ok(result) => result?,
        Err(_) => return Ok(CommandOutcome::TimedOut { after: budget }),
    };

    Ok(CommandOutcome::Completed(CommandOutput {
        exit_code: output.status.code(),
        success: output.status.success(),
        stdout: String::from_utf8_lossy(&output.stdout).to_string(),
        stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        duration_ms: start.elapsed().as_millis() as u64,
    }))
}

/// Last `max_lines` lines of `text`.
pub fn tail(text: &str, max_lines: usize) -> String {
    let lines: Vec<&str> = text.lines().collect();
    let start = lines.len().saturating_sub(max_lines);
    lines[start..].join("\n")
}
