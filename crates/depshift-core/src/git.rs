//! Git integration for restoring project files to the last commit.

use std::path::Path;
use std::process::{Command, Output};

use crate::domain::{DepshiftError, Result};

fn git(dir: &Path, args: &[&str]) -> Result<Output> {
    Command::new("git")
        .args(args)
        .current_dir(dir)
        .output()
        .map_err(|e| DepshiftError::Git(format!("failed to run git: {e}")))
}

/// Check whether a directory is inside a git work tree.
pub fn is_git_repo(dir: &Path) -> bool {
    git(dir, &["rev-parse", "--is-inside-work-tree"])
        .map(|o| o.status.success())
        .unwrap_or(false)
}

/// Capture the HEAD commit SHA. Fails outside a repository or before the
/// first commit.
pub fn capture_head_sha(dir: &Path) -> Result<String> {
    let output = git(dir, &["rev-parse", "--verify", "HEAD"])?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(DepshiftError::Git(format!(
            "git rev-parse HEAD failed: {}",
            stderr.trim()
        )));
    }

    let sha = String::from_utf8_lossy(&output.stdout).trim().to_string();
    if sha.is_empty() {
        return Err(DepshiftError::Git(
            "git rev-parse HEAD returned empty output".to_string(),
        ));
    }
    Ok(sha)
}

/// Whether `file` (relative to `dir`) is tracked in HEAD.
pub fn is_tracked_in_head(dir: &Path, file: &str) -> bool {
    git(dir, &["cat-file", "-e", &format!("HEAD:./{file}")])
        .map(|o| o.status.success())
        .unwrap_or(false)
}

/// Whether `file` differs from HEAD (staged or unstaged).
pub fn is_modified(dir: &Path, file: &str) -> Result<bool> {
    let output = git(dir, &["status", "--porcelain", "--", file])?;
    if !output.status.success() {
        return Err(DepshiftError::Git(format!(
            "git status failed: {}",
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }
    Ok(!String::from_utf8_lossy(&output.stdout).trim().is_empty())
}

/// Overwrite `file` in the work tree (and index) with its HEAD version.
pub fn checkout_from_head(dir: &Path, file: &str) -> Result<()> {
    let output = git(dir, &["checkout", "HEAD", "--", file])?;
    if !output.status.success() {
        return Err(DepshiftError::Git(format!(
            "git checkout HEAD -- {file} failed: {}",
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }
    Ok(())
}
