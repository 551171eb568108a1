//! Cloning and updating the workspace copy of a remote repository

use std::path::{Path, PathBuf};
use std::process::Output;

use tokio::process::Command;
use tracing::{info, warn};
use url::Url;

use crate::{Error, Result};

/// Put `username:secret` into an https remote URL
pub fn inject_credentials(remote: &str, username: &str, secret: &str) -> Result<String> {
    let mut url = Url::parse(remote)
        .map_err(|e| Error::Config(format!("Invalid remote URL {}: {}", remote, e)))?;
    if !matches!(url.scheme(), "https" | "http") {
        return Ok(remote.to_string());
    }
    url.set_username(username)
        .and_then(|_| url.set_password(Some(secret)))
        .map_err(|_| Error::Config(format!("Cannot add credentials to {}", redact(remote))))?;
    Ok(url.to_string())
}

/// Strip credentials from a URL for display
pub fn redact(remote: &str) -> String {
    match Url::parse(remote) {
        Ok(mut url) if !url.username().is_empty() || url.password().is_some() => {
            let _ = url.set_username("");
            let _ = url.set_password(None);
            url.to_string()
        }
        _ => remote.to_string(),
    }
}

async fn run_git(args: &[&str], cwd: Option<&Path>) -> Result<Output> {
    let mut cmd = Command::new("git");
    cmd.args(args).env("GIT_TERMINAL_PROMPT", "0");
    if let Some(dir) = cwd {
        cmd.current_dir(dir);
    }
    cmd.output()
        .await
        .map_err(|e| Error::SourceControl(format!("Failed to run git {}: {}", args[0], e)))
}

/// Turn git's stderr into an error without leaking the credentialed URL
fn classify_failure(action: &str, remote: &str, stderr: &str) -> Error {
    let shown = redact(remote);
    let stderr = stderr.replace(remote, &shown);

    if stderr.contains("Authentication failed") || stderr.contains("Permission denied") {
        return Error::SourceControl(format!(
            "Authentication failed for {}. Check your token and repository access.",
            shown
        ));
    }
    if stderr.contains("Could not resolve host") {
        return Error::SourceControl(format!("Network error during git {} of {}", action, shown));
    }
    if stderr.contains("not found") || stderr.contains("does not exist") {
        return Error::SourceControl(format!("Repository or branch not found: {}", shown));
    }

    Error::SourceControl(format!("git {} failed: {}", action, stderr.trim()))
}

/// Clone `remote` at `branch` into `target`, or update an existing clone
///
/// An existing clone has its origin URL refreshed, `branch` checked out and
/// fast-forwarded. Pull failures are logged and the existing copy is used.
pub async fn clone_or_update(remote: &str, target: &Path, branch: &str) -> Result<PathBuf> {
    if target.join(".git").exists() {
        info!(path = %target.display(), branch, "Updating existing clone");

        let steps: [&[&str]; 3] = [
            &["remote", "set-url", "origin", remote],
            &["fetch", "origin", branch],
            &["checkout", branch],
        ];
        for args in steps {
            let output = run_git(args, Some(target)).await?;
            if !output.status.success() {
                return Err(classify_failure(
                    args[0],
                    remote,
                    &String::from_utf8_lossy(&output.stderr),
                ));
            }
        }

        let pull = run_git(&["pull", "--ff-only", "origin", branch], Some(target)).await?;
        if !pull.status.success() {
            warn!(
                path = %target.display(),
                stderr = %String::from_utf8_lossy(&pull.stderr)
                    .replace(remote, &redact(remote))
                    .trim(),
                "git pull failed, using existing checkout"
            );
        }
        return Ok(target.to_path_buf());
    }

    if let Some(parent) = target.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }

    info!(remote = %redact(remote), path = %target.display(), branch, "Cloning repository");
    let target_str = target
        .to_str()
        .ok_or_else(|| Error::Config(format!("Invalid clone path: {}", target.display())))?;
    let output = run_git(&["clone", "--branch", branch, remote, target_str], None).await?;
    if !output.status.success() {
        return Err(classify_failure(
            "clone",
            remote,
            &String::from_utf8_lossy(&output.stderr),
        ));
    }

    Ok(target.to_path_buf())
}
