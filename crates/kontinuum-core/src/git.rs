//! Git command wrappers used to synchronize work trees.
//!
//! Every helper shells out to the `git` binary. Failures become
//! [`KontinuumError::Git`] carrying the subcommand and git's stderr.

use std::path::Path;
use std::process::Stdio;

use regex::Regex;
use tokio::process::Command;
use tracing::trace;

use crate::domain::{KontinuumError, Result};

/// Index mode of a gitlink (submodule) entry.
const GITLINK_MODE: &str = "160000";

async fn run_git(dir: &Path, args: &[&str], label: &str) -> Result<String> {
    trace!(dir = %dir.display(), command = %label, "running git");
    let output = Command::new("git")
        .args(args)
        .current_dir(dir)
        .env("GIT_TERMINAL_PROMPT", "0")
        .stdin(Stdio::null())
        .output()
        .await
        .map_err(|e| KontinuumError::Git {
            command: label.to_string(),
            message: format!("failed to run git: {e}"),
        })?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        return Err(KontinuumError::Git {
            command: label.to_string(),
            message: if stderr.is_empty() {
                format!("exited with {}", output.status)
            } else {
                stderr
            },
        });
    }

    Ok(String::from_utf8_lossy(&output.stdout).to_string())
}

/// Clone `url` into `dest`, submodules included. Credentials embedded in
/// the URL are scrubbed from error messages.
pub async fn clone_recursive(url: &str, dest: &Path) -> Result<()> {
    let parent = dest.parent().unwrap_or_else(|| Path::new("."));
    tokio::fs::create_dir_all(parent).await?;
    let dest_str = dest.to_string_lossy();
    run_git(
        parent,
        &["clone", "--quiet", "--recurse-submodules", url, &dest_str],
        "clone",
    )
    .await
    .map_err(|err| match err {
        KontinuumError::Git { command, message } => KontinuumError::Git {
            command,
            message: redact_credentials(&message),
        },
        other => other,
    })?;
    Ok(())
}

/// Replace `user:secret@` userinfo in URLs with `***@`.
pub fn redact_credentials(text: &str) -> String {
    match Regex::new(r"://[^/@\s]+@") {
        Ok(re) => re.replace_all(text, "://***@").into_owned(),
        Err(_) => text.to_string(),
    }
}

/// Fetch from the default remote.
pub async fn fetch(repo_dir: &Path) -> Result<()> {
    run_git(repo_dir, &["fetch", "--quiet", "--tags"], "fetch").await?;
    Ok(())
}

/// Check out `rev` as a detached HEAD, discarding local modifications left
/// behind by earlier builds.
pub async fn checkout(repo_dir: &Path, rev: &str) -> Result<()> {
    run_git(
        repo_dir,
        &["-c", "advice.detachedHead=false", "checkout", "--quiet", "--force", rev],
        &format!("checkout {rev}"),
    )
    .await?;
    Ok(())
}

/// Full message of the HEAD commit.
pub async fn head_message(repo_dir: &Path) -> Result<String> {
    let out = run_git(repo_dir, &["log", "-1", "--format=%B"], "log").await?;
    Ok(out.trim_end().to_string())
}

/// Paths of all submodules recorded in the index, in index order.
pub async fn submodule_paths(repo_dir: &Path) -> Result<Vec<String>> {
    let out = run_git(repo_dir, &["ls-files", "--stage"], "ls-files").await?;
    Ok(parse_gitlinks(&out))
}

/// `git submodule update --init --recursive` for the whole tree.
pub async fn submodule_update(repo_dir: &Path) -> Result<()> {
    run_git(
        repo_dir,
        &["submodule", "update", "--init", "--recursive", "--quiet"],
        "submodule update",
    )
    .await?;
    Ok(())
}

/// Whether `dir` holds an initialized repository (a `.git` dir or file).
pub fn is_initialized(dir: &Path) -> bool {
    dir.join(".git").exists()
}

/// Extract gitlink paths from `git ls-files --stage` output.
///
/// Lines look like `160000 <sha> 0\tpath/to/module`.
pub fn parse_gitlinks(ls_files: &str) -> Vec<String> {
    ls_files
        .lines()
        .filter_map(|line| {
            let (meta, path) = line.split_once('\t')?;
            let mode = meta.split_whitespace().next()?;
            (mode == GITLINK_MODE).then(|| path.to_string())
        })
        .collect()
}
