//! Branch spec resolution.
//!
//! A spec starting with `^` is a regular expression (the marker is kept as the
//! start anchor) matched against `git branch --list`. Anything else is taken
//! as a literal branch name; existence is not checked here.

use std::path::Path;

use futures::TryStreamExt;
use regex::Regex;
use tokio_util::sync::CancellationToken;

use crate::error::GitError;
use crate::git::command::GitCommand;
use crate::models::BranchInfo;

pub const PATTERN_MARKER: char = '^';
const CURRENT_MARKER: char = '*';

/// Parse one line of `git branch --list` output. Blank lines yield `None`.
pub fn parse_branch_line(line: &str) -> Option<BranchInfo> {
    if line.trim().is_empty() {
        return None;
    }

    let is_current = line.starts_with(CURRENT_MARKER);
    // Two-column prefix: marker ('*', '+' or ' ') and a space
    let name = line.get(2..).unwrap_or_else(|| line.trim()).to_string();

    Some(BranchInfo { name, is_current })
}

pub async fn list_branches(
    git: &GitCommand,
    work_dir: &Path,
    cancel: CancellationToken,
) -> Result<Vec<BranchInfo>, GitError> {
    let lines: Vec<String> = git
        .run(work_dir, ["branch", "--list"], cancel)
        .try_collect()
        .await?;

    Ok(lines.iter().filter_map(|line| parse_branch_line(line)).collect())
}

/// Resolve `spec` to the concrete branch names it denotes, in listing order.
pub async fn resolve_branches(
    git: &GitCommand,
    work_dir: &Path,
    spec: &str,
    cancel: CancellationToken,
) -> Result<Vec<String>, GitError> {
    if !spec.starts_with(PATTERN_MARKER) {
        return Ok(vec![spec.to_string()]);
    }

    let pattern = Regex::new(spec)?;
    let branches = list_branches(git, work_dir, cancel).await?;

    Ok(branches
        .into_iter()
        .map(|branch| branch.name)
        .filter(|name| pattern.is_match(name))
        .collect())
}
