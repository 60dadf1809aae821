use std::path::{Path, PathBuf};
use std::sync::Arc;

use regex::Regex;

use crate::config::ServerConfig;
use crate::error::{AppError, Result};
use crate::git::branches::PATTERN_MARKER;
use crate::git::command::GitCommand;

/// Directory holding the served repositories, one per subdirectory.
#[derive(Debug, Clone)]
pub struct RepoRoot {
    path: PathBuf,
}

impl RepoRoot {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn repo_path(&self, name: &str) -> PathBuf {
        self.path.join(name)
    }

    /// Repository directory names, hidden entries skipped, sorted alphabetically.
    pub async fn list(&self) -> Result<Vec<String>> {
        let mut entries = tokio::fs::read_dir(&self.path).await?;
        let mut names = Vec::new();

        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name().to_string_lossy().to_string();
            if name.starts_with('.') {
                continue;
            }
            if !entry.file_type().await?.is_dir() {
                continue;
            }
            names.push(name);
        }

        names.sort_by(|a, b| a.to_lowercase().cmp(&b.to_lowercase()));
        Ok(names)
    }

    /// Resolve a repository spec to existing repository names.
    ///
    /// `^...` is matched as a regex against `list()`. A literal name resolves
    /// to itself or to `<name>.git`.
    pub async fn resolve(&self, spec: &str) -> Result<Vec<String>> {
        if spec.starts_with(PATTERN_MARKER) {
            let pattern = Regex::new(spec)?;
            let names = self.list().await?;
            return Ok(names.into_iter().filter(|name| pattern.is_match(name)).collect());
        }

        validate_name(spec)?;

        if tokio::fs::try_exists(self.repo_path(spec)).await? {
            return Ok(vec![spec.to_string()]);
        }

        let bare = format!("{}.git", spec);
        if tokio::fs::try_exists(self.repo_path(&bare)).await? {
            return Ok(vec![bare]);
        }

        Err(AppError::RepoNotFound(spec.to_string()))
    }
}

fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() || name == "." || name == ".." || name.contains(['/', '\\']) {
        return Err(AppError::InvalidRepoName(name.to_string()));
    }
    Ok(())
}

/// State shared by every request handler.
pub struct AppState {
    pub config: ServerConfig,
    pub git: GitCommand,
    pub repos: RepoRoot,
}

impl AppState {
    pub fn new(config: ServerConfig) -> Self {
        Self {
            git: GitCommand::new(config.git.clone()),
            repos: RepoRoot::new(&config.repo_dir),
            config,
        }
    }
}

pub type SharedState = Arc<AppState>;
