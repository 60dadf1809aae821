//! Server configuration.
//!
//! Values come from the command line (see `Cli` in main.rs); anything not
//! given falls back to the defaults below.

use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// Path prefix for every route, normalized to `/foo` or empty
    pub prefix: String,
    pub repo_dir: PathBuf,
    /// Install the permissive CORS layer
    pub install_middleware: bool,
    /// The git executable
    pub git: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            prefix: String::new(),
            repo_dir: PathBuf::from("/tmp/git"),
            install_middleware: false,
            git: "git".to_string(),
        }
    }
}

impl ServerConfig {
    pub fn with_prefix(mut self, prefix: &str) -> Self {
        self.prefix = normalize_prefix(prefix);
        self
    }
}

pub fn normalize_prefix(prefix: &str) -> String {
    let trimmed = prefix.trim().trim_matches('/');
    if trimmed.is_empty() {
        String::new()
    } else {
        format!("/{}", trimmed)
    }
}
