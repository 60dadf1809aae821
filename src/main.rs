//! Git Grep API - search many git repositories over HTTP
//!
//! # Usage
//! ```bash
//! git-grep-api --repo-dir /srv/git                 # Serve every repo under /srv/git
//! git-grep-api --repo-dir /srv/git --prefix /api   # Mount routes under /api
//! git-grep-api --install-middleware                # Enable permissive CORS
//! ```
//!
//! # Endpoints
//! - `GET /`                              repository names
//! - `GET /repo/{repos}`                  resolved repository names
//! - `GET /repo/{repos}/grep/{branches}`  streamed grep hits

mod config;
mod error;
mod git;
mod models;
mod routes;
mod search;
mod stream;

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use config::ServerConfig;
use git::AppState;

/// Git Grep API - Stream git grep results from many repositories
#[derive(Parser)]
#[command(name = "git-grep-api")]
#[command(about = "Search git repositories over HTTP", long_about = None)]
struct Cli {
    /// Directory containing the repositories to serve
    #[arg(long, env = "GIT_GREP_REPO_DIR", default_value = "/tmp/git")]
    repo_dir: PathBuf,

    /// Path prefix for every route
    #[arg(long, env = "GIT_GREP_PREFIX", default_value = "")]
    prefix: String,

    /// Install CORS middleware
    #[arg(long, env = "GIT_GREP_INSTALL_MIDDLEWARE")]
    install_middleware: bool,

    /// git executable to run
    #[arg(long, default_value = "git")]
    git: String,

    /// Address to bind
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    /// Port to run the server on
    #[arg(short, long, default_value = "3001")]
    port: u16,
}

impl Cli {
    fn server_config(&self) -> ServerConfig {
        ServerConfig {
            repo_dir: self.repo_dir.clone(),
            install_middleware: self.install_middleware,
            git: self.git.clone(),
            ..ServerConfig::default()
        }
        .with_prefix(&self.prefix)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = cli.server_config();
    if !config.repo_dir.is_dir() {
        eprintln!("✗ Repository directory not found: {}", config.repo_dir.display());
        std::process::exit(1);
    }

    let prefix = config.prefix.clone();
    let repo_dir = config.repo_dir.clone();
    let app = routes::app(Arc::new(AppState::new(config)));

    let addr = format!("{}:{}", cli.host, cli.port);
    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(l) => l,
        Err(e) => {
            eprintln!("✗ Failed to bind to {}: {}", addr, e);
            eprintln!("  Try a different port with --port <PORT>");
            std::process::exit(1);
        }
    };

    tracing::info!(
        addr = %addr,
        repo_dir = %repo_dir.display(),
        prefix = %prefix,
        "git-grep-api listening"
    );

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
        tracing::info!("shutting down");
    };

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;

    Ok(())
}
