//! Repository listing and resolution.
//!
//! - GET /
//!   Repository directory names under the configured root.
//!
//! - GET /repo/{repos}
//!   Echoes the resolved repository name(s). `^...` is a regex over the
//!   listing; a literal name may resolve to `<name>.git`.

use axum::{
    extract::{Path, State},
    routing::get,
    Json, Router,
};

use crate::error::Result;
use crate::git::SharedState;

pub fn routes(state: SharedState) -> Router {
    Router::new()
        .route("/", get(list_repositories))
        .route("/repo/{repos}", get(get_repositories))
        .with_state(state)
}

async fn list_repositories(State(state): State<SharedState>) -> Result<Json<Vec<String>>> {
    tracing::info!(root = %state.repos.path().display(), "list repositories");
    let repos = state.repos.list().await?;
    Ok(Json(repos))
}

async fn get_repositories(
    State(state): State<SharedState>,
    Path(repos): Path<String>,
) -> Result<Json<Vec<String>>> {
    let resolved = state.repos.resolve(&repos).await?;
    tracing::info!(spec = %repos, ?resolved, "get repos");
    Ok(Json(resolved))
}
