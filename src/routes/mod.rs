//! API route handlers - maps HTTP endpoints to git operations.
//!
//! Each submodule defines routes for a feature area:
//! - `repositories`: Repository listing and name resolution
//! - `grep`: Streaming search across repositories and branches
//!
//! All routes live under the configured path prefix.

pub mod grep;
pub mod repositories;

use axum::http::header;
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::git::SharedState;

pub fn create_router(state: SharedState) -> Router {
    let api = Router::new()
        .merge(repositories::routes(state.clone()))
        .merge(grep::routes(state.clone()));

    if state.config.prefix.is_empty() {
        api
    } else {
        Router::new().nest(&state.config.prefix, api)
    }
}

/// The full application: routes plus the configured middleware.
pub fn app(state: SharedState) -> Router {
    let install_middleware = state.config.install_middleware;
    let mut app = create_router(state);

    if install_middleware {
        let cors = CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
            .expose_headers([header::TRANSFER_ENCODING]);
        app = app.layer(cors);
    }

    app.layer(TraceLayer::new_for_http())
}
