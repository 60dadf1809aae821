//! Streaming grep endpoint.
//!
//! GET /repo/{repos}/grep/{branches}?q=&path=&ignore_case=&pattern_type=&target_line_no=&delimiter=
//!
//! Streams `{branch, file, line_no, line, repo}` objects as git produces them.
//! With an empty `delimiter` the body is a JSON array, otherwise the objects
//! are joined by the delimiter. Failures of individual repositories or branches
//! are logged and skipped; request errors before the first byte are `400`.

use axum::{
    extract::{Path, Query, State},
    response::Response,
    routing::get,
    Router,
};
use futures::StreamExt;
use serde::Deserialize;
use tokio_util::sync::CancellationToken;

use crate::error::{AppError, Result};
use crate::git::grep::GrepQuery;
use crate::git::SharedState;
use crate::search::{search, SearchRequest};
use crate::stream::StreamingResponder;

pub fn routes(state: SharedState) -> Router {
    Router::new()
        .route("/repo/{repos}/grep/{branches}", get(grep))
        .with_state(state)
}

#[derive(Debug, Default, Deserialize)]
struct GrepParams {
    q: Option<String>,
    path: Option<String>,
    ignore_case: Option<String>,
    pattern_type: Option<String>,
    target_line_no: Option<String>,
    #[serde(default)]
    delimiter: String,
}

impl GrepParams {
    fn query(&self) -> Result<GrepQuery> {
        let defaults = GrepQuery::default();
        Ok(GrepQuery {
            pattern: non_empty(&self.q).unwrap_or(defaults.pattern),
            file_glob: non_empty(&self.path).unwrap_or(defaults.file_glob),
            ignore_case: self.ignore_case.as_deref().is_some_and(is_truthy),
            pattern_type: non_empty(&self.pattern_type).unwrap_or(defaults.pattern_type),
            target_line: self.target_line()?,
        })
    }

    fn target_line(&self) -> Result<Option<u64>> {
        let Some(raw) = self.target_line_no.as_deref().filter(|s| !s.is_empty()) else {
            return Ok(None);
        };
        let line: u64 = raw
            .parse()
            .map_err(|_| AppError::InvalidParameter(format!("target_line_no: {}", raw)))?;
        Ok((line != 0).then_some(line))
    }
}

fn non_empty(value: &Option<String>) -> Option<String> {
    value.as_ref().filter(|v| !v.is_empty()).cloned()
}

fn is_truthy(value: &str) -> bool {
    !matches!(value, "" | "0" | "false")
}

async fn grep(
    State(state): State<SharedState>,
    Path((repos, branches)): Path<(String, String)>,
    Query(params): Query<GrepParams>,
) -> Result<Response> {
    let query = params.query()?;
    let repos = state.repos.resolve(&repos).await?;

    tracing::info!(?repos, branches = %branches, pattern = %query.pattern, "grep");

    let cancel = CancellationToken::new();
    let request = SearchRequest {
        repos,
        branches,
        query,
    };
    let matches = search(state.git.clone(), state.repos.clone(), request, cancel.clone());

    let response = StreamingResponder::new(params.delimiter, cancel)
        .respond(matches.map(Ok::<_, AppError>))
        .await;
    Ok(response)
}
