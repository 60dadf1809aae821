//! Application error types and HTTP response mapping.
//!
//! - `GitError`: failures of a single git invocation (spawn, read, exit, parse)
//! - `AppError`: request-level failures, rendered as `{"error": ...}` bodies
//! - `StreamError`: failures that happen after the response was committed
//!
//! Every `AppError` maps to 400: once a request reaches a handler, the
//! only failures left are bad input or a response that cannot be encoded.

use std::process::ExitStatus;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum GitError {
    #[error("Failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to read process output: {0}")]
    Io(#[from] std::io::Error),

    #[error("{program} exited with {status}: {stderr}")]
    Exit {
        program: String,
        status: ExitStatus,
        stderr: String,
    },

    #[error("Malformed output line: {0}")]
    MalformedLine(String),

    #[error("Invalid pattern: {0}")]
    InvalidPattern(#[from] regex::Error),
}

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Git error: {0}")]
    Git(#[from] GitError),

    #[error("Repository not found: {0}")]
    RepoNotFound(String),

    #[error("Invalid repository name: {0}")]
    InvalidRepoName(String),

    #[error("Invalid pattern: {0}")]
    InvalidPattern(#[from] regex::Error),

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to serialize response item: {0}")]
    Serialize(#[from] serde_json::Error),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = StatusCode::BAD_REQUEST;
        let body = Json(json!({
            "error": self.to_string(),
        }));

        (status, body).into_response()
    }
}

/// Raised when a failure arrives after the response status and headers were
/// already sent. The body can no longer carry a structured error.
#[derive(Error, Debug)]
pub enum StreamError {
    #[error("Response already committed: {0}")]
    AlreadyCommitted(#[source] AppError),

    #[error("Failed to serialize item: {0}")]
    Serialize(#[from] serde_json::Error),
}

impl From<StreamError> for std::io::Error {
    fn from(err: StreamError) -> Self {
        std::io::Error::other(err)
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
