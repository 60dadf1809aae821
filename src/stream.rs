//! Streaming JSON responses.
//!
//! Items are written to the response body one at a time as they arrive,
//! either as a JSON array (`[a,b,c]`) or, with a custom delimiter, as bare
//! objects joined by that delimiter with no brackets.
//!
//! The response is uncommitted until the first item (or normal completion)
//! is seen; until then a failure still becomes a regular `{"error": ...}`
//! response. After that the status line is gone, so a failure aborts the body
//! and the client sees a truncated transfer.
//!
//! `Uncommitted` and `Committed` are the two states of that latch. Only
//! `Uncommitted` can produce an error response.

use axum::body::Body;
use axum::http::header;
use axum::response::{IntoResponse, Response};
use futures::stream::{self, BoxStream, Stream, StreamExt};
use serde::Serialize;
use tokio_util::sync::{CancellationToken, DropGuard};

use crate::error::{AppError, StreamError};

const CONTENT_TYPE_JSON: &str = "application/json";

/// Nothing has been sent yet.
#[derive(Debug)]
pub struct Uncommitted {
    delimiter: Option<String>,
}

/// Status and headers are out; only body bytes may follow.
#[derive(Debug)]
pub struct Committed {
    delimiter: Option<String>,
}

impl Uncommitted {
    /// An empty delimiter selects JSON array framing.
    pub fn new(delimiter: &str) -> Self {
        let delimiter = (!delimiter.is_empty()).then(|| delimiter.to_string());
        Self { delimiter }
    }

    /// Commit with the first serialized item, returning the opening chunk.
    pub fn commit(self, first: Vec<u8>) -> (Committed, Vec<u8>) {
        let mut chunk = Vec::with_capacity(first.len() + 1);
        if self.delimiter.is_none() {
            chunk.push(b'[');
        }
        chunk.extend(first);
        (
            Committed {
                delimiter: self.delimiter,
            },
            chunk,
        )
    }

    /// The whole body for a stream that completed without items.
    pub fn empty(self) -> Vec<u8> {
        match self.delimiter {
            None => b"[]".to_vec(),
            Some(_) => Vec::new(),
        }
    }

    pub fn reject(self, err: AppError) -> Response {
        tracing::warn!(error = %err, "request failed before streaming started");
        err.into_response()
    }
}

impl Committed {
    pub fn item(&self, body: Vec<u8>) -> Vec<u8> {
        let separator: &[u8] = match &self.delimiter {
            None => b",",
            Some(delimiter) => delimiter.as_bytes(),
        };
        let mut chunk = Vec::with_capacity(separator.len() + body.len());
        chunk.extend_from_slice(separator);
        chunk.extend(body);
        chunk
    }

    pub fn finish(self) -> Vec<u8> {
        match self.delimiter {
            None => b"]".to_vec(),
            Some(_) => Vec::new(),
        }
    }

    pub fn fail(self, err: AppError) -> StreamError {
        StreamError::AlreadyCommitted(err)
    }
}

/// Writes a stream of results onto an HTTP response as it is produced.
///
/// Dropping the response body, or the future of `respond` before it
/// completes, cancels `cancel`.
pub struct StreamingResponder {
    delimiter: String,
    cancel: CancellationToken,
}

impl StreamingResponder {
    pub fn new(delimiter: impl Into<String>, cancel: CancellationToken) -> Self {
        Self {
            delimiter: delimiter.into(),
            cancel,
        }
    }

    pub async fn respond<S, T, E>(self, items: S) -> Response
    where
        S: Stream<Item = Result<T, E>> + Send + 'static,
        T: Serialize + Send + 'static,
        E: Into<AppError> + Send + 'static,
    {
        let guard = self.cancel.clone().drop_guard();
        let mut items = items
            .map(|item| item.map_err(|e| -> AppError { e.into() }))
            .take_until(self.cancel.clone().cancelled_owned())
            .boxed();
        let latch = Uncommitted::new(&self.delimiter);

        let (latch, opening) = match items.next().await {
            Some(Ok(item)) => match serde_json::to_vec(&item) {
                Ok(body) => latch.commit(body),
                Err(e) => return latch.reject(AppError::Serialize(e)),
            },
            Some(Err(err)) => return latch.reject(err),
            None => return json_response(Body::from(latch.empty())),
        };

        let state = BodyState {
            latch: Some(latch),
            pending: Some(opening),
            items,
            cancel: self.cancel,
            _guard: guard,
        };
        json_response(Body::from_stream(body_stream(state)))
    }
}

fn json_response(body: Body) -> Response {
    ([(header::CONTENT_TYPE, CONTENT_TYPE_JSON)], body).into_response()
}

struct BodyState<T> {
    /// `None` once the body has ended
    latch: Option<Committed>,
    pending: Option<Vec<u8>>,
    items: BoxStream<'static, Result<T, AppError>>,
    cancel: CancellationToken,
    _guard: DropGuard,
}

fn body_stream<T>(state: BodyState<T>) -> impl Stream<Item = Result<Vec<u8>, std::io::Error>> + Send
where
    T: Serialize + Send + 'static,
{
    stream::unfold(state, |mut state| async move {
        if let Some(chunk) = state.pending.take() {
            return Some((Ok(chunk), state));
        }
        let latch = state.latch.take()?;

        match state.items.next().await {
            Some(Ok(item)) => match serde_json::to_vec(&item) {
                Ok(body) => {
                    let chunk = latch.item(body);
                    state.latch = Some(latch);
                    Some((Ok(chunk), state))
                }
                Err(e) => Some((Err(std::io::Error::from(StreamError::Serialize(e))), state)),
            },
            Some(Err(err)) => {
                let failure = latch.fail(err);
                tracing::error!(error = %failure, "aborting response");
                Some((Err(std::io::Error::from(failure)), state))
            }
            None if state.cancel.is_cancelled() => {
                tracing::debug!("response stream cancelled");
                None
            }
            None => Some((Ok(latch.finish()), state)),
        }
    })
}
