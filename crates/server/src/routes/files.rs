use axum::body::Body;
use axum::extract::rejection::QueryRejection;
use axum::extract::{Path, Query, State};
use axum::http::header;
use axum::response::{IntoResponse, Response};
use futures::StreamExt;

use reader::RawLineFramer;

use super::{open_tail, TailQuery};
use crate::error::ApiResult;
use crate::state::AppState;

pub const CONTENT_TYPE: &str = "text/plain; charset=utf-8";

/// GET /files/{filename}?lineCount=&regex=
///
/// Raw local tail: line bytes as stored, newest first, no framing and no
/// federation.
pub async fn tail_file(
    State(state): State<AppState>,
    Path(filename): Path<String>,
    query: Result<Query<TailQuery>, QueryRejection>,
) -> ApiResult<Response> {
    let query = TailQuery::from_extracted(query)?;
    let reader = open_tail(&state, &filename, &query).await?;

    let guard = state.metrics.stream_started();
    let metrics = state.metrics.clone();
    let body = reader.into_framed(RawLineFramer).map(move |item| {
        let _active = &guard;
        item.map(|line| {
            metrics.record_sent(&line);
            line
        })
        .map_err(std::io::Error::from)
    });

    Ok(([(header::CONTENT_TYPE, CONTENT_TYPE)], Body::from_stream(body)).into_response())
}
