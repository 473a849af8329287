use axum::body::Body;
use axum::extract::rejection::QueryRejection;
use axum::extract::{Path, Query, RawQuery, State};
use axum::http::{header, HeaderMap};
use axum::response::{IntoResponse, Response};

use super::{open_tail, TailQuery};
use crate::error::ApiResult;
use crate::federation::{PeerRequest, FEDERATED_HEADER};
use crate::state::AppState;

pub const CONTENT_TYPE: &str = "application/jsonl";

/// GET /logs/{filename}?lineCount=&regex=
///
/// Most recent local lines first as JSON records, merged with the same
/// request served by every secondary host. Requests already forwarded by
/// a peer are answered locally only.
pub async fn tail_logs(
    State(state): State<AppState>,
    Path(filename): Path<String>,
    RawQuery(raw_query): RawQuery,
    headers: HeaderMap,
    query: Result<Query<TailQuery>, QueryRejection>,
) -> ApiResult<Response> {
    let query = TailQuery::from_extracted(query)?;
    let reader = open_tail(&state, &filename, &query).await?;

    let federate = !headers.contains_key(FEDERATED_HEADER);
    let local = reader.into_framed(state.framer.clone());
    let merged = state.aggregator.aggregate(
        local,
        PeerRequest {
            filename,
            query: raw_query,
        },
        federate,
    );

    Ok(([(header::CONTENT_TYPE, CONTENT_TYPE)], Body::from_stream(merged)).into_response())
}
