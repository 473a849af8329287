pub mod files;
pub mod health;
pub mod logs;

use axum::extract::rejection::QueryRejection;
use axum::extract::Query;
use serde::Deserialize;
use tracing::debug;

use reader::{LineReaderOptions, ReverseLineReader};

use crate::error::{ApiError, ApiResult};
use crate::path::resolve_log_path;
use crate::state::AppState;

/// Query parameters shared by `/logs` and `/files`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TailQuery {
    /// Maximum number of lines to return; 0 = all.
    #[serde(rename = "lineCount", default)]
    pub line_count: u64,
    /// Only lines matching this pattern are returned (and counted).
    #[serde(default)]
    pub regex: Option<String>,
}

impl TailQuery {
    pub(crate) fn from_extracted(query: Result<Query<TailQuery>, QueryRejection>) -> ApiResult<Self> {
        query
            .map(|Query(query)| query)
            .map_err(|rejection| ApiError::InvalidRequest(rejection.body_text()))
    }

    fn reader_options(&self) -> LineReaderOptions {
        LineReaderOptions {
            line_limit: self.line_count,
            pattern: self.regex.clone(),
        }
    }
}

/// Resolve and open the requested file. Every failure here happens before
/// the response starts, so it still maps to a status code.
pub(crate) async fn open_tail(
    state: &AppState,
    filename: &str,
    query: &TailQuery,
) -> ApiResult<ReverseLineReader> {
    let path = resolve_log_path(&state.base_path, filename)?;
    let reader = ReverseLineReader::open(&path, query.reader_options())
        .await?
        .with_chunk_size(state.config.logs.chunk_size);

    debug!(
        file = %filename,
        line_count = query.line_count,
        regex = query.regex.as_deref().unwrap_or(""),
        "Tail opened"
    );
    Ok(reader)
}
