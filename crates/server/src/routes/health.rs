use axum::extract::State;
use axum::response::{IntoResponse, Json};
use serde_json::json;

use crate::state::AppState;

/// Root handler - shows API info
pub async fn root_handler() -> Json<serde_json::Value> {
    Json(json!({
        "name": "logtail",
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": {
            "logs": "/logs/{filename}?lineCount=&regex=",
            "files": "/files/{filename}?lineCount=&regex=",
            "health": "/health",
            "metrics": "/metrics"
        }
    }))
}

/// Health check handler. Peers are not probed; an unreachable peer only
/// drops out of merged responses.
pub async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!({
        "status": "healthy",
        "message": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "peers": state.aggregator.peers().len(),
    }))
}

/// Metrics endpoint
pub async fn metrics_handler(State(state): State<AppState>) -> impl IntoResponse {
    let snapshot = state.metrics.snapshot();
    Json(json!({
        "streams": {
            "active": snapshot.active_streams,
            "total": snapshot.total_streams,
        },
        "sent": {
            "records": snapshot.records_sent,
            "bytes": snapshot.bytes_sent,
            "mb": (snapshot.bytes_sent as f64) / (1024.0 * 1024.0),
        },
        "peers": {
            "merged": snapshot.peer_merged,
            "failures": snapshot.peer_failures,
        }
    }))
}
