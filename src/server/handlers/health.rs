use std::sync::Arc;

use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;
use serde_json::json;

use crate::state::AppState;

pub async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let stats = state.index.snapshot().map(|snapshot| snapshot.stats());
    Json(json!({
        "status": "ok",
        "index_ready": stats.is_some(),
        "chunks": stats.map(|s| s.chunks).unwrap_or(0),
    }))
}
