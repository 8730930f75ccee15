use std::sync::Arc;

use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;
use serde_json::json;

use crate::core::errors::ApiError;
use crate::state::AppState;

/// Re-reads the documents directory and swaps in a fresh index. Queries in
/// flight keep the snapshot they started with.
pub async fn rebuild(State(state): State<Arc<AppState>>) -> Result<impl IntoResponse, ApiError> {
    let built = state.index_documents().await.map_err(|e| {
        tracing::error!("Index rebuild failed: {}", e);
        ApiError::internal(e)
    })?;

    Ok(Json(json!({
        "status": "rebuilt",
        "strategy": built.strategy_used.to_string(),
        "chunks": built.value.chunks,
        "dimension": built.value.dimension,
    })))
}
