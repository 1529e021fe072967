//! Queue depth endpoint.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use serde::Serialize;

use crate::AppState;
use crate::error::ApiError;

#[derive(Debug, Serialize)]
pub struct QueueSize {
    pub stream: String,
    pub size: u64,
}

/// GET /queue/size: number of entries still in the work stream.
///
/// Counts pending entries too; an entry leaves the stream only once it has
/// been acknowledged and deleted.
pub async fn size(State(state): State<Arc<AppState>>) -> Result<Json<QueueSize>, ApiError> {
    let size = tokio::time::timeout(state.call_timeout, state.stream.len(&state.stream_key))
        .await
        .map_err(|_| ApiError::Timeout)??;

    Ok(Json(QueueSize {
        stream: state.stream_key.clone(),
        size,
    }))
}
