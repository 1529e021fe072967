//! Liveness endpoint.

use axum::Json;
use serde::Serialize;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}

/// GET /health: the process is up and serving.
///
/// Does not touch Redis or Postgres; use `/queue/size` to probe the stream.
pub async fn check() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}
