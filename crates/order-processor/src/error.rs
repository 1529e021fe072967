//! Service error types.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use order_stream::StreamError;
use thiserror::Error;

/// API-level error type that maps to HTTP responses.
#[derive(Debug)]
pub enum ApiError {
    /// The work stream could not be queried.
    Stream(StreamError),
    /// The stream did not answer in time.
    Timeout,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::Stream(err) => {
                tracing::error!(error = %err, "stream query failed");
                (StatusCode::SERVICE_UNAVAILABLE, err.to_string())
            }
            ApiError::Timeout => (
                StatusCode::GATEWAY_TIMEOUT,
                "stream query timed out".to_string(),
            ),
        };

        let body = serde_json::json!({ "error": message });
        (status, axum::Json(body)).into_response()
    }
}

impl From<StreamError> for ApiError {
    fn from(err: StreamError) -> Self {
        ApiError::Stream(err)
    }
}

/// Errors that stop the service after its configuration has loaded.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("failed to install metrics recorder: {0}")]
    Metrics(#[from] metrics_exporter_prometheus::BuildError),

    #[error("failed to connect to postgres: {0}")]
    Database(#[from] sqlx::Error),

    #[error("order store error: {0}")]
    Store(#[from] domain::StoreError),

    #[error("stream error: {0}")]
    Stream(#[from] StreamError),

    #[error("processor error: {0}")]
    Processor(#[from] processor::ProcessorError),

    #[error("server error: {0}")]
    Io(#[from] std::io::Error),
}
