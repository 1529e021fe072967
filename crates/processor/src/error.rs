//! Processor error types.

use std::future::Future;
use std::time::Duration;

use thiserror::Error;

use crate::ConfigError;

/// Errors that can occur while processing the order stream.
#[derive(Debug, Error)]
pub enum ProcessorError {
    /// An error occurred talking to the work stream.
    #[error("Stream error: {0}")]
    Stream(#[from] order_stream::StreamError),

    /// An error occurred talking to the order store.
    #[error("Order store error: {0}")]
    Store(#[from] domain::StoreError),

    /// A stream or store call did not finish within its deadline.
    #[error("{operation} timed out after {after:?}")]
    Timeout {
        operation: &'static str,
        after: Duration,
    },

    /// The processor configuration is invalid.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

/// Result type for processor operations.
pub type Result<T> = std::result::Result<T, ProcessorError>;

/// Runs a stream or store call under a deadline.
pub(crate) async fn within<T, E, F>(operation: &'static str, limit: Duration, call: F) -> Result<T>
where
    F: Future<Output = std::result::Result<T, E>>,
    ProcessorError: From<E>,
{
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result.map_err(ProcessorError::from),
        Err(_) => Err(ProcessorError::Timeout {
            operation,
            after: limit,
        }),
    }
}
