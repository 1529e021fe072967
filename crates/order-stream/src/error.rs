use thiserror::Error;

/// Errors that can occur when interacting with the work stream.
#[derive(Debug, Error)]
pub enum StreamError {
    /// The consumer group does not exist on the stream.
    #[error("Consumer group {group} not found on stream {stream}")]
    GroupNotFound { stream: String, group: String },

    /// An entry identifier could not be parsed.
    #[error("Invalid entry id: {0}")]
    InvalidEntryId(String),

    /// The server returned a reply this client does not understand.
    #[error("Malformed stream reply: {0}")]
    MalformedReply(String),

    /// A Redis command or connection error occurred.
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),
}

/// Result type for stream operations.
pub type Result<T> = std::result::Result<T, StreamError>;
