//! Error types for the batch harvesting pipeline.
//!
//! Only transport, filesystem and configuration failures are errors. A failed
//! batch, a record that won't decode, or a harvest attempted before the batch
//! finished are ordinary values and are reported through logging.

use thiserror::Error;

use crate::batch::BatchId;

/// Result type alias using the batch-harvest error type.
pub type Result<T> = std::result::Result<T, HarvestError>;

/// Main error type for the batch harvesting pipeline.
#[derive(Error, Debug)]
pub enum HarvestError {
    /// HTTP client error (connection, timeout, body read)
    #[error("HTTP request failed: {0}")]
    HttpClient(#[from] reqwest::Error),

    /// The remote API answered with a non-success status
    #[error("API returned status {status}: {body}")]
    Api { status: u16, body: String },

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Local filesystem error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The poll policy's attempt or time bound was reached before a terminal status
    #[error("Batch {batch_id} still not terminal after {attempts} polls")]
    PollLimitExceeded { batch_id: BatchId, attempts: u32 },

    /// Polling was cancelled through the caller's cancellation token
    #[error("Polling cancelled for batch {0}")]
    Cancelled(BatchId),

    /// Configuration rejected (e.g. a header that is not valid HTTP)
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// General error from anyhow
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl HarvestError {
    /// Whether this error came from talking to the remote service.
    pub fn is_transport(&self) -> bool {
        matches!(self, HarvestError::HttpClient(_) | HarvestError::Api { .. })
    }
}
