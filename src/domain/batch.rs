//! Batch job types.
//!
//! A batch is one server-side run over every request in an uploaded file.
//! The remote service owns its state; we only observe snapshots of it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::file::{FileId, FileObject};

/// The only endpoint batches are created against.
pub const CHAT_COMPLETIONS_ENDPOINT: &str = "/v1/chat/completions";

/// The only completion window batches are created with.
pub const COMPLETION_WINDOW: &str = "24h";

/// Opaque identifier for a batch.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BatchId(pub String);

impl From<String> for BatchId {
    fn from(id: String) -> Self {
        BatchId(id)
    }
}

impl From<&str> for BatchId {
    fn from(id: &str) -> Self {
        BatchId(id.to_string())
    }
}

impl std::ops::Deref for BatchId {
    type Target = str;
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl fmt::Display for BatchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Status of a batch as reported by the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchStatus {
    Validating,
    InProgress,
    Finalizing,
    Completed,
    Failed,
    Expired,
    Cancelling,
    Cancelled,
    /// Any status this crate doesn't know about yet; treated as still running
    #[serde(other)]
    Unknown,
}

impl BatchStatus {
    /// Whether the batch will never change state again.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            BatchStatus::Completed
                | BatchStatus::Failed
                | BatchStatus::Expired
                | BatchStatus::Cancelled
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            BatchStatus::Validating => "validating",
            BatchStatus::InProgress => "in_progress",
            BatchStatus::Finalizing => "finalizing",
            BatchStatus::Completed => "completed",
            BatchStatus::Failed => "failed",
            BatchStatus::Expired => "expired",
            BatchStatus::Cancelling => "cancelling",
            BatchStatus::Cancelled => "cancelled",
            BatchStatus::Unknown => "unknown",
        }
    }
}

impl fmt::Display for BatchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-request counters for a batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestCounts {
    #[serde(default)]
    pub total: u64,
    #[serde(default)]
    pub completed: u64,
    #[serde(default)]
    pub failed: u64,
}

/// Body of a batch creation request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchInput {
    /// The uploaded file containing the requests
    pub input_file_id: FileId,
    /// The API endpoint to use for all requests (e.g., "/v1/chat/completions")
    pub endpoint: String,
    /// Completion window (e.g., "24h")
    pub completion_window: String,
    /// Optional metadata key-value pairs
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

impl BatchInput {
    /// Creation request for `file` bound to the fixed endpoint and window.
    pub fn for_file(file: &FileObject) -> Self {
        Self {
            input_file_id: file.id.clone(),
            endpoint: CHAT_COMPLETIONS_ENDPOINT.to_string(),
            completion_window: COMPLETION_WINDOW.to_string(),
            metadata: None,
        }
    }
}

/// Snapshot of a batch job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Batch {
    pub id: BatchId,
    pub status: BatchStatus,
    #[serde(default)]
    pub input_file_id: Option<FileId>,
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default)]
    pub completion_window: Option<String>,
    #[serde(default)]
    pub request_counts: RequestCounts,
    /// File ID containing the successful results
    #[serde(default)]
    pub output_file_id: Option<FileId>,
    /// File ID containing the error results
    #[serde(default)]
    pub error_file_id: Option<FileId>,
    #[serde(default, with = "chrono::serde::ts_seconds_option")]
    pub created_at: Option<DateTime<Utc>>,
}

/// Which of a batch's result files is meant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFileType {
    /// Output file containing completed requests
    Output,
    /// Error file containing failed requests
    Error,
}

impl Batch {
    /// The file a harvest should download.
    ///
    /// The error file wins when both are populated.
    pub fn result_file(&self) -> Option<(&FileId, OutputFileType)> {
        if let Some(id) = &self.error_file_id {
            Some((id, OutputFileType::Error))
        } else {
            self.output_file_id
                .as_ref()
                .map(|id| (id, OutputFileType::Output))
        }
    }
}

/// A batch given either as a fetched snapshot or as a bare identifier.
#[derive(Debug, Clone, PartialEq)]
pub enum JobRef {
    Handle(Batch),
    Id(BatchId),
}

impl JobRef {
    pub fn id(&self) -> &BatchId {
        match self {
            JobRef::Handle(batch) => &batch.id,
            JobRef::Id(id) => id,
        }
    }
}

impl From<Batch> for JobRef {
    fn from(batch: Batch) -> Self {
        JobRef::Handle(batch)
    }
}

impl From<&Batch> for JobRef {
    fn from(batch: &Batch) -> Self {
        JobRef::Handle(batch.clone())
    }
}

impl From<BatchId> for JobRef {
    fn from(id: BatchId) -> Self {
        JobRef::Id(id)
    }
}

impl From<&str> for JobRef {
    fn from(id: &str) -> Self {
        JobRef::Id(BatchId::from(id))
    }
}

impl From<String> for JobRef {
    fn from(id: String) -> Self {
        JobRef::Id(BatchId::from(id))
    }
}
