//! File and batch types.
//!
//! This module re-exports types from `domain::file` and `domain::batch`.
//! See those modules for the actual implementations.

pub use crate::domain::file::{FileId, FileObject, ListResponse, Purpose};

pub use crate::domain::batch::{
    Batch, BatchId, BatchInput, BatchStatus, CHAT_COMPLETIONS_ENDPOINT, COMPLETION_WINDOW, JobRef,
    OutputFileType, RequestCounts,
};
