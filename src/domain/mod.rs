//! Core domain types for batch harvesting.
//!
//! Pure data with no transport dependencies:
//! - Uploaded files and their purpose
//! - Batch jobs, their status and request counts

pub mod batch;
pub mod file;
