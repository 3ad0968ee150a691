//! Typed client for the remote file and batch endpoints.
//!
//! Every method is one HTTP call. Failures propagate to the caller untouched;
//! nothing here retries.

use std::path::Path;
use std::sync::Arc;

use serde::de::DeserializeOwned;

use crate::batch::{Batch, BatchId, BatchInput, FileId, FileObject, ListResponse, Purpose};
use crate::error::Result;
use crate::http::{HttpClient, HttpRequest};

/// Client for uploading files, managing batches and downloading results.
#[derive(Clone)]
pub struct BatchApiClient<H: HttpClient> {
    http: Arc<H>,
}

impl<H: HttpClient> BatchApiClient<H> {
    pub fn new(http: Arc<H>) -> Self {
        Self { http }
    }

    pub fn http(&self) -> &Arc<H> {
        &self.http
    }

    async fn send_json<T: DeserializeOwned>(&self, request: HttpRequest) -> Result<T> {
        let response = self.http.execute(&request).await?.error_for_status()?;
        Ok(serde_json::from_str(&response.body)?)
    }

    /// Upload a local request file for batch processing.
    pub async fn upload_file(&self, path: impl AsRef<Path>) -> Result<FileObject> {
        let path = path.as_ref();
        let bytes = tokio::fs::read(path).await?;
        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "batch.jsonl".to_string());

        let file: FileObject = self
            .send_json(HttpRequest::post_multipart(
                "/files",
                file_name,
                Purpose::Batch.as_str(),
                bytes,
            ))
            .await?;

        tracing::info!(file_id = %file.id, path = %path.display(), "Uploaded batch input file");
        Ok(file)
    }

    /// List uploaded files with purpose `batch`.
    pub async fn list_files(&self) -> Result<Vec<FileObject>> {
        let list: ListResponse<FileObject> = self
            .send_json(HttpRequest::get(format!(
                "/files?purpose={}",
                Purpose::Batch
            )))
            .await?;
        Ok(list.data)
    }

    /// Create a batch over `input`.
    pub async fn create_batch(&self, input: &BatchInput) -> Result<Batch> {
        let body = serde_json::to_string(input)?;
        let batch: Batch = self
            .send_json(HttpRequest::post_json("/batches", body))
            .await?;
        tracing::info!(
            batch_id = %batch.id,
            input_file_id = %input.input_file_id,
            status = %batch.status,
            "Created batch"
        );
        Ok(batch)
    }

    pub async fn list_batches(&self) -> Result<Vec<Batch>> {
        let list: ListResponse<Batch> = self.send_json(HttpRequest::get("/batches")).await?;
        Ok(list.data)
    }

    /// Fetch a fresh snapshot of a batch.
    pub async fn get_batch(&self, batch_id: &BatchId) -> Result<Batch> {
        self.send_json(HttpRequest::get(format!("/batches/{}", batch_id)))
            .await
    }

    /// Fetch the raw text content of a remote file.
    pub async fn get_file_content(&self, file_id: &FileId) -> Result<String> {
        let response = self
            .http
            .execute(&HttpRequest::get(format!("/files/{}/content", file_id)))
            .await?
            .error_for_status()?;
        tracing::debug!(file_id = %file_id, len = response.body.len(), "Fetched file content");
        Ok(response.body)
    }
}
