//! Downloading a finished batch's result file to local JSONL.

use std::path::{Path, PathBuf};

use crate::batch::{BatchId, FileId, JobRef, OutputFileType};
use crate::client::BatchApiClient;
use crate::codec::{decode_record_batch, write_jsonl};
use crate::error::Result;
use crate::http::HttpClient;

/// Where a downloaded result file ended up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HarvestedFile {
    pub file_id: FileId,
    pub path: PathBuf,
    /// Records written to `path`
    pub records: usize,
    /// Lines skipped because they would not decode
    pub failures: usize,
}

/// Which path a harvest took.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HarvestOutcome {
    /// The output file was saved
    Output(HarvestedFile),
    /// The batch had an error file; it was saved instead of any output
    Errors(HarvestedFile),
    /// Neither file was populated, nothing was written
    NotReady(BatchId),
}

impl HarvestOutcome {
    /// True only when the output file was harvested.
    pub fn succeeded(&self) -> bool {
        matches!(self, HarvestOutcome::Output(_))
    }

    pub fn file(&self) -> Option<&HarvestedFile> {
        match self {
            HarvestOutcome::Output(file) | HarvestOutcome::Errors(file) => Some(file),
            HarvestOutcome::NotReady(_) => None,
        }
    }
}

/// Local path a result file is saved to.
pub fn result_path(dir: &Path, file_id: &FileId) -> PathBuf {
    dir.join(format!("{}.jsonl", file_id))
}

/// Saves batch result files.
#[derive(Clone)]
pub struct Harvester<H: HttpClient> {
    client: BatchApiClient<H>,
}

impl<H: HttpClient> Harvester<H> {
    pub fn new(client: BatchApiClient<H>) -> Self {
        Self { client }
    }

    /// Download the batch's error file, or its output file, into `dest`.
    ///
    /// A bare id is resolved with a fresh fetch; a handle is used as given.
    pub async fn harvest(
        &self,
        job: impl Into<JobRef>,
        dest: impl AsRef<Path>,
    ) -> Result<HarvestOutcome> {
        let dest = dest.as_ref();
        tokio::fs::create_dir_all(dest).await?;

        let batch = match job.into() {
            JobRef::Handle(batch) => batch,
            JobRef::Id(id) => self.client.get_batch(&id).await?,
        };

        let Some((file_id, kind)) = batch.result_file() else {
            tracing::error!(
                batch_id = %batch.id,
                status = %batch.status,
                "Batch has no output or error file, check whether the batch is completed"
            );
            return Ok(HarvestOutcome::NotReady(batch.id.clone()));
        };

        let file = self.save(file_id, dest).await?;
        Ok(match kind {
            OutputFileType::Error => {
                tracing::info!(
                    batch_id = %batch.id,
                    path = %file.path.display(),
                    records = file.records,
                    "Failed file content saved"
                );
                HarvestOutcome::Errors(file)
            }
            OutputFileType::Output => {
                tracing::info!(
                    batch_id = %batch.id,
                    path = %file.path.display(),
                    records = file.records,
                    "Output file content saved"
                );
                HarvestOutcome::Output(file)
            }
        })
    }

    async fn save(&self, file_id: &FileId, dest: &Path) -> Result<HarvestedFile> {
        let content = self.client.get_file_content(file_id).await?;
        let decoded = decode_record_batch(&content);
        if decoded.failure_count() > 0 {
            tracing::warn!(
                file_id = %file_id,
                failures = decoded.failure_count(),
                "Skipped undecodable records"
            );
        }

        let path = result_path(dest, file_id);
        let records = write_jsonl(&path, &decoded.records).await?;
        Ok(HarvestedFile {
            file_id: file_id.clone(),
            path,
            records,
            failures: decoded.failure_count(),
        })
    }
}
