//! End-to-end batch run: upload, submit, wait, harvest, extract.

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::batch::{Batch, BatchStatus, FileObject, JobRef};
use crate::client::BatchApiClient;
use crate::config::ClientConfig;
use crate::error::Result;
use crate::extract::{ExtractionReport, extract_content};
use crate::harvest::{HarvestOutcome, Harvester};
use crate::http::{HttpClient, ReqwestHttpClient};
use crate::lifecycle::{BatchController, PollPolicy, ProgressFn};

/// Furthest stage a pipeline run reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineStage {
    Submitted,
    Polling,
    FailedTerminal,
    CompletedTerminal,
    Harvested,
    Extracted,
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PipelineStage::Submitted => "submitted",
            PipelineStage::Polling => "polling",
            PipelineStage::FailedTerminal => "failed_terminal",
            PipelineStage::CompletedTerminal => "completed_terminal",
            PipelineStage::Harvested => "harvested",
            PipelineStage::Extracted => "extracted",
        };
        f.write_str(name)
    }
}

/// Result of [`Batcher::run`].
#[derive(Debug, Clone)]
pub struct PipelineReport {
    pub stage: PipelineStage,
    pub input_file: FileObject,
    pub batch: Batch,
    pub harvest: HarvestOutcome,
    /// Present only when the output file was harvested
    pub extraction: Option<ExtractionReport>,
}

/// One-stop client wiring the controller, harvester and extractor together.
pub struct Batcher<H: HttpClient> {
    client: BatchApiClient<H>,
    controller: BatchController<H>,
    harvester: Harvester<H>,
}

impl Batcher<ReqwestHttpClient> {
    /// Build a reqwest-backed batcher from `config`.
    pub fn from_config(config: &ClientConfig) -> Result<Self> {
        let http = Arc::new(ReqwestHttpClient::new(config)?);
        Ok(Self::new(http, config.poll))
    }
}

impl<H: HttpClient> Batcher<H> {
    pub fn new(http: Arc<H>, policy: PollPolicy) -> Self {
        let client = BatchApiClient::new(http);
        Self {
            controller: BatchController::new(client.clone(), policy),
            harvester: Harvester::new(client.clone()),
            client,
        }
    }

    /// Replace the progress reporter used while polling.
    pub fn with_progress(mut self, progress: ProgressFn) -> Self {
        self.controller = self.controller.with_progress(progress);
        self
    }

    pub fn client(&self) -> &BatchApiClient<H> {
        &self.client
    }

    pub fn controller(&self) -> &BatchController<H> {
        &self.controller
    }

    pub fn harvester(&self) -> &Harvester<H> {
        &self.harvester
    }

    pub async fn upload_file(&self, path: impl AsRef<Path>) -> Result<FileObject> {
        self.client.upload_file(path).await
    }

    pub async fn list_files(&self) -> Result<Vec<FileObject>> {
        self.client.list_files().await
    }

    pub async fn create_batch(&self, file: &FileObject) -> Result<Batch> {
        self.controller.submit(file).await
    }

    pub async fn list_batches(&self) -> Result<Vec<Batch>> {
        self.client.list_batches().await
    }

    pub async fn await_completion(&self, job: impl Into<JobRef>) -> Result<Batch> {
        self.controller.await_completion(job).await
    }

    pub async fn harvest(
        &self,
        job: impl Into<JobRef>,
        dest: impl AsRef<Path>,
    ) -> Result<HarvestOutcome> {
        self.harvester.harvest(job, dest).await
    }

    pub async fn extract_content(
        &self,
        source: impl AsRef<Path>,
        target_dir: impl AsRef<Path>,
    ) -> Result<ExtractionReport> {
        extract_content(source, target_dir).await
    }

    /// Run the whole sequence for `input`, writing results to `output_dir`.
    pub async fn run(
        &self,
        input: impl AsRef<Path>,
        output_dir: impl AsRef<Path>,
    ) -> Result<PipelineReport> {
        self.run_until(input, output_dir, &CancellationToken::new())
            .await
    }

    /// [`run`](Self::run), abandoning the poll loop once `cancel` fires.
    pub async fn run_until(
        &self,
        input: impl AsRef<Path>,
        output_dir: impl AsRef<Path>,
        cancel: &CancellationToken,
    ) -> Result<PipelineReport> {
        let output_dir = output_dir.as_ref();

        let input_file = self.client.upload_file(input).await?;
        let submitted = self.controller.submit(&input_file).await?;
        tracing::info!(batch_id = %submitted.id, stage = %PipelineStage::Submitted, "Pipeline stage");

        tracing::info!(batch_id = %submitted.id, stage = %PipelineStage::Polling, "Pipeline stage");
        let batch = self
            .controller
            .await_completion_until(&submitted, cancel)
            .await?;
        let mut stage = if batch.status == BatchStatus::Completed {
            PipelineStage::CompletedTerminal
        } else {
            PipelineStage::FailedTerminal
        };
        tracing::info!(batch_id = %batch.id, stage = %stage, "Pipeline stage");

        let harvest = self.harvester.harvest(&batch, output_dir).await?;
        if harvest.file().is_some() {
            stage = PipelineStage::Harvested;
            tracing::info!(batch_id = %batch.id, stage = %stage, "Pipeline stage");
        }

        let extraction = match &harvest {
            HarvestOutcome::Output(file) => {
                let report = extract_content(&file.path, output_dir).await?;
                stage = PipelineStage::Extracted;
                tracing::info!(batch_id = %batch.id, stage = %stage, "Pipeline stage");
                Some(report)
            }
            _ => None,
        };

        Ok(PipelineReport {
            stage,
            input_file,
            batch,
            harvest,
            extraction,
        })
    }
}
