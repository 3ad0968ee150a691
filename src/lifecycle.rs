//! Batch submission and completion polling.
//!
//! [`BatchController::await_completion`] is the only loop in the pipeline: it
//! re-fetches the batch every [`PollPolicy::interval_ms`] until the service
//! reports a terminal status, reporting progress on every tick.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::batch::{Batch, BatchId, BatchInput, BatchStatus, FileObject, JobRef};
use crate::client::BatchApiClient;
use crate::error::{HarvestError, Result};
use crate::http::HttpClient;

/// Callback invoked with progress after every poll.
pub type ProgressFn = Arc<dyn Fn(&BatchProgress) + Send + Sync>;

/// How often to poll and when to give up.
///
/// The defaults poll every 5 seconds with no bound, so a batch that never
/// finishes blocks forever. Set `max_attempts` or `timeout_ms` to bound it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PollPolicy {
    /// Delay between polls in milliseconds
    pub interval_ms: u64,
    /// Give up after this many fetches
    pub max_attempts: Option<u32>,
    /// Give up once this much time has passed since the first fetch
    pub timeout_ms: Option<u64>,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval_ms: 5000,
            max_attempts: None,
            timeout_ms: None,
        }
    }
}

impl PollPolicy {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn with_interval_ms(mut self, interval_ms: u64) -> Self {
        self.interval_ms = interval_ms;
        self
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = Some(max_attempts);
        self
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = Some(timeout_ms);
        self
    }

    fn exhausted(&self, attempts: u32, elapsed: Duration) -> bool {
        self.max_attempts.is_some_and(|max| attempts >= max)
            || self
                .timeout_ms
                .is_some_and(|timeout| elapsed >= Duration::from_millis(timeout))
    }
}

/// Progress of a batch at one poll tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchProgress {
    pub batch_id: BatchId,
    pub status: BatchStatus,
    /// Completed requests, never more than `total`
    pub completed: u64,
    pub total: u64,
}

impl BatchProgress {
    pub fn from_batch(batch: &Batch) -> Self {
        let counts = batch.request_counts;
        Self {
            batch_id: batch.id.clone(),
            status: batch.status,
            completed: counts.completed.min(counts.total),
            total: counts.total,
        }
    }

    /// Replace the completed count, still clamped to `total`.
    pub fn with_completed(mut self, completed: u64) -> Self {
        self.completed = completed.min(self.total);
        self
    }

    /// Fraction of requests completed, or `None` while the total is unknown.
    pub fn ratio(&self) -> Option<f64> {
        if self.total == 0 {
            None
        } else {
            Some(self.completed as f64 / self.total as f64)
        }
    }
}

/// Default progress reporter: one info line per tick.
pub fn log_progress(progress: &BatchProgress) {
    match progress.ratio() {
        Some(ratio) => tracing::info!(
            batch_id = %progress.batch_id,
            status = %progress.status,
            completed = progress.completed,
            total = progress.total,
            "Batch progress {:.1}%",
            ratio * 100.0
        ),
        None => tracing::info!(
            batch_id = %progress.batch_id,
            status = %progress.status,
            "Batch progress unknown, no requests counted yet"
        ),
    }
}

/// Creates batches and waits for them to finish.
pub struct BatchController<H: HttpClient> {
    client: BatchApiClient<H>,
    policy: PollPolicy,
    progress: ProgressFn,
}

impl<H: HttpClient> BatchController<H> {
    pub fn new(client: BatchApiClient<H>, policy: PollPolicy) -> Self {
        Self {
            client,
            policy,
            progress: Arc::new(log_progress),
        }
    }

    /// Replace the progress reporter.
    pub fn with_progress(mut self, progress: ProgressFn) -> Self {
        self.progress = progress;
        self
    }

    pub fn policy(&self) -> &PollPolicy {
        &self.policy
    }

    /// Create a batch over an uploaded file.
    pub async fn submit(&self, file: &FileObject) -> Result<Batch> {
        self.client.create_batch(&BatchInput::for_file(file)).await
    }

    /// Poll until the batch reaches a terminal status.
    ///
    /// A failed batch is returned as `Ok`, not as an error.
    pub async fn await_completion(&self, job: impl Into<JobRef>) -> Result<Batch> {
        self.await_completion_until(job, &CancellationToken::new())
            .await
    }

    /// Like [`await_completion`](Self::await_completion), but stops with
    /// `HarvestError::Cancelled` once `cancel` fires.
    pub async fn await_completion_until(
        &self,
        job: impl Into<JobRef>,
        cancel: &CancellationToken,
    ) -> Result<Batch> {
        let batch_id = job.into().id().clone();
        let started = Instant::now();
        let mut attempts: u32 = 0;
        let mut last_completed: u64 = 0;

        tracing::debug!(
            batch_id = %batch_id,
            interval_ms = self.policy.interval_ms,
            "Polling batch until terminal"
        );

        loop {
            let batch = self.client.get_batch(&batch_id).await?;
            attempts += 1;

            let completed = batch.request_counts.completed;
            if completed < last_completed {
                tracing::warn!(
                    batch_id = %batch_id,
                    previous = last_completed,
                    completed,
                    "Completed request count went backwards"
                );
            }
            last_completed = last_completed.max(completed);
            let progress = BatchProgress::from_batch(&batch).with_completed(last_completed);
            (self.progress)(&progress);

            match batch.status {
                BatchStatus::Completed => {
                    tracing::info!(batch_id = %batch_id, attempts, "Batch completed");
                    return Ok(batch);
                }
                status if status.is_terminal() => {
                    tracing::warn!(batch_id = %batch_id, status = %status, "Batch failed");
                    return Ok(batch);
                }
                _ => {}
            }

            if self.policy.exhausted(attempts, started.elapsed()) {
                return Err(HarvestError::PollLimitExceeded { batch_id, attempts });
            }

            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    tracing::info!(batch_id = %batch_id, "Polling cancelled");
                    return Err(HarvestError::Cancelled(batch_id));
                }
                _ = tokio::time::sleep(self.policy.interval()) => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::MockHttpClient;
    use parking_lot::Mutex;

    fn batch_json(status: &str, completed: u64, total: u64) -> String {
        format!(
            r#"{{"id":"batch_1","status":"{}","request_counts":{{"total":{},"completed":{},"failed":0}}}}"#,
            status, total, completed
        )
    }

    fn controller(mock: &MockHttpClient, policy: PollPolicy) -> BatchController<MockHttpClient> {
        BatchController::new(BatchApiClient::new(Arc::new(mock.clone())), policy)
    }

    fn recording() -> (ProgressFn, Arc<Mutex<Vec<BatchProgress>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let progress: ProgressFn = Arc::new(move |p: &BatchProgress| sink.lock().push(p.clone()));
        (progress, seen)
    }

    #[test_log::test(tokio::test(start_paused = true))]
    async fn test_polls_until_completed() {
        let mock = MockHttpClient::new();
        mock.add_ok("GET /batches/batch_1", batch_json("validating", 0, 0));
        mock.add_ok("GET /batches/batch_1", batch_json("in_progress", 2, 4));
        mock.add_ok("GET /batches/batch_1", batch_json("completed", 4, 4));

        let (progress, seen) = recording();
        let controller = controller(&mock, PollPolicy::default()).with_progress(progress);

        let start = Instant::now();
        let batch = controller.await_completion("batch_1").await.unwrap();

        assert_eq!(batch.status, BatchStatus::Completed);
        assert_eq!(mock.calls_to("GET /batches/batch_1"), 3);
        // Two sleeps between three fetches
        assert_eq!(start.elapsed(), Duration::from_secs(10));

        let seen = seen.lock();
        assert_eq!(seen.len(), 3);
        assert_eq!(seen[0].ratio(), None);
        assert_eq!(seen[1].ratio(), Some(0.5));
        assert_eq!(seen[2].ratio(), Some(1.0));
        assert!(seen.iter().all(|p| p.completed <= p.total));
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_batch_is_returned_not_raised() {
        let mock = MockHttpClient::new();
        mock.add_ok("GET /batches/batch_1", batch_json("in_progress", 1, 3));
        mock.add_ok("GET /batches/batch_1", batch_json("failed", 1, 3));

        let batch = controller(&mock, PollPolicy::default())
            .await_completion("batch_1")
            .await
            .unwrap();
        assert_eq!(batch.status, BatchStatus::Failed);
        assert_eq!(mock.call_count(), 2);
    }

    #[test_log::test(tokio::test(start_paused = true))]
    async fn test_reported_progress_never_decreases() {
        let mock = MockHttpClient::new();
        mock.add_ok("GET /batches/batch_1", batch_json("in_progress", 5, 10));
        mock.add_ok("GET /batches/batch_1", batch_json("in_progress", 3, 10));
        mock.add_ok("GET /batches/batch_1", batch_json("completed", 10, 10));

        let (progress, seen) = recording();
        let batch = controller(&mock, PollPolicy::default())
            .with_progress(progress)
            .await_completion("batch_1")
            .await
            .unwrap();
        assert_eq!(batch.status, BatchStatus::Completed);

        let completed: Vec<u64> = seen.lock().iter().map(|p| p.completed).collect();
        assert_eq!(completed, vec![5, 5, 10]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_batch_ends_polling() {
        let mock = MockHttpClient::new();
        mock.add_ok("GET /batches/batch_1", batch_json("in_progress", 2, 6));
        mock.add_ok("GET /batches/batch_1", batch_json("expired", 4, 6));

        let batch = controller(&mock, PollPolicy::default())
            .await_completion("batch_1")
            .await
            .unwrap();
        assert_eq!(batch.status, BatchStatus::Expired);
        assert_eq!(mock.call_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_status_ends_polling() {
        let mock = MockHttpClient::new();
        mock.add_ok("GET /batches/batch_1", batch_json("cancelling", 1, 6));
        mock.add_ok("GET /batches/batch_1", batch_json("cancelled", 1, 6));

        let batch = controller(&mock, PollPolicy::default())
            .await_completion("batch_1")
            .await
            .unwrap();
        assert_eq!(batch.status, BatchStatus::Cancelled);
        assert_eq!(mock.call_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_handle_is_refetched_by_id() {
        let mock = MockHttpClient::new();
        mock.add_ok("GET /batches/batch_1", batch_json("completed", 5, 5));
        let stale: Batch = serde_json::from_str(&batch_json("in_progress", 0, 5)).unwrap();

        let batch = controller(&mock, PollPolicy::default())
            .await_completion(&stale)
            .await
            .unwrap();
        assert_eq!(batch.request_counts.completed, 5);
        assert_eq!(mock.call_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_max_attempts_bounds_the_loop() {
        let mock = MockHttpClient::new();
        for _ in 0..3 {
            mock.add_ok("GET /batches/batch_1", batch_json("in_progress", 0, 10));
        }

        let policy = PollPolicy::default().with_max_attempts(3);
        let result = controller(&mock, policy).await_completion("batch_1").await;
        assert!(matches!(
            result,
            Err(HarvestError::PollLimitExceeded { attempts: 3, .. })
        ));
        assert_eq!(mock.call_count(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_bounds_the_loop() {
        let mock = MockHttpClient::new();
        for _ in 0..10 {
            mock.add_ok("GET /batches/batch_1", batch_json("in_progress", 0, 10));
        }

        let policy = PollPolicy::default()
            .with_interval_ms(1000)
            .with_timeout_ms(2500);
        let result = controller(&mock, policy).await_completion("batch_1").await;
        assert!(matches!(result, Err(HarvestError::PollLimitExceeded { .. })));
        // Fetches at t=0s, 1s, 2s, 3s; the bound is noticed after the 3s fetch
        assert_eq!(mock.call_count(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellation_stops_polling() {
        let mock = MockHttpClient::new();
        mock.add_ok("GET /batches/batch_1", batch_json("in_progress", 0, 10));

        let cancel = CancellationToken::new();
        cancel.cancel();
        let result = controller(&mock, PollPolicy::default())
            .await_completion_until("batch_1", &cancel)
            .await;
        assert!(matches!(result, Err(HarvestError::Cancelled(_))));
        assert_eq!(mock.call_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transport_error_propagates() {
        let mock = MockHttpClient::new();
        // No response configured: the mock returns an error
        let result = controller(&mock, PollPolicy::default())
            .await_completion("batch_1")
            .await;
        assert!(result.is_err());
    }

    #[test]
    fn test_progress_clamps_completed_to_total() {
        let batch: Batch = serde_json::from_str(&batch_json("in_progress", 7, 5)).unwrap();
        let progress = BatchProgress::from_batch(&batch);
        assert_eq!(progress.completed, 5);
        assert_eq!(progress.ratio(), Some(1.0));
        assert_eq!(progress.with_completed(9).completed, 5);
    }

    #[tokio::test]
    async fn test_submit_creates_batch_for_file() {
        let mock = MockHttpClient::new();
        mock.add_ok("POST /batches", batch_json("validating", 0, 0));
        let file: FileObject =
            serde_json::from_str(r#"{"id":"file-in","purpose":"batch"}"#).unwrap();

        let batch = controller(&mock, PollPolicy::default())
            .submit(&file)
            .await
            .unwrap();
        assert_eq!(batch.id, BatchId::from("batch_1"));
        assert_eq!(mock.calls_to("POST /batches"), 1);
    }
}
