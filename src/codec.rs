//! Line-delimited JSON records.
//!
//! The service returns result files as a single JSON string whose contents
//! are newline-separated JSON objects. [`decode_record_batch`] unpacks that
//! into individual records, and [`JsonlWriter`] / [`read_raw_lines`] handle the
//! local `.jsonl` files the later stages read and write.

use std::path::Path;

use serde_json::Value;
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, BufWriter, Split};

use crate::error::Result;

/// A line that could not be turned into a JSON value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordError {
    /// 1-based line number within the decoded payload
    pub line: usize,
    pub reason: String,
}

/// Outcome of decoding one line.
pub type RecordOutcome = std::result::Result<Value, RecordError>;

/// Records recovered from a payload, plus the lines that were skipped.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DecodedBatch {
    pub records: Vec<Value>,
    pub failures: Vec<RecordError>,
}

impl DecodedBatch {
    pub fn failure_count(&self) -> usize {
        self.failures.len()
    }
}

impl FromIterator<RecordOutcome> for DecodedBatch {
    fn from_iter<I: IntoIterator<Item = RecordOutcome>>(iter: I) -> Self {
        let mut batch = DecodedBatch::default();
        for outcome in iter {
            match outcome {
                Ok(record) => batch.records.push(record),
                Err(failure) => batch.failures.push(failure),
            }
        }
        batch
    }
}

/// Unwrap the outer JSON string, or hand back raw JSONL untouched.
fn unwrap_payload(payload: &str) -> std::borrow::Cow<'_, str> {
    match serde_json::from_str::<Value>(payload) {
        Ok(Value::String(inner)) => inner.into(),
        _ => {
            tracing::debug!("Payload is not a JSON string, decoding as raw JSONL");
            payload.into()
        }
    }
}

/// Decode one line, retrying with `\"` unescaped if the line is not valid as-is.
fn decode_line(line_no: usize, line: &str) -> RecordOutcome {
    match serde_json::from_str::<Value>(line) {
        Ok(value) => Ok(value),
        Err(first) => {
            let cleaned = line.replace("\\\"", "\"");
            if cleaned == line {
                return Err(RecordError {
                    line: line_no,
                    reason: first.to_string(),
                });
            }
            serde_json::from_str::<Value>(&cleaned).map_err(|e| RecordError {
                line: line_no,
                reason: e.to_string(),
            })
        }
    }
}

/// Decode every non-blank line of a result payload, in order.
pub fn decode_records(payload: &str) -> Vec<RecordOutcome> {
    let content = unwrap_payload(payload);
    content
        .split('\n')
        .enumerate()
        .map(|(idx, line)| (idx + 1, line.trim_end_matches('\r')))
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(line_no, line)| decode_line(line_no, line))
        .collect()
}

/// Decode a result payload, logging and skipping lines that fail.
pub fn decode_record_batch(payload: &str) -> DecodedBatch {
    let batch: DecodedBatch = decode_records(payload).into_iter().collect();
    for failure in &batch.failures {
        tracing::error!(
            line = failure.line,
            error = %failure.reason,
            "Failed to decode JSON content"
        );
    }
    batch
}

/// Encode records in the service's result payload format.
pub fn encode_record_batch(records: &[Value]) -> Result<String> {
    let lines = records
        .iter()
        .map(serde_json::to_string)
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(serde_json::to_string(&lines.join("\n"))?)
}

/// Buffered writer producing one JSON value per line.
pub struct JsonlWriter {
    inner: BufWriter<File>,
    written: usize,
}

impl JsonlWriter {
    /// Create (or truncate) the file at `path`.
    pub async fn create(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::create(path).await?;
        Ok(Self {
            inner: BufWriter::new(file),
            written: 0,
        })
    }

    pub async fn write(&mut self, record: &Value) -> Result<()> {
        let mut line = serde_json::to_vec(record)?;
        line.push(b'\n');
        self.inner.write_all(&line).await?;
        self.written += 1;
        Ok(())
    }

    pub async fn write_all(&mut self, records: &[Value]) -> Result<()> {
        for record in records {
            self.write(record).await?;
        }
        Ok(())
    }

    /// Flush buffered lines and return how many records were written.
    pub async fn finish(mut self) -> Result<usize> {
        self.inner.flush().await?;
        Ok(self.written)
    }
}

/// Write `records` to `path` as JSONL, replacing any existing file.
pub async fn write_jsonl(path: impl AsRef<Path>, records: &[Value]) -> Result<usize> {
    let mut writer = JsonlWriter::create(path).await?;
    writer.write_all(records).await?;
    writer.finish().await
}

/// Open `path` for line-by-line reading as raw bytes.
///
/// Segments keep any trailing `\r` and are not checked for UTF-8.
pub async fn read_raw_lines(path: impl AsRef<Path>) -> Result<Split<BufReader<File>>> {
    let file = File::open(path).await?;
    Ok(BufReader::new(file).split(b'\n'))
}
