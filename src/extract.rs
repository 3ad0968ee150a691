//! Pulling model output out of harvested response envelopes.
//!
//! Each record of a harvested output file wraps a chat completion whose
//! message content is itself a JSON document. [`extract_content`] decodes
//! that inner document and writes one per line to a sibling file.

use std::path::{Path, PathBuf};

use serde_json::Value;

use crate::codec::{JsonlWriter, read_raw_lines};
use crate::error::{HarvestError, Result};

/// Location of the JSON-encoded payload inside a response envelope.
pub const CONTENT_POINTER: &str = "/response/body/choices/0/message/content";

/// Counts from one extraction run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractionReport {
    pub target: PathBuf,
    pub extracted: usize,
    pub failed: usize,
}

/// `target_dir/_<source file name>`.
pub fn extracted_path(source: &Path, target_dir: &Path) -> Result<PathBuf> {
    let name = source.file_name().ok_or_else(|| {
        HarvestError::Io(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            format!("source path has no file name: {}", source.display()),
        ))
    })?;
    let mut prefixed = std::ffi::OsString::from("_");
    prefixed.push(name);
    Ok(target_dir.join(prefixed))
}

/// Decode the message content of one envelope.
pub fn extract_payload(envelope: &Value) -> std::result::Result<Value, String> {
    let content = envelope
        .pointer(CONTENT_POINTER)
        .ok_or_else(|| "missing message content".to_string())?
        .as_str()
        .ok_or_else(|| "message content is not a string".to_string())?;
    serde_json::from_str(content).map_err(|e| format!("content is not JSON: {}", e))
}

/// Extract every decodable payload from `source` into `target_dir`.
///
/// Records that can't be navigated or decoded (including lines that are not
/// UTF-8) are skipped and counted; only failing to open or write the files
/// is an error.
pub async fn extract_content(
    source: impl AsRef<Path>,
    target_dir: impl AsRef<Path>,
) -> Result<ExtractionReport> {
    let source = source.as_ref();
    let target_dir = target_dir.as_ref();
    tokio::fs::create_dir_all(target_dir).await?;
    let target = extracted_path(source, target_dir)?;

    let mut lines = read_raw_lines(source).await?;
    let mut writer = JsonlWriter::create(&target).await?;
    let mut failed = 0;
    let mut line_no = 0;

    while let Some(line) = lines.next_segment().await? {
        line_no += 1;
        let line = line.strip_suffix(b"\r").unwrap_or(&line);
        if line.trim_ascii().is_empty() {
            continue;
        }

        let payload = serde_json::from_slice::<Value>(line)
            .map_err(|e| format!("record is not JSON: {}", e))
            .and_then(|envelope| extract_payload(&envelope));

        match payload {
            Ok(payload) => writer.write(&payload).await?,
            Err(reason) => {
                tracing::info!(line = line_no, reason = %reason, "Failed to load json");
                failed += 1;
            }
        }
    }

    let extracted = writer.finish().await?;
    tracing::info!(path = %target.display(), extracted, failed, "Extracted content saved");
    if failed > 0 {
        tracing::error!(failed, "Failed to extract content from {} responses", failed);
    }

    Ok(ExtractionReport {
        target,
        extracted,
        failed,
    })
}
