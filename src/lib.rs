//! Client-side helper for OpenAI-compatible batch inference.
//!
//! Uploads a file of requests, creates a batch, polls it until the service
//! reports a terminal status, downloads the output (or error) file, and
//! extracts the JSON payload each model response carried into a clean
//! line-delimited file.
//!
//! ```ignore
//! let config = ClientConfig::from_env();
//! logging::init_tracing(config.log_level);
//! let batcher = Batcher::from_config(&config)?;
//! let report = batcher.run("requests.jsonl", "output").await?;
//! ```

pub mod batch;
pub mod client;
pub mod codec;
pub mod config;
pub mod domain;
pub mod error;
pub mod extract;
pub mod harvest;
pub mod http;
pub mod lifecycle;
pub mod logging;
pub mod pipeline;

// Re-export commonly used types
pub use batch::*;
pub use client::BatchApiClient;
pub use config::{ClientConfig, LogLevel};
pub use error::{HarvestError, Result};
pub use extract::{ExtractionReport, extract_content};
pub use harvest::{HarvestOutcome, HarvestedFile, Harvester};
pub use http::{HttpClient, HttpRequest, HttpResponse, MockHttpClient, ReqwestHttpClient};
pub use lifecycle::{BatchController, BatchProgress, PollPolicy, ProgressFn};
pub use pipeline::{Batcher, PipelineReport, PipelineStage};
