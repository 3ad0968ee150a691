//! Client configuration.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::lifecycle::PollPolicy;

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// Log verbosity selected by the caller.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    #[default]
    Info,
    #[serde(alias = "warn")]
    Warning,
    Error,
}

impl LogLevel {
    /// Parse a level name, falling back to `Info` for anything unrecognised.
    pub fn parse_lossy(s: &str) -> Self {
        s.parse().unwrap_or_default()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warning => "warn",
            LogLevel::Error => "error",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "debug" => Ok(LogLevel::Debug),
            "info" => Ok(LogLevel::Info),
            "warning" | "warn" => Ok(LogLevel::Warning),
            "error" => Ok(LogLevel::Error),
            _ => Err(format!("Invalid log level: {}", s)),
        }
    }
}

/// Configuration for talking to the batch API.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Base URL including the API version prefix, e.g. "https://api.openai.com/v1"
    pub base_url: String,

    /// Bearer token sent with every request
    pub api_key: String,

    /// Custom headers. When unset, JSON content type and bearer auth are sent.
    pub headers: Option<BTreeMap<String, String>>,

    /// Log verbosity used by `logging::init_tracing`
    pub log_level: LogLevel,

    /// Timeout for each individual HTTP call in milliseconds
    pub timeout_ms: u64,

    /// How the lifecycle controller polls for completion
    pub poll: PollPolicy,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key: String::new(),
            headers: None,
            log_level: LogLevel::Info,
            timeout_ms: 600000, // 10 minutes
            poll: PollPolicy::default(),
        }
    }
}

impl ClientConfig {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: api_key.into(),
            ..Default::default()
        }
    }

    /// Build a config from `OPENAI_BASE_URL`, `OPENAI_API_KEY` and
    /// `BATCH_HARVEST_LOG_LEVEL`, using defaults for anything unset.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(base_url) = std::env::var("OPENAI_BASE_URL")
            && !base_url.is_empty()
        {
            config.base_url = base_url;
        }
        if let Ok(api_key) = std::env::var("OPENAI_API_KEY") {
            config.api_key = api_key;
        }
        if let Ok(level) = std::env::var("BATCH_HARVEST_LOG_LEVEL") {
            config.log_level = LogLevel::parse_lossy(&level);
        }
        config
    }

    pub fn with_headers(mut self, headers: BTreeMap<String, String>) -> Self {
        self.headers = Some(headers);
        self
    }

    pub fn with_log_level(mut self, log_level: LogLevel) -> Self {
        self.log_level = log_level;
        self
    }

    pub fn with_poll_policy(mut self, poll: PollPolicy) -> Self {
        self.poll = poll;
        self
    }

    /// Headers to send with every request.
    pub fn effective_headers(&self) -> BTreeMap<String, String> {
        match &self.headers {
            Some(headers) => headers.clone(),
            None => {
                tracing::warn!("No headers provided, using default headers");
                self.default_headers()
            }
        }
    }

    fn default_headers(&self) -> BTreeMap<String, String> {
        BTreeMap::from([
            ("Content-Type".to_string(), "application/json".to_string()),
            (
                "Authorization".to_string(),
                format!("Bearer {}", self.api_key),
            ),
        ])
    }

    /// Join an API path onto the base URL.
    pub fn url(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }
}
