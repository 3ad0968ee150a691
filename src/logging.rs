//! Tracing subscriber setup.
//!
//! Nothing in this crate installs a subscriber on its own. Binaries call
//! [`init_tracing`] once with the level from their [`ClientConfig`](crate::config::ClientConfig).

use tracing_subscriber::EnvFilter;
use tracing_subscriber::filter::LevelFilter;

use crate::config::LogLevel;

impl From<LogLevel> for LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Debug => LevelFilter::DEBUG,
            LogLevel::Info => LevelFilter::INFO,
            LogLevel::Warning => LevelFilter::WARN,
            LogLevel::Error => LevelFilter::ERROR,
        }
    }
}

/// Filter for `level`, overridable through `RUST_LOG`.
pub fn env_filter(level: LogLevel) -> EnvFilter {
    EnvFilter::builder()
        .with_default_directive(LevelFilter::from(level).into())
        .from_env_lossy()
}

/// Install a global fmt subscriber at `level`.
///
/// Returns `false` if a subscriber was already installed.
pub fn init_tracing(level: LogLevel) -> bool {
    let installed = tracing_subscriber::fmt()
        .with_env_filter(env_filter(level))
        .with_target(false)
        .try_init()
        .is_ok();
    if installed {
        tracing::debug!(level = %level, "Tracing initialized");
    }
    installed
}
