//! # Logging
//!
//! Installs the global `tracing` subscriber.
//!
//! The filter comes from `RUST_LOG` and defaults to
//! `home_assistant_operator=info`. `LOG_FORMAT=json` switches to one JSON
//! object per line for log aggregation.

use tracing_subscriber::EnvFilter;

use crate::config::LogFormat;

const DEFAULT_FILTER: &str = "home_assistant_operator=info";

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| DEFAULT_FILTER.into())
}

/// Initialize the global subscriber
///
/// Returns an error when a subscriber is already installed.
pub fn init_logging(format: LogFormat) -> anyhow::Result<()> {
    let builder = tracing_subscriber::fmt().with_env_filter(env_filter());
    match format {
        LogFormat::Text => builder
            .try_init()
            .map_err(|e| anyhow::anyhow!("Failed to initialize tracing subscriber: {e}")),
        LogFormat::Json => builder
            .json()
            .with_current_span(true)
            .try_init()
            .map_err(|e| anyhow::anyhow!("Failed to initialize tracing subscriber: {e}")),
    }
}
