//! # Logging
//!
//! Tracing subscriber setup. `RUST_LOG` controls the filter; the output format
//! is chosen by [`LogFormat`].

use crate::config::LogFormat;
use crate::constants::DEFAULT_LOG_FILTER;
use anyhow::{anyhow, Result};
use tracing_subscriber::EnvFilter;

/// Install the global tracing subscriber.
///
/// # Errors
///
/// Fails if a global subscriber has already been installed.
pub fn init_tracing(format: LogFormat) -> Result<()> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));

    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match format {
        LogFormat::Text => builder.try_init(),
        LogFormat::Json => builder.json().with_current_span(true).try_init(),
    }
    .map_err(|e| anyhow!("Failed to install tracing subscriber: {e}"))
}
