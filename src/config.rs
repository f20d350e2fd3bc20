//! # Controller Configuration
//!
//! Controller-level settings loaded from command-line flags, falling back to
//! environment variables and then to the defaults in [`crate::constants`].

use crate::constants::{
    DEFAULT_FETCH_TIMEOUT_SECS, DEFAULT_MAX_PAGE_SIZE_BYTES, DEFAULT_METRICS_PORT,
};
use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use std::time::Duration;

/// Output format for log lines
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    /// Human readable, one event per line
    Text,
    /// One JSON object per event
    Json,
}

/// Controller-level configuration
///
/// Every flag can also be set through the environment variable named next to it,
/// which is how the deployment manifest configures the controller.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "curl-me-that-controller",
    version,
    about = "Fills annotated ConfigMaps with content fetched from URLs"
)]
pub struct ControllerConfig {
    /// Path to a kubeconfig file (colon separated list allowed).
    /// In-cluster configuration is used when unset.
    #[arg(long, env = "KUBECONFIG")]
    pub kubeconfig: Option<String>,

    /// Only watch ConfigMaps in this namespace (all namespaces when unset)
    #[arg(long = "namespace", env = "WATCH_NAMESPACE")]
    pub namespace: Option<String>,

    /// Only watch ConfigMaps matching this label selector
    #[arg(long, env = "WATCH_LABEL_SELECTOR")]
    pub label_selector: Option<String>,

    /// Timeout for fetching a single URL (seconds)
    #[arg(long, env = "FETCH_TIMEOUT_SECS", default_value_t = DEFAULT_FETCH_TIMEOUT_SECS)]
    pub fetch_timeout_secs: u64,

    /// Largest page accepted from a URL (bytes)
    #[arg(long, env = "MAX_PAGE_SIZE_BYTES", default_value_t = DEFAULT_MAX_PAGE_SIZE_BYTES)]
    pub max_page_size_bytes: usize,

    /// Port for /metrics, /healthz and /readyz
    #[arg(long, env = "METRICS_PORT", default_value_t = DEFAULT_METRICS_PORT)]
    pub metrics_port: u16,

    /// Log output format
    #[arg(long, env = "LOG_FORMAT", value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,
}

impl ControllerConfig {
    /// Get fetch timeout duration
    #[must_use]
    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }

    /// Kubeconfig paths to merge, empty when in-cluster inference should be used
    #[must_use]
    pub fn kubeconfig_paths(&self) -> Vec<PathBuf> {
        self.kubeconfig
            .as_deref()
            .map(|value| {
                std::env::split_paths(value)
                    .filter(|path| !path.as_os_str().is_empty())
                    .collect()
            })
            .unwrap_or_default()
    }
}
