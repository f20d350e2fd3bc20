//! # Constants
//!
//! Shared constants used throughout the controller.
//!
//! These values represent reasonable defaults and can be overridden via
//! command-line flags or environment variables where applicable.

/// Annotation that marks a ConfigMap for fetching
pub const CURL_ANNOTATION: &str = "x-k8s.io/curl-me-that";

/// Field manager recorded on every data patch
pub const FIELD_MANAGER: &str = "curl-me-that-controller";

/// User-Agent sent with every fetch
pub const USER_AGENT: &str = concat!("curl-me-that-controller/", env!("CARGO_PKG_VERSION"));

/// Default HTTP server port for metrics and health probes
pub const DEFAULT_METRICS_PORT: u16 = 8080;

/// Default per-request timeout for fetching a URL (seconds)
pub const DEFAULT_FETCH_TIMEOUT_SECS: u64 = 10;

/// Default upper bound for a single fetched page (bytes)
/// A whole ConfigMap is capped at 1MiB by the API server
pub const DEFAULT_MAX_PAGE_SIZE_BYTES: usize = 1024 * 1024;

/// Maximum length of a ConfigMap data key
pub const MAX_DATA_KEY_LENGTH: usize = 253;

/// Default tracing filter when `RUST_LOG` is unset
pub const DEFAULT_LOG_FILTER: &str = "curl_me_that_controller=info,kube=warn";
