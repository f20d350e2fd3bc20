//! curl-me-that Controller Library
//!
//! Watches ConfigMaps annotated with `x-k8s.io/curl-me-that` and writes the
//! content of the listed URLs into their data.
//!
//! The pieces are usable on their own:
//! - [`directive`]: annotation parsing, exclusion and best-effort fetching
//! - [`fetcher`]: the [`PageFetcher`] seam and its HTTP implementation
//! - [`watch`]: the ConfigMap watch, its stop handle and the [`DataUpdater`] seam
//! - [`reconciler`]: the per-snapshot pipeline
//! - [`runtime`]: startup and the reconcile loop

pub mod config;
pub mod constants;
pub mod directive;
pub mod fetcher;
pub mod observability;
pub mod reconciler;
pub mod runtime;
pub mod server;
pub mod watch;

pub use directive::{DirectiveSet, FetchError, FetchOutcome, ParseError};
pub use fetcher::{HttpFetcher, PageError, PageFetcher};
pub use reconciler::{curl_config_map, ReconcileOutcome};
pub use watch::{ConfigMapManager, DataUpdater, StopHandle, UpdateError};
