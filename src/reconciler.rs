//! # Reconciler
//!
//! Turns one ConfigMap snapshot into at most one data update:
//!
//! 1. skip ConfigMaps without the `x-k8s.io/curl-me-that` annotation
//! 2. parse the annotation into directives
//! 3. drop directives whose key the ConfigMap already holds
//! 4. fetch the rest, keeping whatever succeeded
//! 5. stop if nothing new arrived
//! 6. merge the new keys into the ConfigMap
//!
//! Step 3 is what makes the controller settle: the update it issues produces a
//! new watch event, and that event finds every key present and does nothing.
//!
//! No path returns an error; every outcome is logged and reported as a
//! [`ReconcileOutcome`].

use crate::constants::CURL_ANNOTATION;
use crate::directive::DirectiveSet;
use crate::fetcher::PageFetcher;
use crate::observability::metrics;
use crate::watch::DataUpdater;
use k8s_openapi::api::core::v1::ConfigMap;
use tracing::{error, info, info_span, Instrument};

/// Which path a reconciliation took
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// The ConfigMap carries no curl annotation
    Skipped,
    /// The annotation could not be parsed
    InvalidAnnotation,
    /// Nothing new to write: every key present already, or every fetch failed
    AlreadyProcessed,
    /// Content was fetched but the patch failed
    UpdateFailed,
    /// The listed keys were added to the ConfigMap
    Updated { keys: Vec<String> },
}

impl ReconcileOutcome {
    /// Metric label for this outcome
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            ReconcileOutcome::Skipped => "skipped",
            ReconcileOutcome::InvalidAnnotation => "invalid-annotation",
            ReconcileOutcome::AlreadyProcessed => "already-processed",
            ReconcileOutcome::UpdateFailed => "update-failed",
            ReconcileOutcome::Updated { .. } => "updated",
        }
    }
}

/// Reconcile a single ConfigMap snapshot
pub async fn curl_config_map<F, U>(
    config_map: &ConfigMap,
    fetcher: &F,
    updater: &U,
) -> ReconcileOutcome
where
    F: PageFetcher + ?Sized,
    U: DataUpdater + ?Sized,
{
    let (namespace, name) = identity(config_map);
    let span = info_span!("reconcile", namespace, name);

    reconcile(config_map, fetcher, updater).instrument(span).await
}

async fn reconcile<F, U>(config_map: &ConfigMap, fetcher: &F, updater: &U) -> ReconcileOutcome
where
    F: PageFetcher + ?Sized,
    U: DataUpdater + ?Sized,
{
    let Some(annotation) = config_map
        .metadata
        .annotations
        .as_ref()
        .and_then(|annotations| annotations.get(CURL_ANNOTATION))
    else {
        info!("Skipping configmap without annotation");
        return ReconcileOutcome::Skipped;
    };

    let mut directives: DirectiveSet = match annotation.parse() {
        Ok(directives) => directives,
        Err(e) => {
            error!(error = %e, annotation = %annotation, "Cannot parse URLs");
            return ReconcileOutcome::InvalidAnnotation;
        }
    };

    // Keys under binaryData count too: the API server rejects a key present in both maps
    if let Some(data) = &config_map.data {
        directives.exclude(data.keys());
    }
    if let Some(binary_data) = &config_map.binary_data {
        directives.exclude(binary_data.keys());
    }

    let outcome = directives.fetch(fetcher).await;
    if let Some(e) = &outcome.error {
        // Not fatal: whatever did arrive is still written
        error!(error = %e, "Cannot fetch URLs");
    }

    if outcome.data.is_empty() {
        info!("Leaving configmap already processed");
        return ReconcileOutcome::AlreadyProcessed;
    }

    if let Err(e) = updater.update_data(config_map, &outcome.data).await {
        metrics::record_update(false);
        error!(error = %e, "Cannot add data");
        return ReconcileOutcome::UpdateFailed;
    }
    metrics::record_update(true);

    info!(data = ?outcome.data, "Curled data into ConfigMap");
    ReconcileOutcome::Updated {
        keys: outcome.data.into_keys().collect(),
    }
}

/// Namespace and name for log context, `unknown` where the snapshot lacks one
fn identity(config_map: &ConfigMap) -> (&str, &str) {
    (
        config_map.metadata.namespace.as_deref().unwrap_or("unknown"),
        config_map.metadata.name.as_deref().unwrap_or("unknown"),
    )
}
