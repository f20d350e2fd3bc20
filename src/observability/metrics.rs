//! # Metrics
//!
//! Prometheus metrics for monitoring the controller.
//!
//! ## Metrics Exposed
//!
//! - `curl_me_that_reconciliations_total{outcome}` - Reconciliations by outcome
//! - `curl_me_that_fetches_total{result}` - URL fetches by result (success/failure)
//! - `curl_me_that_fetch_duration_seconds` - Duration of single URL fetches
//! - `curl_me_that_updates_total{result}` - ConfigMap data patches by result

use anyhow::Result;
use prometheus::{Histogram, HistogramOpts, IntCounterVec, Opts, Registry};
use std::sync::LazyLock;

pub(crate) static REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

static RECONCILIATIONS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new(
            "curl_me_that_reconciliations_total",
            "Total number of ConfigMap reconciliations by outcome",
        ),
        &["outcome"],
    )
    .expect("Failed to create RECONCILIATIONS_TOTAL metric - this should never happen")
});

static FETCHES_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new("curl_me_that_fetches_total", "Total number of URL fetches"),
        &["result"],
    )
    .expect("Failed to create FETCHES_TOTAL metric - this should never happen")
});

static FETCH_DURATION: LazyLock<Histogram> = LazyLock::new(|| {
    Histogram::with_opts(
        HistogramOpts::new(
            "curl_me_that_fetch_duration_seconds",
            "Duration of URL fetches in seconds",
        )
        .buckets(vec![0.05, 0.1, 0.5, 1.0, 2.0, 5.0, 10.0]),
    )
    .expect("Failed to create FETCH_DURATION metric - this should never happen")
});

static UPDATES_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new(
            "curl_me_that_updates_total",
            "Total number of ConfigMap data patches",
        ),
        &["result"],
    )
    .expect("Failed to create UPDATES_TOTAL metric - this should never happen")
});

/// Register all controller metrics with the shared registry.
///
/// # Errors
///
/// Fails if called more than once for the same registry.
pub fn register_metrics() -> Result<()> {
    REGISTRY.register(Box::new(RECONCILIATIONS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(FETCHES_TOTAL.clone()))?;
    REGISTRY.register(Box::new(FETCH_DURATION.clone()))?;
    REGISTRY.register(Box::new(UPDATES_TOTAL.clone()))?;

    Ok(())
}

pub fn increment_reconciliations(outcome: &str) {
    RECONCILIATIONS_TOTAL.with_label_values(&[outcome]).inc();
}

pub fn record_fetch(success: bool, duration: f64) {
    let result = if success { "success" } else { "failure" };
    FETCHES_TOTAL.with_label_values(&[result]).inc();
    FETCH_DURATION.observe(duration);
}

pub fn record_update(success: bool) {
    let result = if success { "success" } else { "failure" };
    UPDATES_TOTAL.with_label_values(&[result]).inc();
}
