//! # Watch Loop
//!
//! Runs the reconciler over the ConfigMap stream, one snapshot at a time, and
//! stops the stream when SIGINT or SIGTERM arrives.

use crate::fetcher::PageFetcher;
use crate::observability::metrics;
use crate::reconciler::curl_config_map;
use crate::server::ServerState;
use crate::watch::{DataUpdater, StopHandle};
use futures::{Stream, StreamExt};
use k8s_openapi::api::core::v1::ConfigMap;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::info;

/// Reconcile every snapshot in order until the stream ends.
///
/// Returns the number of snapshots processed.
pub async fn run_watch_loop<S, F, U>(configmaps: S, fetcher: &F, updater: &U) -> usize
where
    S: Stream<Item = ConfigMap>,
    F: PageFetcher + ?Sized,
    U: DataUpdater + ?Sized,
{
    let mut configmaps = std::pin::pin!(configmaps);
    let mut processed = 0;
    while let Some(config_map) = configmaps.next().await {
        let outcome = curl_config_map(&config_map, fetcher, updater).await;
        metrics::increment_reconciliations(outcome.as_str());
        processed += 1;
    }
    info!(processed, "ConfigMap stream ended");
    processed
}

/// Handlers for SIGINT and SIGTERM, registered before the watch loop starts
#[derive(Debug)]
pub struct TerminationSignals {
    #[cfg(unix)]
    interrupt: tokio::signal::unix::Signal,
    #[cfg(unix)]
    terminate: tokio::signal::unix::Signal,
    #[cfg(not(unix))]
    ctrl_c: tokio::signal::windows::CtrlC,
}

impl TerminationSignals {
    /// Install the signal handlers.
    ///
    /// # Errors
    ///
    /// Fails when the operating system refuses a handler.
    #[cfg(unix)]
    pub fn register() -> std::io::Result<Self> {
        use tokio::signal::unix::{signal, SignalKind};

        Ok(Self {
            interrupt: signal(SignalKind::interrupt())?,
            terminate: signal(SignalKind::terminate())?,
        })
    }

    /// Install the signal handlers.
    ///
    /// # Errors
    ///
    /// Fails when the operating system refuses a handler.
    #[cfg(not(unix))]
    pub fn register() -> std::io::Result<Self> {
        Ok(Self {
            ctrl_c: tokio::signal::windows::ctrl_c()?,
        })
    }

    /// Wait for the next termination signal and return its name
    #[cfg(unix)]
    pub async fn recv(&mut self) -> &'static str {
        tokio::select! {
            _ = self.interrupt.recv() => "SIGINT",
            _ = self.terminate.recv() => "SIGTERM",
        }
    }

    /// Wait for the next termination signal and return its name
    #[cfg(not(unix))]
    pub async fn recv(&mut self) -> &'static str {
        self.ctrl_c.recv().await;
        "SIGINT"
    }
}

/// Wait for a termination signal, then mark the controller not ready and stop the watch
pub fn spawn_shutdown_listener(
    mut signals: TerminationSignals,
    stop: StopHandle,
    server_state: Arc<ServerState>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let signal = signals.recv().await;
        info!(signal, "Received signal for termination");
        server_state.set_ready(false);
        stop.stop();
    })
}
