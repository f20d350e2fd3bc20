//! # Initialization
//!
//! Controller startup: rustls setup, tracing, metrics, probe server, Kubernetes
//! client and the ConfigMap watch. Any failure here is fatal.

use crate::config::ControllerConfig;
use crate::fetcher::HttpFetcher;
use crate::observability;
use crate::runtime::watch_loop::TerminationSignals;
use crate::server::{start_server, ServerState};
use crate::watch::{ConfigMapManager, ConfigMapStream, StopHandle};
use anyhow::{anyhow, Context, Result};
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::Client;
use std::sync::Arc;
use tracing::{error, info};

/// Everything the reconcile loop needs once startup succeeded
pub struct InitializationResult {
    pub manager: ConfigMapManager,
    pub fetcher: HttpFetcher,
    pub configmaps: ConfigMapStream,
    pub stop: StopHandle,
    pub signals: TerminationSignals,
    pub server_state: Arc<ServerState>,
}

impl std::fmt::Debug for InitializationResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InitializationResult")
            .field("manager", &self.manager)
            .field("server_ready", &self.server_state.is_ready())
            .finish_non_exhaustive()
    }
}

/// Initialize the controller runtime
///
/// # Errors
///
/// Fails when signal handlers cannot be installed, credentials cannot be
/// loaded, the client cannot be built or the ConfigMap watch cannot be
/// established.
pub async fn initialize(config: &ControllerConfig) -> Result<InitializationResult> {
    // Required for rustls 0.23+ when no default provider is set via features
    if rustls::crypto::ring::default_provider()
        .install_default()
        .is_err()
    {
        return Err(anyhow!("Failed to install rustls crypto provider"));
    }

    info!(
        "Starting curl-me-that controller v{} (built {}, git {})",
        env!("CARGO_PKG_VERSION"),
        env!("BUILD_DATETIME"),
        env!("BUILD_GIT_HASH")
    );

    observability::metrics::register_metrics()?;

    let signals =
        TerminationSignals::register().context("Cannot listen for termination signals")?;

    let server_state = Arc::new(ServerState::default());
    let server_state_clone = Arc::clone(&server_state);
    let server_port = config.metrics_port;
    tokio::spawn(async move {
        if let Err(e) = start_server(server_port, server_state_clone).await {
            error!("HTTP server error: {}", e);
        }
    });

    let kube_config = load_kube_config(config)
        .await
        .context("Cannot load config")?;
    let client = Client::try_from(kube_config).context("Creating kubernetes client")?;

    let manager = ConfigMapManager::new(client)
        .with_namespace(config.namespace.clone())
        .with_label_selector(config.label_selector.clone());

    let fetcher = HttpFetcher::new(config.fetch_timeout(), config.max_page_size_bytes)
        .context("Creating HTTP client")?;

    let (configmaps, stop) = manager
        .start_watching()
        .await
        .context("Cannot watch ConfigMaps")?;

    server_state.set_ready(true);

    Ok(InitializationResult {
        manager,
        fetcher,
        configmaps,
        stop,
        signals,
        server_state,
    })
}

/// Load cluster credentials.
///
/// Uses the kubeconfig file(s) named by `--kubeconfig`/`KUBECONFIG` when set,
/// merging them in order, and falls back to in-cluster inference otherwise.
async fn load_kube_config(config: &ControllerConfig) -> Result<kube::Config> {
    let paths = config.kubeconfig_paths();
    if paths.is_empty() {
        info!("No kubeconfig given, inferring cluster configuration");
        return kube::Config::infer()
            .await
            .context("Failed to infer cluster configuration");
    }

    let mut merged: Option<Kubeconfig> = None;
    for path in &paths {
        let kubeconfig = Kubeconfig::read_from(path)
            .with_context(|| format!("Failed to read kubeconfig {}", path.display()))?;
        merged = Some(match merged {
            Some(previous) => previous
                .merge(kubeconfig)
                .with_context(|| format!("Failed to merge kubeconfig {}", path.display()))?,
            None => kubeconfig,
        });
    }
    let kubeconfig = merged.ok_or_else(|| anyhow!("No kubeconfig could be read"))?;

    info!("Using kubeconfig from {}", config.kubeconfig.as_deref().unwrap_or_default());
    kube::Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
        .await
        .context("Failed to build configuration from kubeconfig")
}
