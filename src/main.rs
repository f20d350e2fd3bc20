//! # curl-me-that Controller
//!
//! A Kubernetes controller that fills ConfigMaps with content fetched from URLs.
//!
//! ## Overview
//!
//! Annotate a ConfigMap with `x-k8s.io/curl-me-that: key=url[,key=url...]` and
//! the controller fetches each URL once and stores the body under `key` in the
//! ConfigMap's `data`. Keys that already exist are never fetched again, so the
//! controller settles after a single update.
//!
//! ## Usage
//!
//! ```text
//! KUBECONFIG=~/.kube/config curl-me-that-controller --namespace default
//! ```
//!
//! See `--help` for every flag and its environment variable.

use anyhow::Result;
use clap::Parser;
use curl_me_that_controller::config::ControllerConfig;
use curl_me_that_controller::observability;
use curl_me_that_controller::runtime::{initialize, run_watch_loop, spawn_shutdown_listener};
use std::process::ExitCode;
use tracing::{error, info};

#[tokio::main]
async fn main() -> ExitCode {
    let config = ControllerConfig::parse();

    if let Err(e) = observability::init_tracing(config.log_format) {
        eprintln!("{e:#}");
        return ExitCode::FAILURE;
    }

    match run(&config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = ?e, "Controller failed to start");
            ExitCode::FAILURE
        }
    }
}

async fn run(config: &ControllerConfig) -> Result<()> {
    let runtime = initialize(config).await?;

    spawn_shutdown_listener(runtime.signals, runtime.stop, runtime.server_state);

    run_watch_loop(runtime.configmaps, &runtime.fetcher, &runtime.manager).await;

    info!("Controller stopped");
    Ok(())
}
