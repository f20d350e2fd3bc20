//! # ConfigMap Watch
//!
//! Watches ConfigMaps cluster-wide (or in one namespace) and writes fetched data
//! back through a JSON merge patch.
//!
//! [`ConfigMapManager::start_watching`] hands out the event stream together with
//! a [`StopHandle`]. Stopping consumes the handle, so the stream can only be
//! asked to end once.

use crate::constants::FIELD_MANAGER;
use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::{Stream, StreamExt};
use k8s_openapi::api::core::v1::ConfigMap;
use kube::api::{Api, ListParams, Patch, PatchParams};
use kube::Client;
use kube_runtime::{watcher, WatchStreamExt};
use std::collections::BTreeMap;
use thiserror::Error;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

/// Stream of ConfigMap snapshots, one per create/update event
pub type ConfigMapStream = BoxStream<'static, ConfigMap>;

#[derive(Debug, Error)]
pub enum UpdateError {
    #[error("ConfigMap snapshot has no {0}")]
    MissingMetadata(&'static str),
    #[error("ConfigMap {namespace}/{name} no longer exists")]
    NotFound { namespace: String, name: String },
    #[error("conflicting write to ConfigMap {namespace}/{name}")]
    Conflict {
        namespace: String,
        name: String,
        #[source]
        source: kube::Error,
    },
    #[error("Kubernetes API rejected the update: {0}")]
    Api(#[source] kube::Error),
    #[error("cannot reach the Kubernetes API: {0}")]
    Transport(#[source] kube::Error),
}

/// Applies key/value pairs to the data of a ConfigMap
#[async_trait]
pub trait DataUpdater: Send + Sync {
    /// Merge `data` into the ConfigMap identified by `config_map`.
    ///
    /// Keys not named in `data` must be left untouched.
    async fn update_data(
        &self,
        config_map: &ConfigMap,
        data: &BTreeMap<String, String>,
    ) -> Result<(), UpdateError>;
}

/// Ends the stream returned alongside it
#[derive(Debug)]
pub struct StopHandle {
    sender: oneshot::Sender<()>,
}

impl StopHandle {
    /// Ask the stream to end. Never blocks.
    pub fn stop(self) {
        if self.sender.send(()).is_err() {
            debug!("Watch stream already ended before stop was requested");
        }
    }
}

/// Wrap `stream` so that it ends when the returned handle is used or dropped
pub fn stoppable<S>(stream: S) -> (BoxStream<'static, S::Item>, StopHandle)
where
    S: Stream + Send + 'static,
{
    let (sender, receiver) = oneshot::channel();
    (stream.take_until(receiver).boxed(), StopHandle { sender })
}

/// Watches ConfigMaps and patches their data
#[derive(Clone)]
pub struct ConfigMapManager {
    client: Client,
    namespace: Option<String>,
    label_selector: Option<String>,
}

impl std::fmt::Debug for ConfigMapManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfigMapManager")
            .field("namespace", &self.namespace)
            .field("label_selector", &self.label_selector)
            .finish_non_exhaustive()
    }
}

impl ConfigMapManager {
    #[must_use]
    pub fn new(client: Client) -> Self {
        Self {
            client,
            namespace: None,
            label_selector: None,
        }
    }

    /// Restrict the watch to one namespace
    #[must_use]
    pub fn with_namespace(mut self, namespace: Option<String>) -> Self {
        self.namespace = namespace;
        self
    }

    /// Restrict the watch to ConfigMaps matching a label selector
    #[must_use]
    pub fn with_label_selector(mut self, label_selector: Option<String>) -> Self {
        self.label_selector = label_selector;
        self
    }

    fn api(&self) -> Api<ConfigMap> {
        match &self.namespace {
            Some(namespace) => Api::namespaced(self.client.clone(), namespace),
            None => Api::all(self.client.clone()),
        }
    }

    /// Establish the watch.
    ///
    /// A one-item list is issued first so that authorization or connectivity
    /// problems surface here instead of inside the watcher's retry loop.
    ///
    /// # Errors
    ///
    /// Returns the API error if ConfigMaps cannot be listed.
    pub async fn start_watching(&self) -> Result<(ConfigMapStream, StopHandle), kube::Error> {
        let api = self.api();

        let mut list_params = ListParams::default().limit(1);
        let mut watcher_config = watcher::Config::default();
        if let Some(selector) = &self.label_selector {
            list_params = list_params.labels(selector);
            watcher_config = watcher_config.labels(selector);
        }
        api.list(&list_params).await?;

        info!(
            namespace = self.namespace.as_deref().unwrap_or("*"),
            label_selector = self.label_selector.as_deref().unwrap_or(""),
            "Watching ConfigMaps"
        );

        let events = watcher(api, watcher_config)
            .applied_objects()
            .default_backoff()
            .filter_map(|event| async move {
                match event {
                    Ok(config_map) => Some(config_map),
                    Err(e) => {
                        warn!(error = %e, "ConfigMap watch error, retrying");
                        None
                    }
                }
            });

        Ok(stoppable(events))
    }
}

#[async_trait]
impl DataUpdater for ConfigMapManager {
    async fn update_data(
        &self,
        config_map: &ConfigMap,
        data: &BTreeMap<String, String>,
    ) -> Result<(), UpdateError> {
        let name = config_map
            .metadata
            .name
            .as_deref()
            .ok_or(UpdateError::MissingMetadata("name"))?;
        let namespace = config_map
            .metadata
            .namespace
            .as_deref()
            .ok_or(UpdateError::MissingMetadata("namespace"))?;

        let api: Api<ConfigMap> = Api::namespaced(self.client.clone(), namespace);
        let patch = data_patch(data);
        let params = PatchParams {
            field_manager: Some(FIELD_MANAGER.to_string()),
            ..PatchParams::default()
        };

        api.patch(name, &params, &Patch::Merge(&patch))
            .await
            .map(|_| ())
            .map_err(|e| classify_update_error(e, namespace, name))
    }
}

/// Merge patch that adds `data` and touches nothing else
#[must_use]
pub fn data_patch(data: &BTreeMap<String, String>) -> serde_json::Value {
    serde_json::json!({ "data": data })
}

fn classify_update_error(error: kube::Error, namespace: &str, name: &str) -> UpdateError {
    let code = match &error {
        kube::Error::Api(status) => Some(status.code),
        _ => None,
    };
    match code {
        Some(404) => UpdateError::NotFound {
            namespace: namespace.to_string(),
            name: name.to_string(),
        },
        Some(409) => UpdateError::Conflict {
            namespace: namespace.to_string(),
            name: name.to_string(),
            source: error,
        },
        Some(_) => UpdateError::Api(error),
        None => UpdateError::Transport(error),
    }
}
