//! Common test utilities
//!
//! In-memory stand-ins for the two seams the reconciler talks through:
//! a [`StubFetcher`] serving canned pages and a [`RecordingUpdater`] that
//! applies merge patches to an in-memory copy of each ConfigMap.

#![allow(dead_code, reason = "each test binary uses a different subset")]

use async_trait::async_trait;
use curl_me_that_controller::constants::CURL_ANNOTATION;
use curl_me_that_controller::{DataUpdater, PageError, PageFetcher, UpdateError};
use k8s_openapi::api::core::v1::ConfigMap;
use kube::api::ObjectMeta;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, Once};
use url::Url;

static RUSTLS_INIT: Once = Once::new();

/// Initialize rustls crypto provider for tests
///
/// Uses a `Once` to ensure it's only called once per test binary.
pub fn init_rustls() {
    RUSTLS_INIT.call_once(|| {
        // Another module in the same binary may have installed it already
        let _ = rustls::crypto::ring::default_provider().install_default();
    });
}

/// Build a ConfigMap snapshot
pub fn config_map(
    namespace: &str,
    name: &str,
    annotation: Option<&str>,
    data: &[(&str, &str)],
) -> ConfigMap {
    ConfigMap {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(namespace.to_string()),
            annotations: annotation.map(|value| {
                BTreeMap::from([(CURL_ANNOTATION.to_string(), value.to_string())])
            }),
            ..ObjectMeta::default()
        },
        data: (!data.is_empty()).then(|| {
            data.iter()
                .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
                .collect()
        }),
        ..ConfigMap::default()
    }
}

pub fn data_of(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
        .collect()
}

/// Serves canned pages; any URL it does not know answers with HTTP 503
#[derive(Debug, Default)]
pub struct StubFetcher {
    pages: HashMap<String, String>,
    calls: Mutex<Vec<String>>,
}

impl StubFetcher {
    pub fn with_page(mut self, url: &str, body: &str) -> Self {
        self.pages.insert(url.to_string(), body.to_string());
        self
    }

    /// URLs requested so far, in completion order
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().expect("calls lock").clone()
    }
}

#[async_trait]
impl PageFetcher for StubFetcher {
    async fn fetch_page(&self, url: &Url) -> Result<String, PageError> {
        self.calls
            .lock()
            .expect("calls lock")
            .push(url.to_string());
        self.pages
            .get(url.as_str())
            .cloned()
            .ok_or(PageError::Status { status: 503 })
    }
}

/// Records every update and merges it into a stored copy of the ConfigMap
#[derive(Debug, Default)]
pub struct RecordingUpdater {
    updates: Mutex<Vec<(String, BTreeMap<String, String>)>>,
    stored: Mutex<HashMap<String, ConfigMap>>,
    fail: bool,
}

impl RecordingUpdater {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    /// `(namespace/name, data)` for each update call
    pub fn updates(&self) -> Vec<(String, BTreeMap<String, String>)> {
        self.updates.lock().expect("updates lock").clone()
    }

    /// The ConfigMap as it looks after all merges applied to it
    pub fn stored(&self, namespace: &str, name: &str) -> Option<ConfigMap> {
        self.stored
            .lock()
            .expect("stored lock")
            .get(&format!("{namespace}/{name}"))
            .cloned()
    }
}

#[async_trait]
impl DataUpdater for RecordingUpdater {
    async fn update_data(
        &self,
        config_map: &ConfigMap,
        data: &BTreeMap<String, String>,
    ) -> Result<(), UpdateError> {
        let namespace = config_map
            .metadata
            .namespace
            .clone()
            .ok_or(UpdateError::MissingMetadata("namespace"))?;
        let name = config_map
            .metadata
            .name
            .clone()
            .ok_or(UpdateError::MissingMetadata("name"))?;
        let id = format!("{namespace}/{name}");

        self.updates
            .lock()
            .expect("updates lock")
            .push((id.clone(), data.clone()));

        if self.fail {
            return Err(UpdateError::NotFound { namespace, name });
        }

        let mut stored = self.stored.lock().expect("stored lock");
        let entry = stored.entry(id).or_insert_with(|| config_map.clone());
        entry
            .data
            .get_or_insert_with(BTreeMap::new)
            .extend(data.iter().map(|(k, v)| (k.clone(), v.clone())));
        Ok(())
    }
}
