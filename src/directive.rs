//! # Directives
//!
//! Parsing of the `x-k8s.io/curl-me-that` annotation into a [`DirectiveSet`],
//! exclusion of keys the ConfigMap already holds, and best-effort fetching.
//!
//! ## Grammar
//!
//! ```text
//! annotation = entry *( ("," | newline) entry )
//! entry      = key "=" url
//! ```
//!
//! - Whitespace around entries, keys and URLs is ignored, as are empty entries.
//! - The entry is split on the first `=`, so URLs may carry `=` in their query.
//! - Keys follow ConfigMap data key rules: `[-._a-zA-Z0-9]+`, at most 253 chars,
//!   neither `.` nor starting with `..`.
//! - A URL without `://` is fetched over `http`. Only `http` and `https` are allowed.
//! - A single malformed entry rejects the whole annotation.
//! - When a key repeats, the later URL wins and the key keeps its first position.

use crate::constants::MAX_DATA_KEY_LENGTH;
use crate::fetcher::{PageError, PageFetcher};
use crate::observability::metrics;
use futures::future::join_all;
use regex::Regex;
use std::collections::{BTreeMap, HashSet};
use std::str::FromStr;
use std::sync::LazyLock;
use std::time::Instant;
use thiserror::Error;
use tracing::{debug, warn};
use url::Url;

static DATA_KEY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[-._a-zA-Z0-9]+$")
        .expect("Failed to compile DATA_KEY regex - this should never happen")
});

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("annotation contains no directives")]
    Empty,
    #[error("entry '{entry}' is not of the form key=url")]
    MissingSeparator { entry: String },
    #[error("'{key}' is not a valid ConfigMap key")]
    InvalidKey { key: String },
    #[error("no URL given for key '{key}'")]
    EmptyUrl { key: String },
    #[error("cannot parse URL '{url}' for key '{key}': {source}")]
    InvalidUrl {
        key: String,
        url: String,
        #[source]
        source: url::ParseError,
    },
    #[error("unsupported scheme '{scheme}' for key '{key}', expected http or https")]
    UnsupportedScheme { key: String, scheme: String },
}

/// One `{output-key, source-URL}` pair
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Directive {
    pub key: String,
    pub url: Url,
}

/// Ordered set of directives with unique keys
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DirectiveSet {
    directives: Vec<Directive>,
}

impl DirectiveSet {
    /// Add a directive, replacing the URL of an existing entry with the same key
    pub fn insert(&mut self, key: impl Into<String>, url: Url) {
        let key = key.into();
        match self.directives.iter_mut().find(|d| d.key == key) {
            Some(existing) => existing.url = url,
            None => self.directives.push(Directive { key, url }),
        }
    }

    /// Remove every directive whose key is already present in `existing`
    pub fn exclude<I, K>(&mut self, existing: I)
    where
        I: IntoIterator<Item = K>,
        K: AsRef<str>,
    {
        let existing: HashSet<String> = existing
            .into_iter()
            .map(|key| key.as_ref().to_owned())
            .collect();
        self.directives.retain(|d| !existing.contains(&d.key));
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.directives.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.directives.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Directive> {
        self.directives.iter()
    }

    #[must_use]
    pub fn keys(&self) -> Vec<&str> {
        self.directives.iter().map(|d| d.key.as_str()).collect()
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Url> {
        self.directives
            .iter()
            .find(|d| d.key == key)
            .map(|d| &d.url)
    }

    /// Fetch every directive concurrently.
    ///
    /// Failures do not stop the other fetches; they are collected into the
    /// outcome's error while the successful pages land in its data.
    pub async fn fetch<F>(&self, fetcher: &F) -> FetchOutcome
    where
        F: PageFetcher + ?Sized,
    {
        let results = join_all(self.directives.iter().map(|directive| async move {
            let started = Instant::now();
            let result = fetcher.fetch_page(&directive.url).await;
            metrics::record_fetch(result.is_ok(), started.elapsed().as_secs_f64());
            (directive, result)
        }))
        .await;

        let mut outcome = FetchOutcome::default();
        let mut failures = Vec::new();
        for (directive, result) in results {
            match result {
                Ok(content) => {
                    debug!(key = %directive.key, url = %directive.url, "Fetched page");
                    outcome.data.insert(directive.key.clone(), content);
                }
                Err(error) => {
                    warn!(key = %directive.key, url = %directive.url, error = %error, "Failed to fetch page");
                    failures.push(FetchFailure {
                        key: directive.key.clone(),
                        url: directive.url.clone(),
                        error,
                    });
                }
            }
        }
        if !failures.is_empty() {
            outcome.error = Some(FetchError { failures });
        }
        outcome
    }
}

impl FromStr for DirectiveSet {
    type Err = ParseError;

    fn from_str(annotation: &str) -> Result<Self, Self::Err> {
        let mut set = DirectiveSet::default();
        for entry in annotation
            .split([',', '\n'])
            .map(str::trim)
            .filter(|entry| !entry.is_empty())
        {
            let (key, raw_url) =
                entry
                    .split_once('=')
                    .ok_or_else(|| ParseError::MissingSeparator {
                        entry: entry.to_string(),
                    })?;
            let key = key.trim();
            let raw_url = raw_url.trim();

            if !is_data_key(key) {
                return Err(ParseError::InvalidKey {
                    key: key.to_string(),
                });
            }
            if raw_url.is_empty() {
                return Err(ParseError::EmptyUrl {
                    key: key.to_string(),
                });
            }

            set.insert(key, parse_url(key, raw_url)?);
        }

        if set.is_empty() {
            return Err(ParseError::Empty);
        }
        Ok(set)
    }
}

/// ConfigMap data key rules: the `[-._a-zA-Z0-9]` alphabet, at most 253
/// characters, not `.` and not starting with `..`
fn is_data_key(key: &str) -> bool {
    key.len() <= MAX_DATA_KEY_LENGTH
        && DATA_KEY.is_match(key)
        && key != "."
        && !key.starts_with("..")
}

fn parse_url(key: &str, raw_url: &str) -> Result<Url, ParseError> {
    let url = if raw_url.contains("://") {
        Url::parse(raw_url)
    } else {
        Url::parse(&format!("http://{raw_url}"))
    }
    .map_err(|source| ParseError::InvalidUrl {
        key: key.to_string(),
        url: raw_url.to_string(),
        source,
    })?;

    match url.scheme() {
        "http" | "https" => Ok(url),
        scheme => Err(ParseError::UnsupportedScheme {
            key: key.to_string(),
            scheme: scheme.to_string(),
        }),
    }
}

/// A directive whose URL could not be fetched
#[derive(Debug)]
pub struct FetchFailure {
    pub key: String,
    pub url: Url,
    pub error: PageError,
}

/// One or more directives failed; carries the details of each failure
#[derive(Debug, Error)]
#[error("failed to fetch {} URL(s): {}", .failures.len(), describe_failures(.failures))]
pub struct FetchError {
    pub failures: Vec<FetchFailure>,
}

fn describe_failures(failures: &[FetchFailure]) -> String {
    failures
        .iter()
        .map(|failure| format!("{} ({}): {}", failure.key, failure.url, failure.error))
        .collect::<Vec<_>>()
        .join("; ")
}

/// Result of a best-effort fetch: the content that arrived, and what did not
#[derive(Debug, Default)]
pub struct FetchOutcome {
    pub data: BTreeMap<String, String>,
    pub error: Option<FetchError>,
}
