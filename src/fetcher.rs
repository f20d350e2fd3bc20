//! # Page Fetcher
//!
//! Retrieval of a single URL. The [`PageFetcher`] trait is the seam the
//! directive set fetches through; [`HttpFetcher`] is the reqwest-backed
//! production implementation.

use crate::constants::USER_AGENT;
use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;
use url::Url;

/// Why a single URL produced no content
#[derive(Debug, Error)]
pub enum PageError {
    #[error("server responded with HTTP {status}")]
    Status { status: u16 },
    #[error("request failed: {0}")]
    Transport(#[source] reqwest::Error),
    #[error("response body is empty")]
    EmptyBody,
    #[error("response body exceeds {limit} bytes")]
    TooLarge { limit: usize },
    #[error("response body is not valid UTF-8")]
    InvalidUtf8(#[source] std::string::FromUtf8Error),
}

/// Retrieves the content behind one URL
#[async_trait]
pub trait PageFetcher: Send + Sync {
    /// Fetch `url` and return its body as text.
    ///
    /// Implementations must never return an empty body as success.
    async fn fetch_page(&self, url: &Url) -> Result<String, PageError>;
}

/// HTTP(S) fetcher backed by a shared reqwest client
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
    max_page_size: usize,
}

impl HttpFetcher {
    /// Build a fetcher with a per-request `timeout` and a body size limit.
    ///
    /// # Errors
    ///
    /// Returns an error if the TLS backend cannot be initialised.
    pub fn new(timeout: Duration, max_page_size: usize) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()?;
        Ok(Self {
            client,
            max_page_size,
        })
    }
}

#[async_trait]
impl PageFetcher for HttpFetcher {
    async fn fetch_page(&self, url: &Url) -> Result<String, PageError> {
        debug!(url = %url, "Fetching page");
        let mut response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(PageError::Transport)?;

        let status = response.status();
        if !status.is_success() {
            return Err(PageError::Status {
                status: status.as_u16(),
            });
        }

        let limit = self.max_page_size;
        if response
            .content_length()
            .is_some_and(|length| length > limit as u64)
        {
            return Err(PageError::TooLarge { limit });
        }

        // Content-Length can be absent or wrong, so enforce the limit while reading
        let mut body = Vec::new();
        while let Some(chunk) = response.chunk().await.map_err(PageError::Transport)? {
            if body.len() + chunk.len() > limit {
                return Err(PageError::TooLarge { limit });
            }
            body.extend_from_slice(&chunk);
        }

        let text = String::from_utf8(body).map_err(PageError::InvalidUtf8)?;
        if text.trim().is_empty() {
            return Err(PageError::EmptyBody);
        }
        Ok(text)
    }
}
