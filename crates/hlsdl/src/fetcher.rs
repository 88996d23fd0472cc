// Fetch port: raw byte download of playlists, keys and segments with retry logic.

use crate::config::FetchConfig;
use crate::error::DownloadError;
use crate::retry::{RetryAction, RetryPolicy, is_retryable_reqwest_error, retry_with_backoff};
use async_trait::async_trait;
use bytes::Bytes;
use reqwest::Client;
use reqwest::header::HeaderMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

/// Capability to fetch the body of a URL.
///
/// Implementations perform their own bounded retries; an `Err` means every
/// attempt was used up (or the failure could not be retried).
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, url: &str, headers: &HeaderMap) -> Result<Bytes, DownloadError>;
}

pub struct HttpFetcher {
    http_client: Client,
    headers: HeaderMap,
    timeout: Duration,
    policy: RetryPolicy,
    token: CancellationToken,
}

impl HttpFetcher {
    /// Build a fetcher with its own `reqwest` client configured from `config`.
    pub fn new(config: &FetchConfig, token: CancellationToken) -> Result<Self, DownloadError> {
        let http_client = Self::build_client(config)?;
        Self::with_client(http_client, config, token)
    }

    /// Create a fetcher around an existing client.
    pub fn with_client(
        http_client: Client,
        config: &FetchConfig,
        token: CancellationToken,
    ) -> Result<Self, DownloadError> {
        Ok(Self {
            http_client,
            headers: config.request_headers()?,
            timeout: config.timeout,
            policy: RetryPolicy::new(config.max_retries, config.retry_delay),
            token,
        })
    }

    pub fn build_client(config: &FetchConfig) -> Result<Client, DownloadError> {
        let client = Client::builder()
            .user_agent(config.user_agent.as_str())
            .connect_timeout(config.timeout)
            .danger_accept_invalid_certs(config.danger_accept_invalid_certs)
            .build()?;
        Ok(client)
    }

    /// Headers sent with every request before per-call headers are merged in.
    pub fn default_headers(&self) -> &HeaderMap {
        &self.headers
    }

    async fn fetch_once(&self, url: &str, headers: &HeaderMap) -> RetryAction<Bytes> {
        let started = Instant::now();
        let response = match self
            .http_client
            .get(url)
            .headers(headers.clone())
            .timeout(self.timeout)
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) if is_retryable_reqwest_error(&e) => return RetryAction::Retry(e.into()),
            Err(e) => return RetryAction::Fail(e.into()),
        };

        let status = response.status();
        if !status.is_success() {
            return RetryAction::Retry(DownloadError::http_status(status, url));
        }

        match response.bytes().await {
            Ok(bytes) => {
                trace!(
                    url,
                    bytes = bytes.len(),
                    latency_ms = started.elapsed().as_millis() as u64,
                    "Fetched"
                );
                RetryAction::Success(bytes)
            }
            Err(e) if is_retryable_reqwest_error(&e) => RetryAction::Retry(e.into()),
            Err(e) => RetryAction::Fail(e.into()),
        }
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, url: &str, headers: &HeaderMap) -> Result<Bytes, DownloadError> {
        // Per-call headers are merged over the configured ones.
        let mut merged = self.headers.clone();
        for (name, value) in headers.iter() {
            merged.insert(name.clone(), value.clone());
        }

        let attempts = AtomicU32::new(0);
        let result = retry_with_backoff(&self.policy, &self.token, |_| {
            attempts.fetch_add(1, Ordering::Relaxed);
            self.fetch_once(url, &merged)
        })
        .await;

        result.map_err(|err| match err {
            DownloadError::Cancelled => DownloadError::Cancelled,
            other => {
                let attempts = attempts.load(Ordering::Relaxed);
                debug!(url, attempts, error = %other, "Fetch failed");
                DownloadError::FetchFailed {
                    url: url.to_owned(),
                    attempts,
                    reason: other.to_string(),
                }
            }
        })
    }
}
