//! Remote client for the upstream country provider.
//!
//! Every request is a single GET; retrying is layered on top with
//! [`retry_fetch`], which works for any of the fetch operations.

use crate::metrics_defs::{UPSTREAM_FETCH_ATTEMPTS, UPSTREAM_FETCH_FAILURES, counter};
use crate::types::RawCountry;
use async_trait::async_trait;
use reqwest::{StatusCode, Url};
use std::future::Future;
use tokio::time::{Duration, sleep};

pub const DEFAULT_BASE_URL: &str = "https://restcountries.com/v3.1";

#[derive(thiserror::Error, Debug)]
pub enum FetchError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("upstream returned status {0}")]
    Status(StatusCode),
    #[error("invalid response body: {0}")]
    Decode(#[source] reqwest::Error),
    #[error("invalid URL: {0}")]
    InvalidUrl(String),
    #[error("upstream unavailable after {attempts} attempts")]
    RetriesExhausted { attempts: u32 },
}

/// Source of raw country records. The orchestrator depends on this rather than
/// on the HTTP client directly.
#[async_trait]
pub trait CountrySource: Send + Sync {
    async fn fetch_all(&self) -> Result<Vec<RawCountry>, FetchError>;
}

pub struct RestCountriesClient {
    client: reqwest::Client,
    base_url: Url,
}

impl RestCountriesClient {
    pub fn new(base_url: Url, timeout: Duration) -> Result<Self, FetchError> {
        if base_url.cannot_be_a_base() {
            return Err(FetchError::InvalidUrl(base_url.to_string()));
        }

        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(RestCountriesClient { client, base_url })
    }

    pub async fn fetch_by_name(&self, name: &str) -> Result<Vec<RawCountry>, FetchError> {
        tracing::info!(name, "Fetching country data by name");
        self.get(&["name", name]).await
    }

    pub async fn fetch_by_region(&self, region: &str) -> Result<Vec<RawCountry>, FetchError> {
        tracing::info!(region, "Fetching countries in region");
        self.get(&["region", region]).await
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url, FetchError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| FetchError::InvalidUrl(self.base_url.to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn get(&self, segments: &[&str]) -> Result<Vec<RawCountry>, FetchError> {
        let url = self.endpoint(segments)?;
        counter!(UPSTREAM_FETCH_ATTEMPTS).increment(1);

        let result = self.send(url.clone()).await;
        if let Err(err) = &result {
            counter!(UPSTREAM_FETCH_FAILURES).increment(1);
            tracing::error!(%url, error = %err, "Error fetching countries data");
        }
        result
    }

    async fn send(&self, url: Url) -> Result<Vec<RawCountry>, FetchError> {
        let response = self.client.get(url).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status(status));
        }

        response
            .json::<Vec<RawCountry>>()
            .await
            .map_err(FetchError::Decode)
    }
}

#[async_trait]
impl CountrySource for RestCountriesClient {
    async fn fetch_all(&self) -> Result<Vec<RawCountry>, FetchError> {
        tracing::info!("Fetching all countries data");
        self.get(&["all"]).await
    }
}

/// Bounded exponential backoff: `initial_delay * 2^attempt` after each failed attempt.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Backoff {
    pub max_retries: u32,
    pub initial_delay: Duration,
}

impl Backoff {
    pub fn new(max_retries: u32, initial_delay: Duration) -> Self {
        Backoff {
            max_retries,
            initial_delay,
        }
    }

    /// Delay to wait after the failed attempt with the given zero-based index.
    pub fn delay(&self, attempt: u32) -> Duration {
        self.initial_delay
            .saturating_mul(2_u32.saturating_pow(attempt))
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Backoff::new(3, Duration::from_secs(1))
    }
}

/// Calls `operation` up to `backoff.max_retries` times and returns the first
/// success. Sleeps after every failed attempt, including the last one.
pub async fn retry_fetch<T, F, Fut>(backoff: &Backoff, mut operation: F) -> Result<T, FetchError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, FetchError>>,
{
    for attempt in 0..backoff.max_retries {
        match operation().await {
            Ok(result) => return Ok(result),
            Err(err) => {
                let wait = backoff.delay(attempt);
                tracing::warn!(
                    attempt = attempt + 1,
                    max_retries = backoff.max_retries,
                    wait_secs = wait.as_secs_f64(),
                    error = %err,
                    "Upstream fetch failed, backing off"
                );
                sleep(wait).await;
            }
        }
    }

    tracing::error!(max_retries = backoff.max_retries, "All retries failed");
    Err(FetchError::RetriesExhausted {
        attempts: backoff.max_retries,
    })
}
