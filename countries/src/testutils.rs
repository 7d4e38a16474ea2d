use crate::client::{Backoff, CountrySource, FetchError};
use crate::types::RawCountry;
use async_trait::async_trait;
use reqwest::StatusCode;
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// Always returns the same records.
pub struct StaticSource {
    pub records: Vec<RawCountry>,
}

#[async_trait]
impl CountrySource for StaticSource {
    async fn fetch_all(&self) -> Result<Vec<RawCountry>, FetchError> {
        Ok(self.records.clone())
    }
}

/// Fails every call with a 502 and counts the calls.
#[derive(Default)]
pub struct UnavailableSource {
    calls: AtomicUsize,
}

impl UnavailableSource {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CountrySource for UnavailableSource {
    async fn fetch_all(&self) -> Result<Vec<RawCountry>, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(FetchError::Status(StatusCode::BAD_GATEWAY))
    }
}

pub fn raw_countries(count: usize) -> Vec<RawCountry> {
    (0..count)
        .map(|i| json!({"name": {"common": format!("Country {i}")}, "population": i}))
        .collect()
}

pub fn fast_backoff() -> Backoff {
    Backoff::new(3, Duration::from_millis(1))
}
