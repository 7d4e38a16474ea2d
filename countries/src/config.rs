use serde::Deserialize;
use std::time::Duration;
use url::Url;

use crate::client::Backoff;

#[derive(thiserror::Error, Debug, PartialEq)]
pub enum ValidationError {
    #[error("Port cannot be 0")]
    InvalidPort,

    #[error("max_retries must be at least 1")]
    NoRetries,

    #[error("Empty store path")]
    EmptyStorePath,
}

#[derive(Clone, Deserialize, Debug, PartialEq)]
pub struct Listener {
    pub host: String,
    pub port: u16,
}

impl Default for Listener {
    fn default() -> Self {
        Listener {
            host: "127.0.0.1".into(),
            port: 3000,
        }
    }
}

/// Connection and retry settings for the upstream country provider.
#[derive(Clone, Deserialize, Debug, PartialEq)]
#[serde(default)]
pub struct Upstream {
    pub base_url: Url,
    pub timeout_secs: u64,
    pub max_retries: u32,
    pub initial_delay_secs: u64,
}

impl Upstream {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn backoff(&self) -> Backoff {
        Backoff::new(
            self.max_retries,
            Duration::from_secs(self.initial_delay_secs),
        )
    }
}

impl Default for Upstream {
    fn default() -> Self {
        Upstream {
            base_url: Url::parse(crate::client::DEFAULT_BASE_URL)
                .expect("default base URL is a valid URL"),
            timeout_secs: 30,
            max_retries: 3,
            initial_delay_secs: 1,
        }
    }
}

#[derive(Clone, Deserialize, Debug, PartialEq)]
pub struct Store {
    pub path: String,
}

impl Default for Store {
    fn default() -> Self {
        Store {
            path: "country_data.db".into(),
        }
    }
}

#[derive(Clone, Deserialize, Debug, Default, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub listener: Listener,
    #[serde(default)]
    pub upstream: Upstream,
    #[serde(default)]
    pub store: Store,
}

impl Config {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.listener.port == 0 {
            return Err(ValidationError::InvalidPort);
        }
        if self.upstream.max_retries == 0 {
            return Err(ValidationError::NoRetries);
        }
        if self.store.path.trim().is_empty() {
            return Err(ValidationError::EmptyStorePath);
        }
        Ok(())
    }
}
