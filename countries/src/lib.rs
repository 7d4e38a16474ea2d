//! Mirrors country reference data from a public country API into a local
//! relational store and serves it as JSON.
//!
//! The ingestion path is [`client`] → [`normalizer`] → [`store`], composed by
//! [`refresh::Refresher`].

pub mod api;
pub mod client;
pub mod config;
pub mod metrics_defs;
pub mod normalizer;
pub mod refresh;
pub mod store;
pub mod types;

#[cfg(test)]
mod testutils;

use crate::api::{AppState, ServeError};
use crate::client::{FetchError, RestCountriesClient};
use crate::config::{Config, ValidationError};
use crate::refresh::{RefreshOutcome, Refresher};
use crate::store::{CountryStore, SqliteCountryStore, StoreError};
use std::sync::Arc;

#[derive(thiserror::Error, Debug)]
pub enum CountriesError {
    #[error("invalid config: {0}")]
    Validation(#[from] ValidationError),
    #[error("could not open store: {0}")]
    Store(#[from] StoreError),
    #[error("could not build upstream client: {0}")]
    Client(#[from] FetchError),
    #[error("server error: {0}")]
    Serve(#[from] ServeError),
}

/// Opens the store and builds the upstream client and refresher from config.
pub fn build(config: &Config) -> Result<(Refresher, Arc<dyn CountryStore>), CountriesError> {
    config.validate()?;

    let store: Arc<dyn CountryStore> = Arc::new(SqliteCountryStore::open(&config.store.path)?);
    let client = RestCountriesClient::new(
        config.upstream.base_url.clone(),
        config.upstream.timeout(),
    )?;
    let refresher = Refresher::new(Arc::new(client), store.clone(), config.upstream.backoff());

    Ok((refresher, store))
}

/// Serves the JSON API until the listener fails.
pub async fn run(config: Config) -> Result<(), CountriesError> {
    let (refresher, store) = build(&config)?;
    api::serve(&config.listener, AppState::new(refresher, store)).await?;
    Ok(())
}

/// Runs a single refresh against the configured upstream and store.
pub async fn refresh_once(config: Config) -> Result<RefreshOutcome, CountriesError> {
    let (refresher, _store) = build(&config)?;
    Ok(refresher.refresh().await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_build_rejects_invalid_config() {
        let mut config = Config::default();
        config.upstream.max_retries = 0;
        assert!(matches!(
            build(&config),
            Err(CountriesError::Validation(ValidationError::NoRetries))
        ));
    }

    #[tokio::test]
    async fn test_refresh_once() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v3.1/all"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {"name": {"common": "Peru"}, "region": "Americas"},
                {"name": {"common": "Chile"}, "region": "Americas"}
            ])))
            .mount(&mock_server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.upstream.base_url = format!("{}/v3.1", mock_server.uri()).parse().unwrap();
        config.store.path = dir.path().join("countries.db").to_str().unwrap().into();

        let outcome = refresh_once(config.clone()).await.unwrap();
        assert!(outcome.success);
        assert_eq!(outcome.total_saved, 2);

        let store = SqliteCountryStore::open(&config.store.path).unwrap();
        assert_eq!(store.regions().unwrap(), vec!["Americas"]);
    }
}
