use crate::client::{Backoff, CountrySource, FetchError, retry_fetch};
use crate::metrics_defs::{REFRESH_DURATION, REFRESH_FETCHED, histogram};
use crate::normalizer::normalize_batch;
use crate::store::{CountryStore, upsert_batch};
use serde::Serialize;
use std::sync::Arc;
use tokio::task::JoinError;
use tokio::time::Instant;

#[derive(thiserror::Error, Debug)]
pub enum RefreshError {
    #[error("Failed to fetch country data from API: {0}")]
    Upstream(#[from] FetchError),
    #[error("Failed to fetch country data from API: no countries returned")]
    Empty,
    #[error("Error refreshing countries data: {0}")]
    Pipeline(#[from] JoinError),
}

/// Summary of one refresh. Partial persistence still counts as success.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct RefreshOutcome {
    pub success: bool,
    pub total_fetched: usize,
    pub total_saved: usize,
    pub message: String,
}

impl RefreshOutcome {
    fn saved(total_fetched: usize, total_saved: usize) -> Self {
        let message = if total_saved == total_fetched {
            format!("Successfully refreshed {total_saved} countries data")
        } else {
            format!(
                "Refreshed {total_saved} of {total_fetched} countries data, {} could not be saved",
                total_fetched - total_saved
            )
        };

        RefreshOutcome {
            success: true,
            total_fetched,
            total_saved,
            message,
        }
    }

    fn failed(err: &RefreshError) -> Self {
        RefreshOutcome {
            success: false,
            total_fetched: 0,
            total_saved: 0,
            message: err.to_string(),
        }
    }
}

/// Runs fetch-all, normalize-all and upsert-all against an injected source
/// and store.
#[derive(Clone)]
pub struct Refresher {
    source: Arc<dyn CountrySource>,
    store: Arc<dyn CountryStore>,
    backoff: Backoff,
}

impl Refresher {
    pub fn new(
        source: Arc<dyn CountrySource>,
        store: Arc<dyn CountryStore>,
        backoff: Backoff,
    ) -> Self {
        Refresher {
            source,
            store,
            backoff,
        }
    }

    /// Never fails: every error, including a panic inside the pipeline, is
    /// turned into an unsuccessful outcome.
    pub async fn refresh(&self) -> RefreshOutcome {
        let start = Instant::now();
        let this = self.clone();

        let result = match tokio::spawn(async move { this.run().await }).await {
            Ok(result) => result,
            Err(err) => Err(RefreshError::Pipeline(err)),
        };

        let outcome = match result {
            Ok((fetched, saved)) => RefreshOutcome::saved(fetched, saved),
            Err(err) => {
                tracing::error!(error = %err, "Error refreshing countries data");
                RefreshOutcome::failed(&err)
            }
        };

        histogram!(REFRESH_DURATION).record(start.elapsed().as_secs_f64());
        tracing::info!(
            success = outcome.success,
            fetched = outcome.total_fetched,
            saved = outcome.total_saved,
            "Refresh finished"
        );
        outcome
    }

    async fn run(&self) -> Result<(usize, usize), RefreshError> {
        let raws = retry_fetch(&self.backoff, || self.source.fetch_all()).await?;
        if raws.is_empty() {
            return Err(RefreshError::Empty);
        }

        let fetched = raws.len();
        histogram!(REFRESH_FETCHED).record(fetched as f64);

        // Normalizing and writing are blocking; keep them off the async workers.
        let store = self.store.clone();
        let saved = tokio::task::spawn_blocking(move || {
            let records = normalize_batch(&raws);
            upsert_batch(store.as_ref(), &records)
        })
        .await?;

        Ok((fetched, saved))
    }
}
