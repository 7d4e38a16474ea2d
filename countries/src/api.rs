use crate::config::Listener as ListenerConfig;
use crate::refresh::Refresher;
use crate::store::{CountryQuery, CountryStore, SortField, SortOrder, StoreError};
use crate::types::{CountryStats, PersistedCountry};
use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::net::TcpListener;

#[derive(thiserror::Error, Debug)]
pub enum ServeError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

#[derive(Clone)]
pub struct AppState {
    refresher: Refresher,
    store: Arc<dyn CountryStore>,
}

impl AppState {
    pub fn new(refresher: Refresher, store: Arc<dyn CountryStore>) -> Self {
        AppState { refresher, store }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/refresh", post(refresh))
        .route("/api/countries", get(list_countries))
        .route("/api/countries/{name}", get(get_country))
        .route("/api/stats", get(stats))
        .route("/api/regions", get(regions))
        .with_state(state)
}

pub async fn serve(listener: &ListenerConfig, state: AppState) -> Result<(), ServeError> {
    let addr = format!("{}:{}", listener.host, listener.port);
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!(%addr, "Serving country API");

    axum::serve(listener, router(state)).await?;
    Ok(())
}

#[derive(thiserror::Error, Debug)]
enum ApiError {
    #[error("Country {0} not found")]
    NotFound(String),
    #[error("Error reading countries: {0}")]
    Store(#[from] StoreError),
}

#[derive(Serialize)]
struct ApiErrorResponse {
    success: bool,
    message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match self {
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Store(ref err) => {
                tracing::error!(error = %err, "Store error while serving request");
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        let body = Json(ApiErrorResponse {
            success: false,
            message: self.to_string(),
        });

        (status, body).into_response()
    }
}

#[derive(Serialize)]
struct RefreshResponse {
    success: bool,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    total_countries: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    saved_countries: Option<usize>,
}

#[derive(Serialize)]
struct ListResponse {
    success: bool,
    count: usize,
    data: Vec<PersistedCountry>,
}

#[derive(Serialize)]
struct DataResponse<T> {
    success: bool,
    data: T,
}

#[derive(Serialize)]
struct StatsResponse {
    success: bool,
    stats: CountryStats,
}

#[derive(Deserialize, Debug)]
struct ListParams {
    region: Option<String>,
    sort: Option<String>,
    order: Option<String>,
}

impl From<ListParams> for CountryQuery {
    fn from(params: ListParams) -> Self {
        CountryQuery {
            region: params.region.filter(|r| !r.is_empty()),
            sort: match params.sort {
                Some(sort) => SortField::from_param(&sort),
                None => Some(SortField::Name),
            },
            order: params
                .order
                .as_deref()
                .map(SortOrder::from_param)
                .unwrap_or_default(),
        }
    }
}

async fn health() -> &'static str {
    "ok\n"
}

async fn refresh(State(state): State<AppState>) -> (StatusCode, Json<RefreshResponse>) {
    let outcome = state.refresher.refresh().await;

    if outcome.success {
        (
            StatusCode::OK,
            Json(RefreshResponse {
                success: true,
                message: outcome.message,
                total_countries: Some(outcome.total_fetched),
                saved_countries: Some(outcome.total_saved),
            }),
        )
    } else {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(RefreshResponse {
                success: false,
                message: outcome.message,
                total_countries: None,
                saved_countries: None,
            }),
        )
    }
}

async fn list_countries(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> Result<Json<ListResponse>, ApiError> {
    let countries = state.store.list(&params.into())?;
    Ok(Json(ListResponse {
        success: true,
        count: countries.len(),
        data: countries,
    }))
}

async fn get_country(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<DataResponse<PersistedCountry>>, ApiError> {
    let country = state
        .store
        .find_by_name(&name)?
        .ok_or(ApiError::NotFound(name))?;

    Ok(Json(DataResponse {
        success: true,
        data: country,
    }))
}

async fn stats(State(state): State<AppState>) -> Result<Json<StatsResponse>, ApiError> {
    Ok(Json(StatsResponse {
        success: true,
        stats: state.store.stats()?,
    }))
}

async fn regions(
    State(state): State<AppState>,
) -> Result<Json<DataResponse<Vec<String>>>, ApiError> {
    Ok(Json(DataResponse {
        success: true,
        data: state.store.regions()?,
    }))
}
