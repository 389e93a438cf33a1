use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use agg_core::{ArticleFilter, Error, Page};
use agg_scrapers::TriggerOutcome;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::future::Future;
use std::sync::Arc;
use tracing::{error, warn};
use crate::AppState;

const MAX_LATEST: usize = 100;

#[derive(Debug)]
pub enum ApiError {
    NotFound(String),
    Internal(Error),
}

impl From<Error> for ApiError {
    fn from(e: Error) -> Self {
        ApiError::Internal(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::NotFound(what) => (StatusCode::NOT_FOUND, what),
            ApiError::Internal(e) => {
                error!(error = %e, kind = e.kind(), "request failed");
                let status = match e {
                    Error::Persistence(_) | Error::Timeout(_) => StatusCode::SERVICE_UNAVAILABLE,
                    _ => StatusCode::INTERNAL_SERVER_ERROR,
                };
                (status, e.to_string())
            }
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}

type ApiResult<T> = std::result::Result<T, ApiError>;

/// Serve `key` from the read cache, or compute and fill it. Cache failures
/// fall through to the store.
async fn cached<T, F, Fut>(state: &AppState, key: &str, load: F) -> ApiResult<Value>
where
    T: Serialize,
    F: FnOnce() -> Fut,
    Fut: Future<Output = agg_core::Result<T>>,
{
    if let Some(cache) = &state.cache {
        match cache.get(key).await {
            Ok(Some(hit)) => return Ok(hit),
            Ok(None) => {}
            Err(e) => warn!(key, error = %e, "cache read failed"),
        }
    }

    let value = serde_json::to_value(load().await?).map_err(Error::from)?;
    if let Some(cache) = &state.cache {
        if let Err(e) = cache.put(key, value.clone()).await {
            warn!(key, error = %e, "cache write failed");
        }
    }
    Ok(value)
}

pub async fn trigger_scrape(State(state): State<Arc<AppState>>) -> Response {
    match state.scheduler.trigger().await {
        TriggerOutcome::Completed(record) => (StatusCode::OK, Json(record)).into_response(),
        TriggerOutcome::AlreadyRunning => (
            StatusCode::CONFLICT,
            Json(json!({ "status": "already_running" })),
        )
            .into_response(),
    }
}

pub async fn health(State(state): State<Arc<AppState>>) -> Response {
    let report = state.health.check().await;
    let status = if report.status.is_healthy() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(report)).into_response()
}

#[derive(Debug, Default, Deserialize)]
pub struct ListParams {
    pub source: Option<String>,
    pub q: Option<String>,
    pub since: Option<DateTime<Utc>>,
    pub page: Option<u32>,
    pub page_size: Option<u32>,
}

pub async fn list_articles(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ListParams>,
) -> ApiResult<impl IntoResponse> {
    let filter = ArticleFilter {
        source: params.source,
        query: params.q,
        since: params.since,
    };
    let defaults = Page::default();
    let page = Page::new(
        params.page.unwrap_or(defaults.page),
        params.page_size.unwrap_or(defaults.page_size),
    );
    Ok(Json(state.storage.query(&filter, page).await?))
}

#[derive(Debug, Deserialize)]
pub struct LimitParams {
    pub limit: Option<usize>,
}

pub async fn latest_articles(
    State(state): State<Arc<AppState>>,
    Query(params): Query<LimitParams>,
) -> ApiResult<impl IntoResponse> {
    let limit = params.limit.unwrap_or(10).clamp(1, MAX_LATEST);
    let key = format!("latest:{}", limit);
    let value = cached(&state, &key, || state.storage.latest(limit)).await?;
    Ok(Json(value))
}

pub async fn article_stats(State(state): State<Arc<AppState>>) -> ApiResult<impl IntoResponse> {
    let value = cached(&state, "stats", || state.storage.stats()).await?;
    Ok(Json(value))
}

pub async fn get_article(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> ApiResult<impl IntoResponse> {
    state
        .storage
        .get(id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("article {} not found", id)))
}

pub async fn list_runs(
    State(state): State<Arc<AppState>>,
    Query(params): Query<LimitParams>,
) -> impl IntoResponse {
    let runs = state.reporter.recent_runs(params.limit.unwrap_or(20)).await;
    let totals = state.reporter.totals().await;
    Json(json!({ "runs": runs, "totals": totals }))
}

pub async fn list_sources(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.sources.clone())
}
