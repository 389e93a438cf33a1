use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::cors::CorsLayer;

pub mod handlers;
pub mod state;

pub use state::{AppState, SourceInfo};

pub async fn create_app(state: AppState) -> Router {
    let cors = CorsLayer::permissive();

    Router::new()
        .route("/scrape", post(handlers::trigger_scrape))
        .route("/health", get(handlers::health))
        .route("/api/articles", get(handlers::list_articles))
        .route("/api/articles/latest", get(handlers::latest_articles))
        .route("/api/articles/stats", get(handlers::article_stats))
        .route("/api/articles/:id", get(handlers::get_article))
        .route("/api/runs", get(handlers::list_runs))
        .route("/api/sources", get(handlers::list_sources))
        .layer(cors)
        .with_state(Arc::new(state))
}

pub mod prelude {
    pub use agg_core::{Article, Error, Result};
    pub use crate::{create_app, AppState};
}
