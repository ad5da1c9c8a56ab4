use axum::{routing::get, Router};

use crate::server::AppState;

use super::health::{health, stats};
use super::metrics::prometheus_metrics;
use super::stats_page::stats_page;

pub fn api_routes() -> Router<AppState> {
    Router::new()
        // Health & Stats
        .route("/health", get(health))
        .route("/stats", get(stats_page))
        .route("/metrics", get(prometheus_metrics))
        .route("/api/stats", get(stats))
}
