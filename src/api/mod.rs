//! API layer - read-only HTTP reporting endpoints.

mod health;
mod metrics;
mod routes;
mod stats_page;

pub use health::{health, stats, HealthResponse, RoomStats, StatsResponse};
pub use metrics::prometheus_metrics;
pub use routes::api_routes;
pub use stats_page::{render_html, render_text, stats_page};
