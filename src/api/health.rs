//! Health check and statistics endpoints.

use axum::{extract::State, Json};
use serde::Serialize;

use crate::connection_manager::RegistrySnapshot;
use crate::server::AppState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_seconds: u64,
    pub rooms: usize,
    pub connections: usize,
}

#[derive(Debug, Serialize)]
pub struct StatsResponse {
    pub total_rooms: usize,
    pub total_connections: usize,
    pub rooms: Vec<RoomStats>,
    pub taken_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Serialize)]
pub struct RoomStats {
    pub name: String,
    pub connections: usize,
}

impl From<RegistrySnapshot> for StatsResponse {
    fn from(snapshot: RegistrySnapshot) -> Self {
        Self {
            total_rooms: snapshot.room_count,
            total_connections: snapshot.connection_count,
            rooms: snapshot
                .rooms
                .into_iter()
                .map(|(name, connections)| RoomStats { name, connections })
                .collect(),
            taken_at: snapshot.taken_at,
        }
    }
}

pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let snapshot = state.registry.snapshot().await;

    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: state.start_time.elapsed().as_secs(),
        rooms: snapshot.room_count,
        connections: snapshot.connection_count,
    })
}

/// GET /api/stats - registry snapshot as JSON
pub async fn stats(State(state): State<AppState>) -> Json<StatsResponse> {
    Json(state.registry.snapshot().await.into())
}
