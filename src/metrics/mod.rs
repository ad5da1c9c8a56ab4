//! Prometheus metrics for the fan-out server.
//!
//! - Registry metrics (active rooms, active connections)
//! - Connection lifecycle metrics (opened, closed, duration)
//! - Message metrics (received, delivered, failed, evicted)
//! - Admission metrics (rejections by reason)

mod helpers;

pub use helpers::{
    encode_metrics, AdmissionMetrics, BroadcastMetrics, RegistryMetrics, WsMessageMetrics,
};

use lazy_static::lazy_static;
use prometheus::{
    register_histogram, register_int_counter, register_int_counter_vec, register_int_gauge,
    Histogram, IntCounter, IntCounterVec, IntGauge,
};

/// Prefix for all metrics
const METRIC_PREFIX: &str = "roomcast";

lazy_static! {
    // ============================================================================
    // Registry Metrics
    // ============================================================================

    /// Rooms with at least one member
    pub static ref ROOMS_ACTIVE: IntGauge = register_int_gauge!(
        format!("{}_rooms_active", METRIC_PREFIX),
        "Number of rooms with at least one member"
    ).unwrap();

    /// Connections currently joined to a room
    pub static ref CONNECTIONS_ACTIVE: IntGauge = register_int_gauge!(
        format!("{}_connections_active", METRIC_PREFIX),
        "Number of connections currently joined to a room"
    ).unwrap();

    // ============================================================================
    // Broadcast Metrics
    // ============================================================================

    /// Broadcasts performed
    pub static ref BROADCASTS_TOTAL: IntCounter = register_int_counter!(
        format!("{}_broadcasts_total", METRIC_PREFIX),
        "Total broadcasts fanned out to a room"
    ).unwrap();

    /// Frames handed to member queues
    pub static ref DELIVERIES_TOTAL: IntCounter = register_int_counter!(
        format!("{}_deliveries_total", METRIC_PREFIX),
        "Total frames delivered to room members"
    ).unwrap();

    /// Failed member deliveries
    pub static ref DELIVERY_FAILURES_TOTAL: IntCounter = register_int_counter!(
        format!("{}_delivery_failures_total", METRIC_PREFIX),
        "Total member deliveries that failed"
    ).unwrap();

    /// Members removed after a failed delivery
    pub static ref EVICTIONS_TOTAL: IntCounter = register_int_counter!(
        format!("{}_evictions_total", METRIC_PREFIX),
        "Total members evicted after a failed delivery"
    ).unwrap();

    /// Time spent fanning one message out
    pub static ref BROADCAST_LATENCY: Histogram = register_histogram!(
        format!("{}_broadcast_latency_seconds", METRIC_PREFIX),
        "Broadcast fan-out latency in seconds",
        vec![0.0001, 0.0005, 0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0]
    ).unwrap();

    // ============================================================================
    // WebSocket Metrics
    // ============================================================================

    /// WebSocket connections opened
    pub static ref WS_CONNECTIONS_OPENED: IntCounter = register_int_counter!(
        format!("{}_ws_connections_opened_total", METRIC_PREFIX),
        "Total WebSocket connections opened"
    ).unwrap();

    /// WebSocket connections closed
    pub static ref WS_CONNECTIONS_CLOSED: IntCounter = register_int_counter!(
        format!("{}_ws_connections_closed_total", METRIC_PREFIX),
        "Total WebSocket connections closed"
    ).unwrap();

    /// WebSocket messages received from clients
    pub static ref WS_MESSAGES_RECEIVED: IntCounterVec = register_int_counter_vec!(
        format!("{}_ws_messages_received_total", METRIC_PREFIX),
        "Total WebSocket messages received from clients",
        &["kind"]
    ).unwrap();

    /// WebSocket connection duration
    pub static ref WS_CONNECTION_DURATION: Histogram = register_histogram!(
        format!("{}_ws_connection_duration_seconds", METRIC_PREFIX),
        "WebSocket connection duration in seconds",
        vec![1.0, 5.0, 10.0, 30.0, 60.0, 300.0, 600.0, 1800.0, 3600.0]
    ).unwrap();

    // ============================================================================
    // Admission Metrics
    // ============================================================================

    /// Upgrade requests rejected before a connection was created
    pub static ref ADMISSION_REJECTED_TOTAL: IntCounterVec = register_int_counter_vec!(
        format!("{}_admission_rejected_total", METRIC_PREFIX),
        "Total upgrade requests rejected by the admission gate",
        &["reason"]
    ).unwrap();
}
