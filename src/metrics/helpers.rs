//! Metrics helper structs for convenient metric recording

use std::time::Duration;

use prometheus::{Encoder, TextEncoder};

use crate::connection_manager::RegistrySnapshot;
use crate::websocket::MessageKind;

use super::{
    ADMISSION_REJECTED_TOTAL, BROADCASTS_TOTAL, BROADCAST_LATENCY, CONNECTIONS_ACTIVE,
    DELIVERIES_TOTAL, DELIVERY_FAILURES_TOTAL, EVICTIONS_TOTAL, ROOMS_ACTIVE,
    WS_MESSAGES_RECEIVED,
};

/// Encode all metrics to Prometheus text format
pub fn encode_metrics() -> Result<String, prometheus::Error> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    Ok(String::from_utf8(buffer).unwrap_or_default())
}

/// Helper struct for recording fan-out metrics
pub struct BroadcastMetrics;

impl BroadcastMetrics {
    /// Record the outcome of one broadcast
    pub fn record(delivered: u64, failed: u64) {
        BROADCASTS_TOTAL.inc();
        DELIVERIES_TOTAL.inc_by(delivered);
        DELIVERY_FAILURES_TOTAL.inc_by(failed);
    }

    pub fn record_latency(elapsed: Duration) {
        BROADCAST_LATENCY.observe(elapsed.as_secs_f64());
    }

    pub fn record_eviction() {
        EVICTIONS_TOTAL.inc();
    }
}

/// Helper struct for recording inbound WebSocket messages
pub struct WsMessageMetrics;

impl WsMessageMetrics {
    pub fn record_received(kind: MessageKind) {
        WS_MESSAGES_RECEIVED.with_label_values(&[kind.as_str()]).inc();
    }
}

/// Helper struct for recording admission rejections
pub struct AdmissionMetrics;

impl AdmissionMetrics {
    pub fn record_rejected(reason: &str) {
        ADMISSION_REJECTED_TOTAL.with_label_values(&[reason]).inc();
    }
}

/// Helper struct for refreshing registry gauges
pub struct RegistryMetrics;

impl RegistryMetrics {
    /// Update gauges from a registry snapshot
    pub fn update(snapshot: &RegistrySnapshot) {
        ROOMS_ACTIVE.set(snapshot.room_count as i64);
        CONNECTIONS_ACTIVE.set(snapshot.connection_count as i64);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_includes_recorded_metrics() {
        BroadcastMetrics::record(2, 1);
        AdmissionMetrics::record_rejected("origin");

        let output = encode_metrics().unwrap();
        assert!(output.contains("roomcast_broadcasts_total"));
        assert!(output.contains("roomcast_admission_rejected_total"));
    }
}
