use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::broadcast;

use crate::connection_manager::{DeliveryError, RoomRegistry};
use crate::websocket::OutboundMessage;

/// Background task that pings every joined connection.
///
/// Pings go through each connection's outbound queue, so they never race a
/// broadcast on the wire. A full queue just skips that round; idle detection
/// happens in the session's read loop.
pub struct HeartbeatTask {
    interval: Duration,
    registry: Arc<RoomRegistry>,
    shutdown: broadcast::Receiver<()>,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct HeartbeatRound {
    pub sent: usize,
    pub skipped: usize,
    pub closed: usize,
}

impl HeartbeatTask {
    pub fn new(
        interval: Duration,
        registry: Arc<RoomRegistry>,
        shutdown: broadcast::Receiver<()>,
    ) -> Self {
        Self {
            interval,
            registry,
            shutdown,
        }
    }

    /// Run until the shutdown signal fires
    pub async fn run(mut self) {
        let mut timer = tokio::time::interval(self.interval);

        // Skip immediate first tick
        timer.tick().await;

        tracing::info!(
            heartbeat_interval_secs = self.interval.as_secs(),
            "Heartbeat task started"
        );

        loop {
            tokio::select! {
                _ = self.shutdown.recv() => {
                    tracing::info!("Heartbeat task received shutdown signal");
                    break;
                }
                _ = timer.tick() => {
                    self.send_heartbeats().await;
                }
            }
        }

        tracing::info!("Heartbeat task stopped");
    }

    async fn send_heartbeats(&self) -> HeartbeatRound {
        let connections = self.registry.all_connections().await;
        if connections.is_empty() {
            return HeartbeatRound::default();
        }

        let start = Instant::now();
        let mut round = HeartbeatRound::default();
        for handle in &connections {
            match handle.try_enqueue(OutboundMessage::Ping) {
                Ok(()) => round.sent += 1,
                Err(DeliveryError::Closed) => round.closed += 1,
                Err(_) => {
                    round.skipped += 1;
                    tracing::debug!(
                        connection_id = %handle.id,
                        "Outbound queue full, skipping heartbeat"
                    );
                }
            }
        }

        tracing::debug!(
            total = connections.len(),
            sent = round.sent,
            skipped = round.skipped,
            closed = round.closed,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Heartbeat round completed"
        );

        round
    }
}
