//! Graceful shutdown handling.
//!
//! Shutdown signals every session through the shared broadcast channel, then
//! waits (bounded) for the registry to drain as sessions run their leave path.
//! In-flight broadcasts finish against the member list they already captured.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::time::timeout;

use crate::connection_manager::RoomRegistry;

/// Interval between registry drain checks
const DRAIN_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Configuration for graceful shutdown behavior
#[derive(Debug, Clone)]
pub struct ShutdownConfig {
    /// Time to wait for sessions to leave their rooms (default: 10 seconds)
    pub drain_timeout: Duration,
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self {
            drain_timeout: Duration::from_secs(10),
        }
    }
}

/// Coordinates process shutdown with the live sessions
pub struct GracefulShutdown {
    registry: Arc<RoomRegistry>,
    shutdown_tx: broadcast::Sender<()>,
    config: ShutdownConfig,
}

impl GracefulShutdown {
    pub fn new(registry: Arc<RoomRegistry>, shutdown_tx: broadcast::Sender<()>) -> Self {
        Self::with_config(registry, shutdown_tx, ShutdownConfig::default())
    }

    pub fn with_config(
        registry: Arc<RoomRegistry>,
        shutdown_tx: broadcast::Sender<()>,
        config: ShutdownConfig,
    ) -> Self {
        Self {
            registry,
            shutdown_tx,
            config,
        }
    }

    /// Execute graceful shutdown sequence
    #[tracing::instrument(name = "graceful_shutdown", skip(self))]
    pub async fn execute(&self, reason: &str) -> ShutdownResult {
        let start = std::time::Instant::now();
        let initial = self.registry.connection_count().await;

        // Phase 1: Signal sessions and background tasks
        tracing::info!(reason = %reason, connections = initial, "Signaling sessions to stop");
        // No receivers just means nothing is running
        let _ = self.shutdown_tx.send(());

        // Phase 2: Wait for sessions to leave
        let remaining = self.wait_for_drain().await;

        let result = ShutdownResult {
            drained: remaining == 0,
            connections_closed: initial.saturating_sub(remaining),
            remaining_connections: remaining,
            duration: start.elapsed(),
        };

        if result.drained {
            tracing::info!(
                connections_closed = result.connections_closed,
                duration_ms = result.duration.as_millis(),
                "Graceful shutdown completed"
            );
        } else {
            tracing::warn!(
                remaining_connections = remaining,
                "Some connections did not close gracefully"
            );
        }

        result
    }

    async fn wait_for_drain(&self) -> usize {
        let registry = self.registry.clone();
        let drain = async {
            while registry.connection_count().await > 0 {
                tokio::time::sleep(DRAIN_POLL_INTERVAL).await;
            }
        };

        let _ = timeout(self.config.drain_timeout, drain).await;
        self.registry.connection_count().await
    }
}

/// Result of a graceful shutdown operation
#[derive(Debug, Default)]
pub struct ShutdownResult {
    /// Every connection left its room before the timeout
    pub drained: bool,
    pub connections_closed: usize,
    pub remaining_connections: usize,
    pub duration: Duration,
}
