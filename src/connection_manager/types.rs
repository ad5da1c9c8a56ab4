//! Connection handle and related types

use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::time::Duration;
use tokio::sync::{mpsc, Notify};
use tokio::time::timeout;
use uuid::Uuid;

use crate::websocket::OutboundMessage;

/// Handle for a single WebSocket connection.
///
/// The outbound queue has exactly one consumer (the session's writer task), so
/// frames reach the transport in the order they were enqueued and concurrent
/// broadcasts never interleave on the wire.
pub struct ConnectionHandle {
    pub id: Uuid,
    pub remote_host: Option<String>,
    pub connected_at: DateTime<Utc>,
    sender: mpsc::Sender<OutboundMessage>,
    /// Last activity timestamp (Unix seconds)
    last_activity: AtomicI64,
    closed: AtomicBool,
    close_notify: Notify,
}

impl ConnectionHandle {
    pub fn new(remote_host: Option<String>, sender: mpsc::Sender<OutboundMessage>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            remote_host,
            connected_at: now,
            sender,
            last_activity: AtomicI64::new(now.timestamp()),
            closed: AtomicBool::new(false),
            close_notify: Notify::new(),
        }
    }

    /// Create a handle together with the receiving half of its outbound queue
    pub fn channel(
        remote_host: Option<String>,
        capacity: usize,
    ) -> (Self, mpsc::Receiver<OutboundMessage>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self::new(remote_host, tx), rx)
    }

    pub fn update_activity(&self) {
        self.last_activity
            .store(Utc::now().timestamp(), Ordering::Relaxed);
    }

    pub fn last_activity(&self) -> DateTime<Utc> {
        DateTime::from_timestamp(self.last_activity.load(Ordering::Relaxed), 0)
            .unwrap_or_else(Utc::now)
    }

    /// Enqueue a frame, waiting at most `send_timeout` for queue space
    pub async fn deliver(
        &self,
        message: OutboundMessage,
        send_timeout: Duration,
    ) -> Result<(), DeliveryError> {
        if self.is_closed() {
            return Err(DeliveryError::Closed);
        }

        match timeout(send_timeout, self.sender.send(message)).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(_)) => Err(DeliveryError::Closed),
            Err(_) => Err(DeliveryError::Timeout(send_timeout)),
        }
    }

    /// Enqueue without waiting. Used for best-effort frames such as heartbeats.
    pub fn try_enqueue(&self, message: OutboundMessage) -> Result<(), DeliveryError> {
        if self.is_closed() {
            return Err(DeliveryError::Closed);
        }

        self.sender.try_send(message).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => DeliveryError::QueueFull,
            mpsc::error::TrySendError::Closed(_) => DeliveryError::Closed,
        })
    }

    /// Mark the connection closed and wake its session. Idempotent.
    pub fn close(&self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            self.close_notify.notify_waiters();
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire) || self.sender.is_closed()
    }

    /// Resolves once `close` has been called
    pub async fn closed(&self) {
        loop {
            let notified = self.close_notify.notified();
            tokio::pin!(notified);
            // Register before checking the flag so a concurrent close is not missed
            notified.as_mut().enable();
            if self.closed.load(Ordering::Acquire) {
                return;
            }
            notified.await;
        }
    }
}

impl std::fmt::Debug for ConnectionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionHandle")
            .field("id", &self.id)
            .field("remote_host", &self.remote_host)
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// Error returned when a frame cannot be handed to a connection
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DeliveryError {
    #[error("connection closed")]
    Closed,
    #[error("outbound queue stayed full for {0:?}")]
    Timeout(Duration),
    #[error("outbound queue full")]
    QueueFull,
}
