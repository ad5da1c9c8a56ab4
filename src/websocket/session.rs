//! Lifecycle of one client connection: admission, join, read loop, leave.
//!
//! The session is generic over the transport halves so the same code drives
//! an axum `WebSocket` and the in-memory channels used by tests.

use std::fmt::Display;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::extract::ws::Message;
use futures::{Sink, SinkExt, Stream, StreamExt};
use tokio::sync::{broadcast, mpsc};
use tokio::time::timeout;
use uuid::Uuid;

use crate::admission::{AdmissionError, AdmissionPolicy};
use crate::connection_manager::{ConnectionHandle, RoomRegistry};
use crate::metrics::{
    AdmissionMetrics, WsMessageMetrics, WS_CONNECTIONS_CLOSED, WS_CONNECTIONS_OPENED,
    WS_CONNECTION_DURATION,
};

use super::message::{OutboundMessage, RoomMessage};

/// How long the writer gets to flush its close frame after the session ends
const WRITER_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// What the upgrade boundary knows about an inbound client
#[derive(Debug, Clone)]
pub struct SessionRequest {
    pub room: String,
    pub host: Option<String>,
    pub token: Option<String>,
}

impl SessionRequest {
    /// Room comes from the explicit `room` parameter when given, else the path
    pub fn new(
        path: &str,
        room_param: Option<String>,
        host: Option<String>,
        token: Option<String>,
    ) -> Self {
        Self {
            room: room_param.unwrap_or_else(|| path.to_string()),
            host,
            token,
        }
    }

    /// Evaluate the admission gate. Nothing is created on rejection.
    pub fn admit(self, policy: &AdmissionPolicy) -> Result<AdmittedSession, AdmissionError> {
        if let Err(e) = policy.admit(self.host.as_deref(), self.token.as_deref()) {
            AdmissionMetrics::record_rejected(e.reason());
            tracing::info!(
                room = %self.room,
                host = ?self.host,
                reason = %e,
                "Upgrade rejected by admission gate"
            );
            return Err(e);
        }

        Ok(AdmittedSession {
            room: self.room,
            remote_host: self.host,
        })
    }
}

/// A request that passed admission and may join its room
#[derive(Debug, Clone)]
pub struct AdmittedSession {
    room: String,
    remote_host: Option<String>,
}

/// Shared dependencies for running a session
pub struct SessionContext {
    pub registry: Arc<RoomRegistry>,
    pub outbound_queue_size: usize,
    pub idle_timeout: Option<Duration>,
    pub echo_to_sender: bool,
    pub shutdown: broadcast::Receiver<()>,
}

/// Why the read loop stopped
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExitReason {
    /// Client sent a close frame
    ClientClosed,
    /// Inbound stream ended without a close frame
    StreamEnded,
    TransportError(String),
    IdleTimeout,
    /// Closed by the server: failed delivery or write error
    Evicted,
    Shutdown,
    /// Registry refused the join
    JoinFailed(String),
}

#[derive(Debug, Clone)]
pub struct SessionSummary {
    pub connection_id: Uuid,
    pub room: String,
    pub messages_received: u64,
    pub exit: ExitReason,
    pub duration: Duration,
}

enum Inbound<E> {
    Frame(Message),
    Failed(E),
    Ended,
    Idle,
}

impl AdmittedSession {
    pub fn room(&self) -> &str {
        &self.room
    }

    /// Drive the connection until it ends. Leave and close run on every exit path.
    #[tracing::instrument(
        name = "ws.session",
        skip_all,
        fields(room = %self.room, connection_id = tracing::field::Empty)
    )]
    pub async fn run<W, R, E>(self, ctx: SessionContext, sink: W, mut stream: R) -> SessionSummary
    where
        W: Sink<Message> + Unpin + Send + 'static,
        W::Error: Display,
        R: Stream<Item = Result<Message, E>> + Unpin,
        E: Display,
    {
        let SessionContext {
            registry,
            outbound_queue_size,
            idle_timeout,
            echo_to_sender,
            mut shutdown,
        } = ctx;

        let start = Instant::now();
        let (handle, rx) =
            ConnectionHandle::channel(self.remote_host.clone(), outbound_queue_size);
        let handle = Arc::new(handle);
        let connection_id = handle.id;
        tracing::Span::current().record("connection_id", tracing::field::display(connection_id));

        WS_CONNECTIONS_OPENED.inc();
        let mut writer = tokio::spawn(write_loop(handle.clone(), rx, sink));

        let mut messages_received: u64 = 0;
        let exit = match registry.join(&self.room, handle.clone()).await {
            Err(e) => {
                tracing::error!(error = %e, "Join failed");
                ExitReason::JoinFailed(e.to_string())
            }
            Ok(_) => {
                let skip = (!echo_to_sender).then_some(connection_id);
                loop {
                    let inbound = tokio::select! {
                        biased;
                        _ = shutdown.recv() => break ExitReason::Shutdown,
                        _ = handle.closed() => break ExitReason::Evicted,
                        inbound = next_inbound(&mut stream, idle_timeout) => inbound,
                    };

                    let frame = match inbound {
                        Inbound::Frame(frame) => frame,
                        Inbound::Failed(e) => break ExitReason::TransportError(e.to_string()),
                        Inbound::Ended => break ExitReason::StreamEnded,
                        Inbound::Idle => break ExitReason::IdleTimeout,
                    };

                    handle.update_activity();
                    if let Message::Close(_) = frame {
                        break ExitReason::ClientClosed;
                    }

                    // Ping is answered by the transport; pong only refreshes activity
                    let Some(message) = RoomMessage::from_ws(frame) else {
                        continue;
                    };

                    messages_received += 1;
                    WsMessageMetrics::record_received(message.kind());
                    let report = registry.broadcast(&self.room, message, skip).await;
                    tracing::trace!(
                        delivered = report.delivered,
                        failed = report.failed,
                        "Relayed message"
                    );
                }
            }
        };

        // Close before leaving so a broadcast holding an older member list
        // cannot enqueue anything new
        handle.close();
        registry.leave(&self.room, connection_id).await;
        if timeout(WRITER_SHUTDOWN_TIMEOUT, &mut writer).await.is_err() {
            // A peer that stops reading leaves the writer parked in send
            tracing::debug!("Writer did not finish in time, aborting");
            writer.abort();
            let _ = writer.await;
        }

        let duration = start.elapsed();
        WS_CONNECTIONS_CLOSED.inc();
        WS_CONNECTION_DURATION.observe(duration.as_secs_f64());

        tracing::info!(
            exit = ?exit,
            messages_received = messages_received,
            duration_secs = duration.as_secs_f64(),
            "WebSocket connection closed"
        );

        SessionSummary {
            connection_id,
            room: self.room,
            messages_received,
            exit,
            duration,
        }
    }
}

async fn next_inbound<R, E>(stream: &mut R, idle_timeout: Option<Duration>) -> Inbound<E>
where
    R: Stream<Item = Result<Message, E>> + Unpin,
{
    let next = match idle_timeout {
        Some(limit) => match timeout(limit, stream.next()).await {
            Ok(next) => next,
            Err(_) => return Inbound::Idle,
        },
        None => stream.next().await,
    };

    match next {
        Some(Ok(frame)) => Inbound::Frame(frame),
        Some(Err(e)) => Inbound::Failed(e),
        None => Inbound::Ended,
    }
}

/// Sole consumer of a connection's outbound queue
async fn write_loop<W>(
    handle: Arc<ConnectionHandle>,
    mut rx: mpsc::Receiver<OutboundMessage>,
    mut sink: W,
)
where
    W: Sink<Message> + Unpin,
    W::Error: Display,
{
    loop {
        tokio::select! {
            biased;
            _ = handle.closed() => break,
            item = rx.recv() => match item {
                Some(message) => {
                    if let Err(e) = sink.send(message.into_ws()).await {
                        tracing::debug!(
                            connection_id = %handle.id,
                            error = %e,
                            "WebSocket send failed"
                        );
                        handle.close();
                        return;
                    }
                }
                None => break,
            },
        }
    }

    let _ = sink.send(Message::Close(None)).await;
    let _ = sink.close().await;
}
