use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use futures::stream::{self, StreamExt};
use serde::Serialize;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::metrics::BroadcastMetrics;
use crate::websocket::{OutboundMessage, RoomMessage};

use super::{ConnectionHandle, DeliveryError, RegistrySnapshot, Room};

/// Tuning for the fan-out path
#[derive(Debug, Clone, Copy)]
pub struct BroadcastConfig {
    /// Longest a single member may hold up a broadcast before it is evicted
    pub send_timeout: Duration,
    /// Upper bound on in-flight member deliveries per broadcast
    pub max_concurrent_sends: usize,
}

impl Default for BroadcastConfig {
    fn default() -> Self {
        Self {
            send_timeout: Duration::from_millis(1000),
            max_concurrent_sends: 100,
        }
    }
}

/// Error returned for registry contract violations
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    #[error("connection {connection_id} already joined room {room:?}")]
    AlreadyJoined { connection_id: Uuid, room: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JoinOutcome {
    /// The join created the room
    pub room_created: bool,
    /// Member count immediately after the join
    pub members: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeaveOutcome {
    Left { room_deleted: bool },
    /// The connection was not a member of that room; nothing changed
    NotMember,
}

/// Result of fanning one message out to a room
#[derive(Debug, Clone, Serialize)]
pub struct BroadcastReport {
    pub room: String,
    /// Members captured in the membership snapshot
    pub recipients: usize,
    pub delivered: usize,
    pub failed: usize,
    /// Members scheduled for removal because their delivery failed
    pub evicted: Vec<Uuid>,
}

impl BroadcastReport {
    fn empty(room: &str) -> Self {
        Self {
            room: room.to_string(),
            recipients: 0,
            delivered: 0,
            failed: 0,
            evicted: Vec::new(),
        }
    }
}

#[derive(Default)]
struct RegistryState {
    /// room name -> members
    rooms: HashMap<String, Room>,
    /// connection_id -> room name
    memberships: HashMap<Uuid, String>,
}

/// Maps room names to rooms.
///
/// Every membership change happens under the write lock, and a room is removed
/// in the same critical section that removes its last member, so no observer
/// ever sees an empty room. Broadcasts hold the read lock only long enough to
/// copy the member list; delivery runs without any registry lock.
pub struct RoomRegistry {
    state: RwLock<RegistryState>,
    config: BroadcastConfig,
}

impl RoomRegistry {
    pub fn new() -> Self {
        Self::with_config(BroadcastConfig::default())
    }

    pub fn with_config(config: BroadcastConfig) -> Self {
        Self {
            state: RwLock::new(RegistryState::default()),
            config,
        }
    }

    pub fn config(&self) -> BroadcastConfig {
        self.config
    }

    /// Add a connection to a room, creating the room if absent
    pub async fn join(
        &self,
        room: &str,
        handle: Arc<ConnectionHandle>,
    ) -> Result<JoinOutcome, RegistryError> {
        let connection_id = handle.id;
        let mut guard = self.state.write().await;
        let state = &mut *guard;

        if let Some(current) = state.memberships.get(&connection_id) {
            return Err(RegistryError::AlreadyJoined {
                connection_id,
                room: current.clone(),
            });
        }

        let room_created = !state.rooms.contains_key(room);
        let entry = state.rooms.entry(room.to_string()).or_default();
        entry.insert(handle);
        let members = entry.len();
        state.memberships.insert(connection_id, room.to_string());
        drop(guard);

        tracing::info!(
            connection_id = %connection_id,
            room = %room,
            members = members,
            room_created = room_created,
            "Connection joined room"
        );

        Ok(JoinOutcome {
            room_created,
            members,
        })
    }

    /// Remove a connection from a room, deleting the room when it empties
    pub async fn leave(&self, room: &str, connection_id: Uuid) -> LeaveOutcome {
        let mut guard = self.state.write().await;
        let state = &mut *guard;

        match state.memberships.get(&connection_id) {
            Some(current) if current == room => {}
            _ => {
                tracing::debug!(
                    connection_id = %connection_id,
                    room = %room,
                    "Leave ignored, connection is not a member of this room"
                );
                return LeaveOutcome::NotMember;
            }
        }

        state.memberships.remove(&connection_id);

        let mut room_deleted = false;
        let mut remaining = 0;
        if let Some(entry) = state.rooms.get_mut(room) {
            entry.remove(&connection_id);
            remaining = entry.len();
            if entry.is_empty() {
                state.rooms.remove(room);
                room_deleted = true;
            }
        }
        drop(guard);

        tracing::info!(
            connection_id = %connection_id,
            room = %room,
            members = remaining,
            room_deleted = room_deleted,
            "Connection left room"
        );

        LeaveOutcome::Left { room_deleted }
    }

    /// Deliver a message to every current member of a room.
    ///
    /// A failed delivery never stops delivery to the other members. Each
    /// failing member is closed and removed by a spawned `leave`.
    #[tracing::instrument(
        name = "registry.broadcast",
        skip(self, message),
        fields(kind = message.kind().as_str(), bytes = message.len())
    )]
    pub async fn broadcast(
        self: &Arc<Self>,
        room: &str,
        message: RoomMessage,
        skip: Option<Uuid>,
    ) -> BroadcastReport {
        let members = {
            let state = self.state.read().await;
            match state.rooms.get(room) {
                Some(entry) => entry.members_snapshot(skip),
                None => Vec::new(),
            }
        };

        if members.is_empty() {
            return BroadcastReport::empty(room);
        }

        let start = Instant::now();
        let recipients = members.len();
        let send_timeout = self.config.send_timeout;
        let outbound = OutboundMessage::Room(message);

        let results: Vec<(Arc<ConnectionHandle>, Result<(), DeliveryError>)> =
            stream::iter(members)
                .map(|handle| {
                    let outbound = outbound.clone();
                    async move {
                        let result = handle.deliver(outbound, send_timeout).await;
                        (handle, result)
                    }
                })
                .buffer_unordered(self.config.max_concurrent_sends.max(1))
                .collect()
                .await;

        let mut delivered = 0;
        let mut evicted = Vec::new();
        for (handle, result) in results {
            match result {
                Ok(()) => delivered += 1,
                Err(e) => {
                    match e {
                        DeliveryError::Closed => tracing::debug!(
                            connection_id = %handle.id,
                            room = %room,
                            "Skipping closed member"
                        ),
                        _ => tracing::warn!(
                            connection_id = %handle.id,
                            room = %room,
                            error = %e,
                            "Delivery failed, evicting member"
                        ),
                    }
                    evicted.push(handle.id);
                    self.evict(room, handle);
                }
            }
        }

        let failed = evicted.len();
        BroadcastMetrics::record(delivered as u64, failed as u64);
        BroadcastMetrics::record_latency(start.elapsed());

        BroadcastReport {
            room: room.to_string(),
            recipients,
            delivered,
            failed,
            evicted,
        }
    }

    fn evict(self: &Arc<Self>, room: &str, handle: Arc<ConnectionHandle>) {
        handle.close();
        let registry = Arc::clone(self);
        let room = room.to_string();
        tokio::spawn(async move {
            if let LeaveOutcome::Left { .. } = registry.leave(&room, handle.id).await {
                BroadcastMetrics::record_eviction();
            }
        });
    }

    /// Consistent point-in-time copy of aggregate counts
    pub async fn snapshot(&self) -> RegistrySnapshot {
        let state = self.state.read().await;
        let rooms: BTreeMap<String, usize> = state
            .rooms
            .iter()
            .map(|(name, entry)| (name.clone(), entry.len()))
            .collect();

        RegistrySnapshot {
            room_count: rooms.len(),
            connection_count: state.memberships.len(),
            rooms,
            taken_at: Utc::now(),
        }
    }

    pub async fn contains_room(&self, room: &str) -> bool {
        self.state.read().await.rooms.contains_key(room)
    }

    pub async fn room_size(&self, room: &str) -> usize {
        self.state
            .read()
            .await
            .rooms
            .get(room)
            .map(Room::len)
            .unwrap_or(0)
    }

    /// Room the connection currently belongs to
    pub async fn room_of(&self, connection_id: Uuid) -> Option<String> {
        self.state
            .read()
            .await
            .memberships
            .get(&connection_id)
            .cloned()
    }

    pub async fn is_member(&self, room: &str, connection_id: Uuid) -> bool {
        self.state
            .read()
            .await
            .rooms
            .get(room)
            .is_some_and(|entry| entry.contains(&connection_id))
    }

    pub async fn connection_count(&self) -> usize {
        self.state.read().await.memberships.len()
    }

    /// Every joined connection, for server-wide tasks such as heartbeats
    pub async fn all_connections(&self) -> Vec<Arc<ConnectionHandle>> {
        self.state
            .read()
            .await
            .rooms
            .values()
            .flat_map(|entry| entry.members_snapshot(None))
            .collect()
    }
}

impl Default for RoomRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    fn connection() -> (Arc<ConnectionHandle>, mpsc::Receiver<OutboundMessage>) {
        let (handle, rx) = ConnectionHandle::channel(None, 8);
        (Arc::new(handle), rx)
    }

    #[tokio::test]
    async fn test_join_creates_room() {
        let registry = RoomRegistry::new();
        let (a, _rx_a) = connection();
        let (b, _rx_b) = connection();

        let first = registry.join("/lobby", a).await.unwrap();
        assert!(first.room_created);
        assert_eq!(first.members, 1);

        let second = registry.join("/lobby", b).await.unwrap();
        assert!(!second.room_created);
        assert_eq!(second.members, 2);
    }

    #[tokio::test]
    async fn test_double_join_is_rejected() {
        let registry = RoomRegistry::new();
        let (a, _rx) = connection();

        registry.join("/lobby", a.clone()).await.unwrap();
        let err = registry.join("/other", a.clone()).await.unwrap_err();
        assert_eq!(
            err,
            RegistryError::AlreadyJoined {
                connection_id: a.id,
                room: "/lobby".to_string()
            }
        );
        assert!(!registry.contains_room("/other").await);
        assert_eq!(registry.connection_count().await, 1);
    }

    #[tokio::test]
    async fn test_last_leave_deletes_room() {
        let registry = RoomRegistry::new();
        let (a, _rx_a) = connection();
        let (b, _rx_b) = connection();
        registry.join("/lobby", a.clone()).await.unwrap();
        registry.join("/lobby", b.clone()).await.unwrap();

        assert_eq!(
            registry.leave("/lobby", a.id).await,
            LeaveOutcome::Left { room_deleted: false }
        );
        assert_eq!(registry.room_size("/lobby").await, 1);

        assert_eq!(
            registry.leave("/lobby", b.id).await,
            LeaveOutcome::Left { room_deleted: true }
        );
        assert!(!registry.contains_room("/lobby").await);
    }

    #[tokio::test]
    async fn test_leave_wrong_room_is_noop() {
        let registry = RoomRegistry::new();
        let (a, _rx) = connection();
        registry.join("/lobby", a.clone()).await.unwrap();

        assert_eq!(registry.leave("/other", a.id).await, LeaveOutcome::NotMember);
        assert_eq!(registry.leave("/lobby", Uuid::new_v4()).await, LeaveOutcome::NotMember);
        assert!(registry.is_member("/lobby", a.id).await);
    }

    #[tokio::test]
    async fn test_empty_room_name_is_valid() {
        let registry = RoomRegistry::new();
        let (a, _rx) = connection();
        registry.join("", a.clone()).await.unwrap();

        assert_eq!(registry.room_of(a.id).await.as_deref(), Some(""));
        let snapshot = registry.snapshot().await;
        assert_eq!(snapshot.rooms.get(""), Some(&1));
    }

    #[tokio::test]
    async fn test_broadcast_to_unknown_room() {
        let registry = Arc::new(RoomRegistry::new());
        let report = registry
            .broadcast("/nobody", RoomMessage::text("hi"), None)
            .await;
        assert_eq!(report.recipients, 0);
        assert_eq!(report.delivered, 0);
    }

    #[tokio::test]
    async fn test_broadcast_skips_sender() {
        let registry = Arc::new(RoomRegistry::new());
        let (a, mut rx_a) = connection();
        let (b, mut rx_b) = connection();
        registry.join("/lobby", a.clone()).await.unwrap();
        registry.join("/lobby", b.clone()).await.unwrap();

        let report = registry
            .broadcast("/lobby", RoomMessage::text("hi"), Some(a.id))
            .await;
        assert_eq!(report.recipients, 1);
        assert_eq!(report.delivered, 1);

        assert!(matches!(rx_b.try_recv(), Ok(OutboundMessage::Room(_))));
        assert!(rx_a.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_snapshot_counts() {
        let registry = RoomRegistry::new();
        let mut receivers = Vec::new();
        for room in ["/a", "/a", "/b"] {
            let (handle, rx) = connection();
            receivers.push(rx);
            registry.join(room, handle).await.unwrap();
        }

        let snapshot = registry.snapshot().await;
        assert_eq!(snapshot.room_count, 2);
        assert_eq!(snapshot.connection_count, 3);
        assert_eq!(snapshot.rooms.get("/a"), Some(&2));
        assert_eq!(snapshot.rooms.get("/b"), Some(&1));
    }
}
