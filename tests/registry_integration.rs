//! Registry integration tests
//!
//! These exercise join/leave/broadcast against real outbound queues without
//! starting a server.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::mpsc;

use roomcast::connection_manager::{
    BroadcastConfig, ConnectionHandle, LeaveOutcome, RegistryError, RoomRegistry,
};
use roomcast::websocket::{OutboundMessage, RoomMessage};

/// Helper to create a joined-ready handle plus its queue
fn member(capacity: usize) -> (Arc<ConnectionHandle>, mpsc::Receiver<OutboundMessage>) {
    let (handle, rx) = ConnectionHandle::channel(Some("127.0.0.1".to_string()), capacity);
    (Arc::new(handle), rx)
}

fn text_of(message: OutboundMessage) -> String {
    match message {
        OutboundMessage::Room(RoomMessage::Text(text)) => text.as_str().to_string(),
        other => panic!("expected a text frame, got {:?}", other),
    }
}

async fn recv_text(rx: &mut mpsc::Receiver<OutboundMessage>) -> String {
    let message = tokio::time::timeout(Duration::from_secs(1), rx.recv())
        .await
        .expect("timed out waiting for a frame")
        .expect("queue closed");
    text_of(message)
}

/// Wait for a spawned eviction to land
async fn wait_until_gone(registry: &RoomRegistry, room: &str, handle: &ConnectionHandle) {
    let deadline = Instant::now() + Duration::from_secs(1);
    while registry.is_member(room, handle.id).await {
        assert!(Instant::now() < deadline, "member was never evicted");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

// =============================================================================
// Membership
// =============================================================================

mod membership_tests {
    use super::*;

    #[tokio::test]
    async fn test_solitary_join_leave_leaves_no_room() {
        let registry = RoomRegistry::new();
        let (a, _rx) = member(4);

        let joined = registry.join("/lobby", a.clone()).await.unwrap();
        assert!(joined.room_created);
        assert_eq!(joined.members, 1);

        let left = registry.leave("/lobby", a.id).await;
        assert_eq!(left, LeaveOutcome::Left { room_deleted: true });

        let snapshot = registry.snapshot().await;
        assert_eq!(snapshot.room_count, 0);
        assert_eq!(snapshot.connection_count, 0);
        assert!(!registry.contains_room("/lobby").await);
    }

    #[tokio::test]
    async fn test_connection_belongs_to_one_room() {
        let registry = RoomRegistry::new();
        let (a, _rx) = member(4);

        registry.join("/lobby", a.clone()).await.unwrap();
        let err = registry.join("/other", a.clone()).await.unwrap_err();

        assert!(matches!(err, RegistryError::AlreadyJoined { ref room, .. } if room == "/lobby"));
        assert!(!registry.contains_room("/other").await);
        assert_eq!(registry.room_of(a.id).await.as_deref(), Some("/lobby"));
    }

    #[tokio::test]
    async fn test_leave_wrong_room_is_noop() {
        let registry = RoomRegistry::new();
        let (a, _rx) = member(4);
        registry.join("/lobby", a.clone()).await.unwrap();

        assert_eq!(registry.leave("/other", a.id).await, LeaveOutcome::NotMember);
        assert_eq!(registry.room_size("/lobby").await, 1);
    }

    #[tokio::test]
    async fn test_concurrent_joins_create_one_room() {
        let registry = Arc::new(RoomRegistry::new());
        let mut queues = Vec::new();
        let mut tasks = Vec::new();

        for _ in 0..50 {
            let (handle, rx) = member(4);
            queues.push(rx);
            let registry = registry.clone();
            tasks.push(tokio::spawn(async move {
                registry.join("/crowd", handle).await.unwrap()
            }));
        }

        let mut created = 0;
        for task in tasks {
            if task.await.unwrap().room_created {
                created += 1;
            }
        }

        assert_eq!(created, 1);
        let snapshot = registry.snapshot().await;
        assert_eq!(snapshot.room_count, 1);
        assert_eq!(snapshot.rooms.get("/crowd"), Some(&50));
    }

    #[tokio::test]
    async fn test_snapshot_after_disconnect() {
        // Two clients in /lobby, one leaves, then the other
        let registry = RoomRegistry::new();
        let (a, _rx_a) = member(4);
        let (b, _rx_b) = member(4);
        registry.join("/lobby", a.clone()).await.unwrap();
        registry.join("/lobby", b.clone()).await.unwrap();

        registry.leave("/lobby", a.id).await;
        let snapshot = registry.snapshot().await;
        assert_eq!(snapshot.room_count, 1);
        assert_eq!(snapshot.connection_count, 1);

        registry.leave("/lobby", b.id).await;
        let snapshot = registry.snapshot().await;
        assert_eq!(snapshot.room_count, 0);
        assert_eq!(snapshot.connection_count, 0);
    }
}

// =============================================================================
// Broadcast
// =============================================================================

mod broadcast_tests {
    use super::*;

    #[tokio::test]
    async fn test_broadcast_reaches_only_its_room() {
        let registry = Arc::new(RoomRegistry::new());
        let (a, mut rx_a) = member(4);
        let (b, mut rx_b) = member(4);
        let (c, mut rx_c) = member(4);
        registry.join("/lobby", a.clone()).await.unwrap();
        registry.join("/lobby", b.clone()).await.unwrap();
        registry.join("/other", c.clone()).await.unwrap();

        let report = registry
            .broadcast("/lobby", RoomMessage::text("hi"), None)
            .await;

        assert_eq!(report.recipients, 2);
        assert_eq!(report.delivered, 2);
        assert_eq!(recv_text(&mut rx_a).await, "hi");
        assert_eq!(recv_text(&mut rx_b).await, "hi");
        assert!(rx_c.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_broadcast_to_missing_room_is_empty() {
        let registry = Arc::new(RoomRegistry::new());
        let report = registry
            .broadcast("/nobody", RoomMessage::text("hi"), None)
            .await;

        assert_eq!(report.recipients, 0);
        assert_eq!(report.failed, 0);
    }

    #[tokio::test]
    async fn test_skip_excludes_sender() {
        let registry = Arc::new(RoomRegistry::new());
        let (a, mut rx_a) = member(4);
        let (b, mut rx_b) = member(4);
        registry.join("/lobby", a.clone()).await.unwrap();
        registry.join("/lobby", b.clone()).await.unwrap();

        let report = registry
            .broadcast("/lobby", RoomMessage::text("from a"), Some(a.id))
            .await;

        assert_eq!(report.recipients, 1);
        assert_eq!(recv_text(&mut rx_b).await, "from a");
        assert!(rx_a.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_sequential_broadcasts_keep_order() {
        let registry = Arc::new(RoomRegistry::new());
        let (a, mut rx_a) = member(16);
        let (b, mut rx_b) = member(16);
        registry.join("/lobby", a.clone()).await.unwrap();
        registry.join("/lobby", b.clone()).await.unwrap();

        for i in 0..10 {
            registry
                .broadcast("/lobby", RoomMessage::text(format!("m{}", i)), None)
                .await;
        }

        for i in 0..10 {
            assert_eq!(recv_text(&mut rx_a).await, format!("m{}", i));
            assert_eq!(recv_text(&mut rx_b).await, format!("m{}", i));
        }
    }

    #[tokio::test]
    async fn test_failing_member_does_not_block_others() {
        // Put the broken member first, middle and last in turn
        for position in 0..3 {
            let registry = Arc::new(RoomRegistry::new());
            let mut healthy = Vec::new();
            let mut broken = None;

            for slot in 0..3 {
                let (handle, rx) = member(4);
                registry.join("/lobby", handle.clone()).await.unwrap();
                if slot == position {
                    drop(rx);
                    broken = Some(handle);
                } else {
                    healthy.push(rx);
                }
            }
            let broken = broken.unwrap();

            let report = registry
                .broadcast("/lobby", RoomMessage::text("hello"), None)
                .await;

            assert_eq!(report.delivered, 2, "position {}", position);
            assert_eq!(report.failed, 1, "position {}", position);
            assert_eq!(report.evicted, vec![broken.id]);
            for rx in healthy.iter_mut() {
                assert_eq!(recv_text(rx).await, "hello");
            }

            wait_until_gone(&registry, "/lobby", &broken).await;
            assert!(broken.is_closed());
            assert_eq!(registry.room_size("/lobby").await, 2);
        }
    }

    #[tokio::test]
    async fn test_closed_member_is_skipped_and_removed() {
        let registry = Arc::new(RoomRegistry::new());
        let (a, mut rx_a) = member(4);
        let (b, _rx_b) = member(4);
        registry.join("/lobby", a.clone()).await.unwrap();
        registry.join("/lobby", b.clone()).await.unwrap();

        b.close();
        let report = registry
            .broadcast("/lobby", RoomMessage::text("still here"), None)
            .await;

        assert_eq!(report.delivered, 1);
        assert_eq!(recv_text(&mut rx_a).await, "still here");
        wait_until_gone(&registry, "/lobby", &b).await;
    }

    #[tokio::test]
    async fn test_slow_member_times_out() {
        let registry = Arc::new(RoomRegistry::with_config(BroadcastConfig {
            send_timeout: Duration::from_millis(50),
            max_concurrent_sends: 8,
        }));
        let (fast, mut rx_fast) = member(4);
        let (slow, _rx_slow) = member(1);
        registry.join("/lobby", fast.clone()).await.unwrap();
        registry.join("/lobby", slow.clone()).await.unwrap();

        // Fill the slow member's queue so the next delivery has to wait
        slow.try_enqueue(OutboundMessage::Ping).unwrap();

        let start = Instant::now();
        let report = registry
            .broadcast("/lobby", RoomMessage::text("tick"), None)
            .await;

        assert!(start.elapsed() < Duration::from_millis(500));
        assert_eq!(report.delivered, 1);
        assert_eq!(report.evicted, vec![slow.id]);
        assert_eq!(recv_text(&mut rx_fast).await, "tick");
        wait_until_gone(&registry, "/lobby", &slow).await;
    }

    #[tokio::test]
    async fn test_no_delivery_after_leave() {
        let registry = Arc::new(RoomRegistry::new());
        let (a, mut rx_a) = member(4);
        let (b, _rx_b) = member(4);
        registry.join("/lobby", a.clone()).await.unwrap();
        registry.join("/lobby", b.clone()).await.unwrap();

        registry.leave("/lobby", a.id).await;
        a.close();
        registry
            .broadcast("/lobby", RoomMessage::text("after"), None)
            .await;

        assert!(rx_a.try_recv().is_err());
    }
}
