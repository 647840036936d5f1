use super::*;
use crate::protocol::ClientCommand;
use std::time::Duration;
use tokio::time::timeout;

fn test_config() -> HubConfig {
    HubConfig {
        ping_interval: Duration::from_millis(20),
        pong_timeout: Duration::from_secs(60),
        send_buffer: 8,
        history_capacity: 100,
        room_gc: Duration::from_secs(300),
        command_queue: 64,
    }
}

async fn connect(
    hub: &HubHandle,
    user: &str,
    role: Role,
    prefix: Option<&str>,
) -> (ConnectionId, mpsc::Receiver<WsFrame>) {
    let (tx, rx) = mpsc::channel(8);
    let conn = hub
        .register(
            RegisterRequest {
                user_id: UserId::from(user),
                role,
                school_code: Some("PK".to_string()),
                courier_prefix: prefix.map(|p| OpCodePrefix::parse(p).unwrap()),
            },
            tx,
        )
        .await
        .unwrap();
    (conn, rx)
}

async fn next_frame(rx: &mut mpsc::Receiver<WsFrame>) -> WsFrame {
    timeout(Duration::from_millis(500), rx.recv())
        .await
        .expect("timed out waiting for frame")
        .expect("channel closed")
}

/// Skip heartbeat frames, returning the first payload frame.
async fn next_payload(rx: &mut mpsc::Receiver<WsFrame>) -> WsFrame {
    loop {
        let frame = next_frame(rx).await;
        if frame.event_type != EventType::Heartbeat {
            return frame;
        }
    }
}

#[tokio::test]
async fn test_register_auto_joins_user_room() {
    let hub = Hub::spawn(test_config());
    let (_conn, mut rx) = connect(&hub, "U1", Role::User, None).await;

    hub.broadcast(
        "user:U1".to_string(),
        EventType::Notification,
        serde_json::json!({"title": "hi"}),
    )
    .await;

    let frame = next_payload(&mut rx).await;
    assert_eq!(frame.event_type, EventType::Notification);
    assert_eq!(frame.room.as_deref(), Some("user:U1"));
    assert_eq!(frame.seq, Some(1));
}

#[tokio::test]
async fn test_courier_joins_prefix_truncations() {
    let hub = Hub::spawn(test_config());
    let (_conn, mut rx) = connect(&hub, "U1", Role::Courier, Some("PK5F3D")).await;

    // An area-scope announcement reaches the exact-point courier.
    hub.broadcast(
        "prefix:PK5F".to_string(),
        EventType::CourierTaskAssigned,
        serde_json::json!({"task": "T1"}),
    )
    .await;

    let frame = next_payload(&mut rx).await;
    assert_eq!(frame.room.as_deref(), Some("prefix:PK5F"));
}

#[tokio::test]
async fn test_per_room_sequences_are_monotonic() {
    let hub = Hub::spawn(test_config());
    let (_conn, mut rx) = connect(&hub, "U1", Role::User, None).await;

    for n in 0..3 {
        hub.broadcast(
            "global".to_string(),
            EventType::SystemMessage,
            serde_json::json!({ "n": n }),
        )
        .await;
    }

    let mut last = 0;
    for _ in 0..3 {
        let frame = next_payload(&mut rx).await;
        let seq = frame.seq.unwrap();
        assert!(seq > last, "seq {seq} after {last}");
        last = seq;
    }
}

#[tokio::test]
async fn test_join_leave_room() {
    let hub = Hub::spawn(test_config());
    let (conn, mut rx) = connect(&hub, "U1", Role::User, None).await;

    hub.join(conn.clone(), "letter:L1".to_string()).await;
    hub.broadcast(
        "letter:L1".to_string(),
        EventType::LetterStatusUpdate,
        serde_json::json!({"status": "bound"}),
    )
    .await;
    let frame = next_payload(&mut rx).await;
    assert_eq!(frame.room.as_deref(), Some("letter:L1"));

    hub.leave(conn, "letter:L1".to_string()).await;
    hub.broadcast(
        "letter:L1".to_string(),
        EventType::LetterStatusUpdate,
        serde_json::json!({"status": "in_transit"}),
    )
    .await;
    // Nothing but heartbeats should arrive now.
    let outcome = timeout(Duration::from_millis(150), async {
        loop {
            if let Some(frame) = rx.recv().await {
                if frame.event_type != EventType::Heartbeat {
                    return frame;
                }
            }
        }
    })
    .await;
    assert!(outcome.is_err(), "received frame after leaving room");
}

#[tokio::test]
async fn test_replay_fills_gap() {
    let hub = Hub::spawn(test_config());
    // Seed history before the subscriber exists.
    for n in 1..=5 {
        hub.broadcast(
            "letter:L1".to_string(),
            EventType::LetterStatusUpdate,
            serde_json::json!({ "n": n }),
        )
        .await;
    }

    let (conn, mut rx) = connect(&hub, "U2", Role::User, None).await;
    hub.join(conn.clone(), "letter:L1".to_string()).await;
    hub.replay(conn, "letter:L1".to_string(), 3).await;

    let a = next_payload(&mut rx).await;
    let b = next_payload(&mut rx).await;
    assert_eq!(a.seq, Some(4));
    assert_eq!(b.seq, Some(5));
}

#[tokio::test]
async fn test_slow_consumer_dropped_others_unaffected() {
    let mut config = test_config();
    config.send_buffer = 2;
    config.ping_interval = Duration::from_secs(3600); // keep heartbeats out
    let hub = Hub::spawn(config);

    // The slow connection's buffer is 2 frames and never drained.
    let (tx_slow, _rx_slow_kept) = mpsc::channel(2);
    let slow = hub
        .register(
            RegisterRequest {
                user_id: UserId::from("slow"),
                role: Role::User,
                school_code: Some("PK".to_string()),
                courier_prefix: None,
            },
            tx_slow,
        )
        .await
        .unwrap();
    let _ = slow;

    let (healthy, mut rx_healthy) = connect(&hub, "healthy", Role::User, None).await;
    let _ = healthy;

    for n in 0..4 {
        hub.broadcast(
            "global".to_string(),
            EventType::SystemMessage,
            serde_json::json!({ "n": n }),
        )
        .await;
    }

    // The healthy connection saw every frame, in order.
    let mut seqs = Vec::new();
    for _ in 0..4 {
        seqs.push(next_payload(&mut rx_healthy).await.seq.unwrap());
    }
    assert_eq!(seqs, vec![1, 2, 3, 4]);

    // The slow one is gone.
    let stats = hub.stats().await.unwrap();
    assert_eq!(stats.connections, 1);
}

#[tokio::test]
async fn test_stale_pong_closes_connection() {
    let mut config = test_config();
    config.ping_interval = Duration::from_millis(20);
    config.pong_timeout = Duration::from_millis(50);
    let hub = Hub::spawn(config);

    let (_conn, mut rx) = connect(&hub, "U1", Role::User, None).await;

    // Never pong; the connection should be evicted.
    tokio::time::sleep(Duration::from_millis(200)).await;
    let stats = hub.stats().await.unwrap();
    assert_eq!(stats.connections, 0);

    // The closing error frame names the reason.
    let mut saw_close = false;
    while let Ok(Some(frame)) = timeout(Duration::from_millis(100), rx.recv()).await {
        if frame.event_type == EventType::Error {
            assert_eq!(frame.data["reason"], "StalePong");
            saw_close = true;
        }
    }
    assert!(saw_close);
}

#[tokio::test]
async fn test_pong_keeps_connection_alive() {
    let mut config = test_config();
    config.ping_interval = Duration::from_millis(20);
    config.pong_timeout = Duration::from_millis(80);
    let hub = Hub::spawn(config);

    let (conn, mut rx) = connect(&hub, "U1", Role::User, None).await;

    for _ in 0..6 {
        tokio::time::sleep(Duration::from_millis(30)).await;
        hub.pong(conn.clone()).await;
        // Drain whatever arrived.
        while rx.try_recv().is_ok() {}
    }

    let stats = hub.stats().await.unwrap();
    assert_eq!(stats.connections, 1);
}

#[tokio::test]
async fn test_empty_room_garbage_collected() {
    let mut config = test_config();
    config.ping_interval = Duration::from_millis(20);
    config.room_gc = Duration::from_millis(40);
    let hub = Hub::spawn(config);

    // A broadcast with no members creates the room empty.
    hub.broadcast(
        "letter:L9".to_string(),
        EventType::LetterStatusUpdate,
        serde_json::json!({}),
    )
    .await;
    let stats = hub.stats().await.unwrap();
    assert_eq!(stats.rooms, 1);

    tokio::time::sleep(Duration::from_millis(150)).await;
    let stats = hub.stats().await.unwrap();
    assert_eq!(stats.rooms, 0);
}

#[test]
fn test_client_command_round_trip() {
    // The reader glue parses these straight off the socket.
    let pong: ClientCommand = serde_json::from_str(r#"{"type":"pong"}"#).unwrap();
    assert_eq!(pong, ClientCommand::Pong);
}
