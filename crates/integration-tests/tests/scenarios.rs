//! End-to-end scenarios: letter → barcode → task → scans → delivery, with
//! the real-time hub and the HTTP surface in the loop.

use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use chrono::{Duration, Utc};
use cp_02_barcode::domain::entities::BarcodeStatus;
use cp_04_dispatch::ports::outbound::TaskStore;
use cp_04_dispatch::{DispatchError, ScanKind, ScanRequest, TaskStatus};
use cp_06_realtime::protocol::rooms;
use cp_06_realtime::{EventType, Hub, HubConfig, RegisterRequest, WsFrame};
use integration_tests::{eventually, platform, TestPlatform};
use shared_bus::{EventFilter, PlatformEvent};
use shared_types::{CourierLevel, LetterId, Role, UserId};
use tokio::sync::mpsc;
use tower::util::ServiceExt;

fn scan(kind: ScanKind, at: &str) -> ScanRequest {
    ScanRequest {
        kind,
        at_op_code: cp_01_opcode::OpCode::parse(at).unwrap(),
        timestamp: Utc::now(),
        note: None,
    }
}

async fn bind_seeded_letter(p: &TestPlatform) -> cp_02_barcode::Barcode {
    p.seed_letter("L1", "author", "PK5F3D").await;
    p.seed_envelope("E1", "author").await;
    let (barcode, _) = p
        .barcodes
        .create(
            &LetterId::from("L1"),
            &mut cp_02_barcode::domain::entities::GenerationContext::single(),
        )
        .await
        .unwrap();
    p.barcodes
        .bind(
            cp_02_barcode::BindRequest {
                code: barcode.code.clone(),
                envelope_id: shared_types::EnvelopeId::from("E1"),
                recipient_op_code: cp_01_opcode::OpCode::parse("PK5F2A").unwrap(),
                reveal_at: None,
            },
            None,
        )
        .await
        .unwrap()
}

/// Scenario 1: happy-path delivery, with the letter room observing exactly
/// one status update per transition, strictly ordered.
#[tokio::test]
async fn happy_path_delivery() {
    let p = platform().await;
    let courier = p.seed_courier("u-courier", CourierLevel::L2, "PK5F").await;
    let actor = TestPlatform::actor(&courier);

    // Watch the letter room before anything happens.
    let (frames_tx, mut frames_rx) = mpsc::channel::<WsFrame>(64);
    let conn = p
        .hub
        .register(
            RegisterRequest {
                user_id: UserId::from("watcher"),
                role: Role::User,
                school_code: Some("PK".to_string()),
                courier_prefix: None,
            },
            frames_tx,
        )
        .await
        .unwrap();
    p.hub
        .join(conn, rooms::letter(&LetterId::from("L1")))
        .await;

    let barcode = bind_seeded_letter(&p).await;
    assert_eq!(barcode.status, BarcodeStatus::Bound);

    // The bound event creates a task announced in the area room.
    let task = eventually(|| async {
        p.dispatch
            .tasks_for_courier(&actor)
            .await
            .unwrap()
            .into_iter()
            .next()
    })
    .await;
    assert_eq!(task.status, TaskStatus::Available);
    assert_eq!(task.pickup_op_code.as_str(), "PK5F3D");
    assert_eq!(task.delivery_op_code.as_str(), "PK5F2A");

    let accepted = p.dispatch.accept(&task.id, &actor, None).await.unwrap();
    assert_eq!(accepted.status, TaskStatus::Accepted);

    let collected = p
        .dispatch
        .scan(&task.id, &actor, scan(ScanKind::Pickup, "PK5F3D"), None)
        .await
        .unwrap();
    assert_eq!(collected.status, TaskStatus::Collected);
    assert_eq!(
        p.barcodes.get(&barcode.code).await.unwrap().status,
        BarcodeStatus::InTransit
    );

    p.dispatch
        .scan(&task.id, &actor, scan(ScanKind::Transit, "PK5F3D"), None)
        .await
        .unwrap();
    let delivered = p
        .dispatch
        .scan(&task.id, &actor, scan(ScanKind::Deliver, "PK5F2A"), None)
        .await
        .unwrap();
    assert_eq!(delivered.status, TaskStatus::Delivered);
    assert_eq!(
        p.barcodes.get(&barcode.code).await.unwrap().status,
        BarcodeStatus::Delivered
    );

    // Letter-room frames: bound, in_transit, delivered; strictly
    // increasing seq, one frame per transition.
    let mut updates = Vec::new();
    while updates.len() < 3 {
        let frame = tokio::time::timeout(std::time::Duration::from_secs(2), frames_rx.recv())
            .await
            .expect("letter update timed out")
            .expect("hub closed watcher");
        if frame.event_type == EventType::LetterStatusUpdate {
            updates.push(frame);
        }
    }
    let statuses: Vec<&str> = updates
        .iter()
        .map(|f| f.data["status"].as_str().unwrap())
        .collect();
    assert_eq!(statuses, vec!["bound", "in_transit", "delivered"]);
    let seqs: Vec<u64> = updates.iter().map(|f| f.seq.unwrap()).collect();
    assert!(seqs.windows(2).all(|w| w[0] < w[1]), "seqs not increasing: {seqs:?}");
}

/// Scenario 2: a courier outside the prefix cannot scan; nothing is
/// recorded.
#[tokio::test]
async fn permission_violation_leaves_no_trace() {
    let p = platform().await;
    let courier = p.seed_courier("u-courier", CourierLevel::L2, "PK5F").await;
    let foreign = p.seed_courier("u-foreign", CourierLevel::L2, "QH1A").await;

    let barcode = bind_seeded_letter(&p).await;
    let task = eventually(|| async {
        p.dispatch
            .tasks_for_courier(&TestPlatform::actor(&courier))
            .await
            .unwrap()
            .into_iter()
            .next()
    })
    .await;
    p.dispatch
        .accept(&task.id, &TestPlatform::actor(&courier), None)
        .await
        .unwrap();

    let err = p
        .dispatch
        .scan(
            &task.id,
            &TestPlatform::actor(&foreign),
            scan(ScanKind::Pickup, "PK5F3D"),
            None,
        )
        .await
        .unwrap_err();
    assert!(matches!(err, DispatchError::OutsideScope { .. }));

    let unchanged = p.barcodes.get(&barcode.code).await.unwrap();
    assert_eq!(unchanged.status, BarcodeStatus::Bound);
    assert!(unchanged.scan_log.is_empty());
}

/// Scenario 3: of two concurrent accepts, exactly one wins.
#[tokio::test]
async fn accept_race_single_winner() {
    let p = platform().await;
    let first = p.seed_courier("u-one", CourierLevel::L2, "PK5F").await;
    let second = p.seed_courier("u-two", CourierLevel::L3, "PK5F").await;

    let barcode = bind_seeded_letter(&p).await;
    let task = eventually(|| async {
        p.dispatch
            .tasks_for_courier(&TestPlatform::actor(&first))
            .await
            .unwrap()
            .into_iter()
            .next()
    })
    .await;

    let first_actor = TestPlatform::actor(&first);
    let second_actor = TestPlatform::actor(&second);
    let (a, b) = tokio::join!(
        p.dispatch.accept(&task.id, &first_actor, None),
        p.dispatch.accept(&task.id, &second_actor, None),
    );
    let outcomes = [a.is_ok(), b.is_ok()];
    assert_eq!(outcomes.iter().filter(|ok| **ok).count(), 1, "{outcomes:?}");
    let loser = if a.is_err() { a.unwrap_err() } else { b.unwrap_err() };
    assert!(matches!(loser, DispatchError::AlreadyTaken));

    // Barcode untouched by the race.
    assert_eq!(
        p.barcodes.get(&barcode.code).await.unwrap().status,
        BarcodeStatus::Bound
    );
}

/// Scenario 4: an idempotent retry replays the first response verbatim and
/// mutates the aggregate once.
#[tokio::test]
async fn idempotent_bind_retry() {
    let p = platform().await;
    p.seed_letter("L1", "author", "PK5F3D").await;
    p.seed_envelope("E1", "author").await;
    let token = p.token("author", Role::User);

    // Issue the barcode through the API.
    let create = Request::builder()
        .method(Method::POST)
        .uri("/api/v1/barcodes")
        .header(header::AUTHORIZATION, format!("Bearer {token}"))
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(r#"{"letter_id":"L1"}"#))
        .unwrap();
    let response = p.router.clone().oneshot(create).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let envelope: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(envelope["code"], 0);
    let code = envelope["data"]["code"].as_str().unwrap().to_string();

    let bind_request = |key: &str| {
        Request::builder()
            .method(Method::PATCH)
            .uri(format!("/api/v1/barcodes/{code}/bind"))
            .header(header::AUTHORIZATION, format!("Bearer {token}"))
            .header(header::CONTENT_TYPE, "application/json")
            .header("Idempotency-Key", key)
            .body(Body::from(
                r#"{"envelope_id":"E1","recipient_op_code":"PK5F2A"}"#,
            ))
            .unwrap()
    };

    let first = p.router.clone().oneshot(bind_request("K1")).await.unwrap();
    assert_eq!(first.status(), StatusCode::OK);
    let first_bytes = axum::body::to_bytes(first.into_body(), usize::MAX)
        .await
        .unwrap();

    let second = p.router.clone().oneshot(bind_request("K1")).await.unwrap();
    assert_eq!(second.status(), StatusCode::OK);
    assert_eq!(
        second.headers().get("X-Idempotent-Replay").map(|v| v.as_bytes()),
        Some(b"true".as_ref())
    );
    let second_bytes = axum::body::to_bytes(second.into_body(), usize::MAX)
        .await
        .unwrap();

    assert_eq!(first_bytes, second_bytes, "replay must be byte-identical");

    // Bound exactly once.
    let barcode = p
        .barcodes
        .get(&shared_types::BarcodeCode::from(code.as_str()))
        .await
        .unwrap();
    assert_eq!(barcode.status, BarcodeStatus::Bound);
    assert_eq!(barcode.scan_log.len(), 0);
}

/// Scenario 5: timeout reminder at 48 h, reassignment at 96 h, failure once
/// the attempt budget is spent.
#[tokio::test]
async fn courier_timeout_reassignment() {
    let p = platform().await;
    let courier = p.seed_courier("u-courier", CourierLevel::L2, "PK5F").await;
    let actor = TestPlatform::actor(&courier);

    let barcode = bind_seeded_letter(&p).await;
    let task = eventually(|| async {
        p.dispatch
            .tasks_for_courier(&actor)
            .await
            .unwrap()
            .into_iter()
            .next()
    })
    .await;

    let mut bus_sub = p.bus.subscribe(EventFilter::all());

    let age_acceptance = |hours: i64| {
        let store = p.store.clone();
        let task_id = task.id.clone();
        async move {
            let mut stored = TaskStore::get(&*store, &task_id).await.unwrap().unwrap();
            stored.accepted_at = Some(Utc::now() - Duration::hours(hours));
            TaskStore::put(&*store, &stored).await.unwrap();
        }
    };

    p.dispatch.accept(&task.id, &actor, None).await.unwrap();

    // 50 hours in: reminder only.
    age_acceptance(50).await;
    let sweep = p.dispatch.check_timeouts(Utc::now()).await.unwrap();
    assert_eq!((sweep.reminded, sweep.reassigned, sweep.failed), (1, 0, 0));

    // 100 hours in: back to the pool, attempts bumped, courier notified.
    age_acceptance(100).await;
    let sweep = p.dispatch.check_timeouts(Utc::now()).await.unwrap();
    assert_eq!(sweep.reassigned, 1);
    let reopened = p.dispatch.get(&task.id).await.unwrap();
    assert_eq!(reopened.status, TaskStatus::Available);
    assert_eq!(reopened.attempts, 1);

    let mut saw_reassigned = false;
    let mut saw_notification = false;
    while let Ok(Some(published)) = bus_sub.try_recv() {
        match published.event {
            PlatformEvent::TaskReassigned { attempts, .. } => {
                assert_eq!(attempts, 1);
                saw_reassigned = true;
            }
            PlatformEvent::NotificationRequested { .. } => saw_notification = true,
            _ => {}
        }
    }
    assert!(saw_reassigned);
    assert!(saw_notification);

    // Burn the remaining attempts: the fourth timeout fails everything.
    for _ in 0..3 {
        p.dispatch.accept(&task.id, &actor, None).await.unwrap();
        age_acceptance(100).await;
        p.dispatch.check_timeouts(Utc::now()).await.unwrap();
    }

    let dead = p.dispatch.get(&task.id).await.unwrap();
    assert_eq!(dead.status, TaskStatus::Failed);
    assert_eq!(dead.attempts, 4);
    assert_eq!(
        p.barcodes.get(&barcode.code).await.unwrap().status,
        BarcodeStatus::Failed
    );
}

/// Scenario 6: a stalled consumer is closed with `SlowConsumer`; everyone
/// else keeps a gapless sequence.
#[tokio::test]
async fn hub_backpressure_isolates_slow_consumer() {
    let hub = Hub::spawn(HubConfig {
        send_buffer: 4,
        ping_interval: std::time::Duration::from_secs(3600),
        ..HubConfig::default()
    });

    let (slow_tx, _slow_rx_undrained) = mpsc::channel(4);
    hub.register(
        RegisterRequest {
            user_id: UserId::from("slow"),
            role: Role::User,
            school_code: None,
            courier_prefix: None,
        },
        slow_tx,
    )
    .await
    .unwrap();

    let (healthy_tx, mut healthy_rx) = mpsc::channel(64);
    hub.register(
        RegisterRequest {
            user_id: UserId::from("healthy"),
            role: Role::User,
            school_code: None,
            courier_prefix: None,
        },
        healthy_tx,
    )
    .await
    .unwrap();

    for n in 0..8 {
        hub.broadcast(
            rooms::GLOBAL.to_string(),
            EventType::SystemMessage,
            serde_json::json!({ "n": n }),
        )
        .await;
    }

    let mut seqs = Vec::new();
    while seqs.len() < 8 {
        let frame = tokio::time::timeout(std::time::Duration::from_secs(2), healthy_rx.recv())
            .await
            .expect("broadcast timed out")
            .expect("healthy connection dropped");
        if frame.event_type == EventType::SystemMessage {
            seqs.push(frame.seq.unwrap());
        }
    }
    assert_eq!(seqs, (1..=8).collect::<Vec<u64>>());

    let stats = hub.stats().await.unwrap();
    assert_eq!(stats.connections, 1, "slow consumer should be gone");
}
