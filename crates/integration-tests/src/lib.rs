//! # Integration Test Harness
//!
//! Assembles the whole platform over the in-memory adapters, mirroring the
//! runtime's wiring, and exposes seeding helpers. The end-to-end scenarios
//! live in `tests/scenarios.rs`.

#![allow(clippy::unwrap_used)]

use chrono::Utc;
use cp_01_opcode::OpCodePrefix;
use cp_02_barcode::ports::outbound::{EnvelopeStore, LetterStore};
use cp_02_barcode::BarcodeService;
use cp_03_courier::{
    Courier, CourierConfig, CourierService, DefaultScore, Reviewer,
};
use cp_04_dispatch::{DispatchService, ScanActor};
use cp_05_authz::TokenAuthority;
use cp_06_realtime::{Hub, HubConfig, HubHandle};
use cp_08_idempotency::MemoryIdempotencyStore;
use cp_10_storage::MemoryStore;
use cp_11_api_gateway::{build_router, AppState, GatewayConfig};
use platform_runtime::adapters::barcode_control::BarcodeControlAdapter;
use platform_runtime::adapters::courier_directory::CourierDirectoryAdapter;
use platform_runtime::handlers::event_routing;
use shared_bus::InMemoryEventBus;
use shared_types::{
    CourierLevel, Envelope, EnvelopeId, EnvelopeStatus, Letter, LetterId, LetterStatus,
    LetterVisibility, Role, UserId,
};
use std::sync::Arc;

/// The assembled test platform.
pub struct TestPlatform {
    pub store: Arc<MemoryStore>,
    pub bus: Arc<InMemoryEventBus>,
    pub barcodes: Arc<BarcodeService>,
    pub couriers: Arc<CourierService>,
    pub dispatch: Arc<DispatchService>,
    pub hub: HubHandle,
    pub tokens: Arc<TokenAuthority>,
    pub router: axum::Router,
}

/// Build the platform over fresh in-memory stores, with the event-routing
/// loop running.
pub async fn platform() -> TestPlatform {
    let store = Arc::new(MemoryStore::new());
    let bus = Arc::new(InMemoryEventBus::new());
    let score = Arc::new(DefaultScore);

    let barcodes = Arc::new(BarcodeService::new(
        store.clone(),
        store.clone(),
        store.clone(),
        bus.clone(),
    ));
    let couriers = Arc::new(CourierService::new(
        store.clone(),
        bus.clone(),
        score.clone(),
        CourierConfig::default(),
    ));
    let dispatch = Arc::new(DispatchService::new(
        store.clone(),
        Arc::new(CourierDirectoryAdapter::new(couriers.clone(), score)),
        Arc::new(BarcodeControlAdapter::new(barcodes.clone())),
        bus.clone(),
    ));

    let hub = Hub::spawn(HubConfig::default());
    let tokens = Arc::new(TokenAuthority::new(b"integration-test-secret"));

    let state = AppState {
        barcodes: barcodes.clone(),
        couriers: couriers.clone(),
        dispatch: dispatch.clone(),
        tokens: tokens.clone(),
        idempotency: Arc::new(MemoryIdempotencyStore::new()),
        hub: hub.clone(),
        config: GatewayConfig::default(),
    };
    let router = build_router(state);

    event_routing::spawn(bus.clone(), hub.clone(), dispatch.clone());

    TestPlatform {
        store,
        bus,
        barcodes,
        couriers,
        dispatch,
        hub,
        tokens,
        router,
    }
}

impl TestPlatform {
    /// Seed a draft letter.
    pub async fn seed_letter(&self, id: &str, author: &str, sender: &str) -> Letter {
        let letter = Letter {
            id: LetterId::from(id),
            author_id: UserId::from(author),
            content_opaque: "dear friend".to_string(),
            sender_op_code: cp_01_opcode::OpCode::parse(sender).unwrap(),
            recipient_op_code: None,
            visibility: LetterVisibility::Private,
            status: LetterStatus::Draft,
            created_at: Utc::now(),
        };
        LetterStore::put(&*self.store, &letter).await.unwrap();
        letter
    }

    /// Seed an unused envelope.
    pub async fn seed_envelope(&self, id: &str, owner: &str) -> Envelope {
        let envelope = Envelope {
            id: EnvelopeId::from(id),
            owner_user_id: UserId::from(owner),
            barcode_code: None,
            letter_id: None,
            status: EnvelopeStatus::Unsent,
        };
        EnvelopeStore::put(&*self.store, &envelope).await.unwrap();
        envelope
    }

    /// Seed an approved courier and return it.
    pub async fn seed_courier(&self, user: &str, level: CourierLevel, prefix: &str) -> Courier {
        let courier = self
            .couriers
            .apply(
                &UserId::from(user),
                level,
                OpCodePrefix::parse(prefix).unwrap(),
                None,
            )
            .await
            .unwrap();
        self.couriers
            .review(Reviewer::Admin, &courier.id, true, None)
            .await
            .unwrap()
    }

    /// The scan-actor view of a courier.
    pub fn actor(courier: &Courier) -> ScanActor {
        ScanActor {
            courier_id: courier.id.clone(),
            level_rank: courier.level.rank(),
            managed_prefix: courier.managed_prefix,
        }
    }

    /// A bearer token for a user.
    pub fn token(&self, user: &str, role: Role) -> String {
        self.tokens.issue(&UserId::from(user), role).unwrap()
    }
}

/// Poll until `probe` yields `Some`, or panic after ~2 seconds.
pub async fn eventually<T, F, Fut>(mut probe: F) -> T
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Option<T>>,
{
    for _ in 0..200 {
        if let Some(value) = probe().await {
            return value;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
    panic!("condition not reached in time");
}
