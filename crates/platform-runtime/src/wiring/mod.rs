//! Composition: storage selection, service construction, job registration.

use crate::adapters::ai::TemplateAiProducer;
use crate::adapters::barcode_control::BarcodeControlAdapter;
use crate::adapters::courier_directory::CourierDirectoryAdapter;
use crate::config::{RuntimeConfig, StorageBackend};
use crate::handlers::{event_routing, jobs};
use anyhow::Context;
use axum::Router;
use chrono::Utc;
use cp_02_barcode::ports::outbound::{BarcodeStore, EnvelopeStore, LetterStore};
use cp_02_barcode::BarcodeService;
use cp_03_courier::ports::outbound::CourierStore;
use cp_03_courier::{CourierConfig, CourierService, DefaultScore};
use cp_04_dispatch::ports::outbound::TaskStore;
use cp_04_dispatch::DispatchService;
use cp_05_authz::TokenAuthority;
use cp_06_realtime::{Hub, HubConfig, HubHandle};
use cp_07_scheduler::ports::outbound::{DeadLetterStore, LeaseStore, ScheduledTaskStore};
use cp_07_scheduler::{
    BreakerConfig, EngineConfig, HandlerRegistry, SchedulerEngine, TypeCircuitBreaker,
};
use cp_08_idempotency::{IdempotencyStore, MemoryIdempotencyStore};
use cp_10_storage::MemoryStore;
use cp_11_api_gateway::{build_router, AppState, GatewayConfig};
use shared_bus::InMemoryEventBus;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::info;

/// The assembled platform.
pub struct Platform {
    pub bus: Arc<InMemoryEventBus>,
    pub barcodes: Arc<BarcodeService>,
    pub couriers: Arc<CourierService>,
    pub dispatch: Arc<DispatchService>,
    pub engine: Arc<SchedulerEngine>,
    pub hub: HubHandle,
    pub router: Router,
    shutdown_tx: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,
}

impl Platform {
    /// Build everything against the configured storage backend.
    pub async fn build(config: &RuntimeConfig) -> anyhow::Result<Platform> {
        match config.storage {
            StorageBackend::Memory => {
                info!("Storage backend: in-memory");
                let store = Arc::new(MemoryStore::new());
                let idempotency: Arc<dyn IdempotencyStore> =
                    Arc::new(MemoryIdempotencyStore::new());
                assemble(store, idempotency, config).await
            }
            StorageBackend::Rocks => {
                #[cfg(feature = "rocksdb")]
                {
                    info!(dir = %config.data_dir.display(), "Storage backend: RocksDB");
                    let store = Arc::new(
                        cp_10_storage::RocksStore::open(&config.data_dir)
                            .context("opening RocksDB store")?,
                    );
                    let idempotency: Arc<dyn IdempotencyStore> = store.clone();
                    assemble(store, idempotency, config).await
                }
                #[cfg(not(feature = "rocksdb"))]
                {
                    anyhow::bail!(
                        "CAMPUSPOST_STORAGE=rocksdb requires building with the `rocksdb` feature"
                    )
                }
            }
        }
    }

    /// Start the routing loop, lease recovery and scheduler workers.
    pub async fn start_background(&self, config: &RuntimeConfig) -> anyhow::Result<()> {
        event_routing::spawn(self.bus.clone(), self.hub.clone(), self.dispatch.clone());

        let recovered = self.engine.recover_expired_leases(Utc::now()).await?;
        if recovered > 0 {
            info!(recovered, "Recovered tasks with lapsed leases at startup");
        }

        self.register_jobs().await?;
        self.engine
            .spawn_workers(config.scheduler_workers, self.shutdown_rx.clone());
        info!(workers = config.scheduler_workers, "Scheduler workers running");
        Ok(())
    }

    /// Flip the shutdown signal for scheduler workers.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
    }

    async fn register_jobs(&self) -> anyhow::Result<()> {
        for (task_type, cron_expr) in [
            ("future_letter_unlock", jobs::cadence::FUTURE_LETTER_UNLOCK),
            ("courier_timeout_check", jobs::cadence::COURIER_TIMEOUT_CHECK),
            (
                "unbound_letter_cleanup",
                jobs::cadence::UNBOUND_LETTER_CLEANUP,
            ),
            ("scheduled_ai_reply", jobs::cadence::SCHEDULED_AI_REPLY),
        ] {
            self.engine
                .ensure_recurring(task_type, "cron", cron_expr)
                .await
                .with_context(|| format!("registering recurring job {task_type}"))?;
        }
        info!("Recurring jobs registered");
        Ok(())
    }
}

/// Wire services, the scheduler and the gateway over one store.
async fn assemble<S>(
    store: Arc<S>,
    idempotency: Arc<dyn IdempotencyStore>,
    config: &RuntimeConfig,
) -> anyhow::Result<Platform>
where
    S: BarcodeStore
        + LetterStore
        + EnvelopeStore
        + CourierStore
        + TaskStore
        + ScheduledTaskStore
        + LeaseStore
        + DeadLetterStore
        + Send
        + Sync
        + 'static,
{
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
        CourierConfig {
            l2_prefix_len: config.l2_prefix_len,
        },
    ));

    let dispatch = Arc::new(DispatchService::new(
        store.clone(),
        Arc::new(CourierDirectoryAdapter::new(couriers.clone(), score)),
        Arc::new(BarcodeControlAdapter::new(barcodes.clone())),
        bus.clone(),
    ));

    let mut registry = HandlerRegistry::new();
    registry.register(Arc::new(jobs::FutureLetterUnlock::new(barcodes.clone())));
    registry.register(Arc::new(jobs::CourierTimeoutCheck::new(dispatch.clone())));
    registry.register(Arc::new(jobs::UnboundLetterCleanup::new(barcodes.clone())));
    registry.register(Arc::new(jobs::ScheduledAiReply::new(
        Arc::new(TemplateAiProducer),
        bus.clone(),
    )));

    let engine = Arc::new(SchedulerEngine::new(
        store.clone(),
        store.clone(),
        store.clone(),
        Arc::new(registry),
        TypeCircuitBreaker::new(BreakerConfig::default()),
        bus.clone(),
        EngineConfig::default(),
    ));

    let hub = Hub::spawn(HubConfig::default());
    let tokens = Arc::new(TokenAuthority::new(config.jwt_secret.as_bytes()));

    let state = AppState {
        barcodes: barcodes.clone(),
        couriers: couriers.clone(),
        dispatch: dispatch.clone(),
        tokens,
        idempotency,
        hub: hub.clone(),
        config: GatewayConfig::default(),
    };
    let router = build_router(state);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    Ok(Platform {
        bus,
        barcodes,
        couriers,
        dispatch,
        engine,
        hub,
        router,
        shutdown_tx,
        shutdown_rx,
    })
}
