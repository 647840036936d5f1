//! Shared handler state.

use crate::config::GatewayConfig;
use cp_02_barcode::BarcodeService;
use cp_03_courier::CourierService;
use cp_04_dispatch::DispatchService;
use cp_05_authz::TokenAuthority;
use cp_06_realtime::HubHandle;
use cp_08_idempotency::IdempotencyStore;
use std::sync::Arc;

/// Everything handlers reach for. Cheap to clone; all fields are shared.
#[derive(Clone)]
pub struct AppState {
    pub barcodes: Arc<BarcodeService>,
    pub couriers: Arc<CourierService>,
    pub dispatch: Arc<DispatchService>,
    pub tokens: Arc<TokenAuthority>,
    pub idempotency: Arc<dyn IdempotencyStore>,
    pub hub: HubHandle,
    pub config: GatewayConfig,
}
