//! Dispatch's handle on the barcode state machine.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use cp_01_opcode::OpCode;
use cp_02_barcode::domain::entities::{BarcodeStatus, ScanEvent};
use cp_02_barcode::{BarcodeError, BarcodeService};
use cp_04_dispatch::{BarcodeControl, DispatchError};
use shared_types::{BarcodeCode, CourierId};
use std::sync::Arc;

/// Implements the dispatch engine's barcode port over the barcode service.
pub struct BarcodeControlAdapter {
    barcodes: Arc<BarcodeService>,
}

impl BarcodeControlAdapter {
    pub fn new(barcodes: Arc<BarcodeService>) -> Self {
        Self { barcodes }
    }

    fn dispatch_err(e: BarcodeError) -> DispatchError {
        DispatchError::BarcodeRejected {
            code: e.error_code(),
            message: e.to_string(),
        }
    }

    async fn transition(
        &self,
        code: &BarcodeCode,
        courier_id: &CourierId,
        at: OpCode,
        timestamp: DateTime<Utc>,
        new_status: BarcodeStatus,
        actor_level: u8,
    ) -> Result<(), DispatchError> {
        let scan = ScanEvent {
            courier_id: courier_id.clone(),
            at_op_code: at,
            new_status,
            timestamp,
            note: None,
        };
        self.barcodes
            .transition(scan, code, Some(actor_level), None)
            .await
            .map(|_| ())
            .map_err(Self::dispatch_err)
    }
}

#[async_trait]
impl BarcodeControl for BarcodeControlAdapter {
    async fn mark_in_transit(
        &self,
        code: &BarcodeCode,
        courier_id: &CourierId,
        at: OpCode,
        timestamp: DateTime<Utc>,
        actor_level: u8,
    ) -> Result<(), DispatchError> {
        self.transition(
            code,
            courier_id,
            at,
            timestamp,
            BarcodeStatus::InTransit,
            actor_level,
        )
        .await
    }

    async fn mark_delivered(
        &self,
        code: &BarcodeCode,
        courier_id: &CourierId,
        at: OpCode,
        timestamp: DateTime<Utc>,
        actor_level: u8,
    ) -> Result<(), DispatchError> {
        self.transition(
            code,
            courier_id,
            at,
            timestamp,
            BarcodeStatus::Delivered,
            actor_level,
        )
        .await
    }

    async fn mark_failed(
        &self,
        code: &BarcodeCode,
        courier_id: Option<&CourierId>,
        at: Option<OpCode>,
        timestamp: DateTime<Utc>,
        actor_level: u8,
    ) -> Result<(), DispatchError> {
        match (courier_id, at) {
            (Some(courier_id), Some(at)) => {
                self.transition(
                    code,
                    courier_id,
                    at,
                    timestamp,
                    BarcodeStatus::Failed,
                    actor_level,
                )
                .await
            }
            // Timeout-driven failures have no scanning courier; the system
            // records the status change at the delivery code.
            _ => {
                let barcode = self
                    .barcodes
                    .get(code)
                    .await
                    .map_err(Self::dispatch_err)?;
                if barcode.status.is_terminal() {
                    return Ok(());
                }
                // Tasks only exist for bound barcodes, so the recipient
                // code is always present here.
                let Some(at) = barcode.recipient_op_code else {
                    return Ok(());
                };
                let scan = ScanEvent {
                    courier_id: CourierId::from("system"),
                    at_op_code: at,
                    new_status: BarcodeStatus::Failed,
                    timestamp,
                    note: Some("timeout reassignment budget exhausted".to_string()),
                };
                self.barcodes
                    .transition(scan, code, Some(actor_level), None)
                    .await
                    .map(|_| ())
                    .map_err(Self::dispatch_err)
            }
        }
    }
}
