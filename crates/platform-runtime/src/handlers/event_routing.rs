//! The bus-to-hub routing loop.
//!
//! One task subscribed to every bus topic translates domain events into
//! room broadcasts and follow-on actions:
//!
//! - `BarcodeBound` additionally creates the courier task (the dispatch
//!   choreography trigger).
//! - Barcode transitions become `LETTER_STATUS_UPDATE` in the letter room.
//! - Task announcements become `COURIER_TASK_ASSIGNED` in the prefix room.
//! - Notifications land in the target user's room.
//! - Dead letters surface in the admins room.

use cp_04_dispatch::{DispatchService, TaskPriority};
use cp_06_realtime::protocol::rooms;
use cp_06_realtime::{EventType, HubHandle};
use shared_bus::{EventFilter, InMemoryEventBus, PlatformEvent};
use std::sync::Arc;
use tracing::{error, info};

/// Spawn the routing loop. Runs until the bus closes.
pub fn spawn(
    bus: Arc<InMemoryEventBus>,
    hub: HubHandle,
    dispatch: Arc<DispatchService>,
) -> tokio::task::JoinHandle<()> {
    let mut subscription = bus.subscribe(EventFilter::all());
    tokio::spawn(async move {
        info!("Event routing loop started");
        while let Some(published) = subscription.recv().await {
            route(&hub, &dispatch, published.event, published.request_id).await;
        }
        info!("Event routing loop stopped");
    })
}

async fn route(
    hub: &HubHandle,
    dispatch: &DispatchService,
    event: PlatformEvent,
    request_id: Option<shared_types::RequestId>,
) {
    match event {
        PlatformEvent::BarcodeBound {
            code,
            letter_id,
            sender_op_code,
            recipient_op_code,
            ..
        } => {
            hub.broadcast(
                rooms::letter(&letter_id),
                EventType::LetterStatusUpdate,
                serde_json::json!({
                    "letter_id": letter_id,
                    "status": "bound",
                    "barcode": code,
                }),
            )
            .await;

            if let Err(e) = dispatch
                .create_task(
                    code,
                    sender_op_code,
                    recipient_op_code,
                    TaskPriority::Normal,
                    request_id,
                )
                .await
            {
                error!(letter = %letter_id, error = %e, "Task creation for bound barcode failed");
            }
        }

        PlatformEvent::BarcodeTransitioned {
            code,
            letter_id,
            from_status,
            to_status,
            ..
        } => {
            hub.broadcast(
                rooms::letter(&letter_id),
                EventType::LetterStatusUpdate,
                serde_json::json!({
                    "letter_id": letter_id,
                    "barcode": code,
                    "from": from_status,
                    "status": to_status,
                }),
            )
            .await;
        }

        PlatformEvent::FutureLetterUnlocked { code, letter_id } => {
            hub.broadcast(
                rooms::letter(&letter_id),
                EventType::LetterStatusUpdate,
                serde_json::json!({
                    "letter_id": letter_id,
                    "barcode": code,
                    "status": "revealed",
                }),
            )
            .await;
        }

        PlatformEvent::TaskPublished {
            task_id,
            barcode_code,
            pickup_op_code,
            delivery_op_code,
            announce_prefix,
        } => {
            hub.broadcast(
                rooms::prefix(&announce_prefix),
                EventType::CourierTaskAssigned,
                serde_json::json!({
                    "task_id": task_id,
                    "barcode": barcode_code,
                    "pickup": pickup_op_code,
                    "delivery": delivery_op_code,
                    "status": "available",
                }),
            )
            .await;
        }

        PlatformEvent::TaskReassigned {
            task_id,
            attempts,
            announce_prefix,
            ..
        } => {
            hub.broadcast(
                rooms::prefix(&announce_prefix),
                EventType::CourierTaskAssigned,
                serde_json::json!({
                    "task_id": task_id,
                    "attempts": attempts,
                    "status": "available",
                }),
            )
            .await;
        }

        PlatformEvent::TaskAccepted { task_id, courier_id } => {
            hub.broadcast(
                rooms::COURIERS.to_string(),
                EventType::SystemMessage,
                serde_json::json!({
                    "task_id": task_id,
                    "courier_id": courier_id,
                    "status": "accepted",
                }),
            )
            .await;
        }

        // Terminal task state reaches letter watchers through the coupled
        // barcode transition; nothing further to fan out.
        PlatformEvent::TaskClosed { .. } => {}

        PlatformEvent::CourierStatusChanged {
            user_id,
            new_status,
            ..
        } => {
            hub.broadcast(
                rooms::user(&user_id),
                EventType::Notification,
                serde_json::json!({
                    "title": "Courier application update",
                    "body": format!("Your courier status is now {new_status}."),
                }),
            )
            .await;
        }

        PlatformEvent::NotificationRequested {
            user_id,
            title,
            body,
        } => {
            hub.broadcast(
                rooms::user(&user_id),
                EventType::Notification,
                serde_json::json!({ "title": title, "body": body }),
            )
            .await;
        }

        PlatformEvent::TaskDeadLettered {
            scheduled_task_id,
            task_type,
            error,
        } => {
            hub.broadcast(
                rooms::ADMINS.to_string(),
                EventType::SystemMessage,
                serde_json::json!({
                    "dead_letter": scheduled_task_id,
                    "task_type": task_type,
                    "error": error,
                }),
            )
            .await;
        }
    }
}
