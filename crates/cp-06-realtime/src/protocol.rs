//! Wire frames and room naming.

use chrono::{DateTime, Utc};
use cp_01_opcode::OpCodePrefix;
use serde::{Deserialize, Serialize};
use shared_types::{LetterId, Role, UserId};
use uuid::Uuid;

/// Event types pushed by the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventType {
    LetterStatusUpdate,
    CourierTaskAssigned,
    CourierLocationUpdate,
    Notification,
    Heartbeat,
    SystemMessage,
    Error,
}

/// A server-to-client frame.
///
/// `seq` is present on room pushes and increases monotonically per room;
/// clients detect gaps and request a replay from their last seen sequence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WsFrame {
    pub id: String,
    #[serde(rename = "type")]
    pub event_type: EventType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub room: Option<String>,
    pub data: serde_json::Value,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seq: Option<u64>,
}

impl WsFrame {
    /// A frame outside any room (heartbeats, errors).
    #[must_use]
    pub fn direct(event_type: EventType, data: serde_json::Value) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            event_type,
            room: None,
            data,
            timestamp: Utc::now(),
            seq: None,
        }
    }
}

/// Client-to-server commands.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientCommand {
    JoinRoom { room: String },
    LeaveRoom { room: String },
    Replay { room: String, from_seq: u64 },
    Pong,
}

/// Why the hub closed a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CloseReason {
    /// Send buffer overflowed.
    SlowConsumer,
    /// Inbound frame exceeded the size cap.
    MessageTooLarge,
    /// No pong inside the idle window.
    StalePong,
    /// Ordinary close.
    Normal,
}

impl CloseReason {
    /// Stable name carried in the closing error frame.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SlowConsumer => "SlowConsumer",
            Self::MessageTooLarge => "MessageTooLarge",
            Self::StalePong => "StalePong",
            Self::Normal => "Normal",
        }
    }
}

/// Room name constructors. Parameterized rooms are plain strings on the
/// wire; these helpers keep the naming in one place.
pub mod rooms {
    use super::*;

    pub const GLOBAL: &str = "global";
    pub const SYSTEM: &str = "system";
    pub const COURIERS: &str = "couriers";
    pub const ADMINS: &str = "admins";

    #[must_use]
    pub fn school(code: &str) -> String {
        format!("school:{code}")
    }

    #[must_use]
    pub fn user(id: &UserId) -> String {
        format!("user:{id}")
    }

    #[must_use]
    pub fn letter(id: &LetterId) -> String {
        format!("letter:{id}")
    }

    #[must_use]
    pub fn prefix(p: &OpCodePrefix) -> String {
        format!("prefix:{p}")
    }

    /// The role-specific room a connection auto-joins, if any.
    #[must_use]
    pub fn for_role(role: Role) -> Option<&'static str> {
        match role {
            Role::Courier => Some(COURIERS),
            Role::Admin => Some(ADMINS),
            Role::User => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_type_wire_names() {
        let json = serde_json::to_string(&EventType::LetterStatusUpdate).unwrap();
        assert_eq!(json, "\"LETTER_STATUS_UPDATE\"");
        let json = serde_json::to_string(&EventType::CourierTaskAssigned).unwrap();
        assert_eq!(json, "\"COURIER_TASK_ASSIGNED\"");
    }

    #[test]
    fn test_client_command_parsing() {
        let cmd: ClientCommand =
            serde_json::from_str(r#"{"type":"join_room","room":"letter:L1"}"#).unwrap();
        assert_eq!(
            cmd,
            ClientCommand::JoinRoom {
                room: "letter:L1".to_string()
            }
        );

        let cmd: ClientCommand =
            serde_json::from_str(r#"{"type":"replay","room":"letter:L1","from_seq":17}"#).unwrap();
        assert_eq!(
            cmd,
            ClientCommand::Replay {
                room: "letter:L1".to_string(),
                from_seq: 17
            }
        );
    }

    #[test]
    fn test_frame_omits_absent_fields() {
        let frame = WsFrame::direct(EventType::Heartbeat, serde_json::json!({}));
        let json = serde_json::to_string(&frame).unwrap();
        assert!(!json.contains("\"room\""));
        assert!(!json.contains("\"seq\""));
        assert!(json.contains("\"type\":\"HEARTBEAT\""));
    }

    #[test]
    fn test_room_names() {
        assert_eq!(rooms::school("PK"), "school:PK");
        assert_eq!(rooms::user(&UserId::from("U1")), "user:U1");
        assert_eq!(rooms::letter(&LetterId::from("L1")), "letter:L1");
        assert_eq!(
            rooms::prefix(&OpCodePrefix::parse("PK5F").unwrap()),
            "prefix:PK5F"
        );
        assert_eq!(rooms::for_role(Role::Courier), Some(rooms::COURIERS));
        assert_eq!(rooms::for_role(Role::User), None);
    }
}
