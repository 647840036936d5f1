//! The connection hub.
//!
//! A single dispatcher task owns all connections and rooms; everything else
//! talks to it through [`HubHandle`] commands over a bounded queue. This is
//! the only place connection state is ever mutated.

use crate::history::RoomHistory;
use crate::protocol::{rooms, CloseReason, EventType, WsFrame};
use crate::{
    HISTORY_CAPACITY, PING_INTERVAL_SECS, PONG_TIMEOUT_SECS, ROOM_GC_SECS, SEND_BUFFER_FRAMES,
};
use cp_01_opcode::OpCodePrefix;
use serde_json::Value;
use shared_types::{Role, UserId};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Opaque connection identity, minted at registration.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConnectionId(String);

impl ConnectionId {
    fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// The ID as `&str`.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Hub tuning. Defaults follow the platform constants.
#[derive(Debug, Clone)]
pub struct HubConfig {
    pub ping_interval: Duration,
    pub pong_timeout: Duration,
    pub send_buffer: usize,
    pub history_capacity: usize,
    pub room_gc: Duration,
    pub command_queue: usize,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            ping_interval: Duration::from_secs(PING_INTERVAL_SECS),
            pong_timeout: Duration::from_secs(PONG_TIMEOUT_SECS),
            send_buffer: SEND_BUFFER_FRAMES,
            history_capacity: HISTORY_CAPACITY,
            room_gc: Duration::from_secs(ROOM_GC_SECS),
            command_queue: 1024,
        }
    }
}

/// What a connection declares at registration; drives auto-join.
#[derive(Debug, Clone)]
pub struct RegisterRequest {
    pub user_id: UserId,
    pub role: Role,
    pub school_code: Option<String>,
    /// Managed prefix for courier connections; joins the prefix room and
    /// its school/area truncations so area-scope announcements reach them.
    pub courier_prefix: Option<OpCodePrefix>,
}

/// Snapshot for the health endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct HubStats {
    pub connections: usize,
    pub rooms: usize,
}

enum Command {
    Register {
        request: RegisterRequest,
        frames: mpsc::Sender<WsFrame>,
        reply: oneshot::Sender<ConnectionId>,
    },
    Unregister {
        conn: ConnectionId,
        reason: CloseReason,
    },
    Join {
        conn: ConnectionId,
        room: String,
    },
    Leave {
        conn: ConnectionId,
        room: String,
    },
    Pong {
        conn: ConnectionId,
    },
    Broadcast {
        room: String,
        event_type: EventType,
        data: Value,
    },
    Replay {
        conn: ConnectionId,
        room: String,
        from_seq: u64,
    },
    Tick,
    Stats {
        reply: oneshot::Sender<HubStats>,
    },
}

struct ConnState {
    user_id: UserId,
    rooms: HashSet<String>,
    sender: mpsc::Sender<WsFrame>,
    last_pong: Instant,
}

struct RoomState {
    members: HashSet<ConnectionId>,
    history: RoomHistory,
    emptied_at: Option<Instant>,
}

/// Cloneable front door to the dispatcher.
#[derive(Clone)]
pub struct HubHandle {
    tx: mpsc::Sender<Command>,
}

impl HubHandle {
    /// Register a connection. `frames` is the connection's bounded send
    /// buffer; create it with [`HubConfig::send_buffer`] capacity.
    pub async fn register(
        &self,
        request: RegisterRequest,
        frames: mpsc::Sender<WsFrame>,
    ) -> Option<ConnectionId> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(Command::Register {
                request,
                frames,
                reply,
            })
            .await
            .ok()?;
        rx.await.ok()
    }

    /// Drop a connection.
    pub async fn unregister(&self, conn: ConnectionId, reason: CloseReason) {
        let _ = self.tx.send(Command::Unregister { conn, reason }).await;
    }

    /// Join a room.
    pub async fn join(&self, conn: ConnectionId, room: String) {
        let _ = self.tx.send(Command::Join { conn, room }).await;
    }

    /// Leave a room.
    pub async fn leave(&self, conn: ConnectionId, room: String) {
        let _ = self.tx.send(Command::Leave { conn, room }).await;
    }

    /// Record a client pong.
    pub async fn pong(&self, conn: ConnectionId) {
        let _ = self.tx.send(Command::Pong { conn }).await;
    }

    /// Fan an event out to a room.
    pub async fn broadcast(&self, room: String, event_type: EventType, data: Value) {
        let _ = self
            .tx
            .send(Command::Broadcast {
                room,
                event_type,
                data,
            })
            .await;
    }

    /// Replay a room's history after `from_seq` into one connection.
    pub async fn replay(&self, conn: ConnectionId, room: String, from_seq: u64) {
        let _ = self
            .tx
            .send(Command::Replay {
                conn,
                room,
                from_seq,
            })
            .await;
    }

    /// Current connection/room counts.
    pub async fn stats(&self) -> Option<HubStats> {
        let (reply, rx) = oneshot::channel();
        self.tx.send(Command::Stats { reply }).await.ok()?;
        rx.await.ok()
    }
}

/// The dispatcher.
pub struct Hub {
    config: HubConfig,
    connections: HashMap<ConnectionId, ConnState>,
    rooms: HashMap<String, RoomState>,
}

impl Hub {
    /// Spawn the dispatcher and its heartbeat ticker; returns the handle.
    #[must_use]
    pub fn spawn(config: HubConfig) -> HubHandle {
        let (tx, mut rx) = mpsc::channel(config.command_queue);
        let ticker_tx = tx.clone();
        let ping_interval = config.ping_interval;

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(ping_interval);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                interval.tick().await;
                if ticker_tx.send(Command::Tick).await.is_err() {
                    return;
                }
            }
        });

        let mut hub = Hub {
            config,
            connections: HashMap::new(),
            rooms: HashMap::new(),
        };
        tokio::spawn(async move {
            while let Some(command) = rx.recv().await {
                hub.handle(command);
            }
            info!("Hub dispatcher stopped");
        });

        HubHandle { tx }
    }

    fn handle(&mut self, command: Command) {
        match command {
            Command::Register {
                request,
                frames,
                reply,
            } => {
                let conn = self.register(request, frames);
                let _ = reply.send(conn);
            }
            Command::Unregister { conn, reason } => self.close(&conn, reason),
            Command::Join { conn, room } => self.join(&conn, &room),
            Command::Leave { conn, room } => self.leave(&conn, &room),
            Command::Pong { conn } => {
                if let Some(state) = self.connections.get_mut(&conn) {
                    state.last_pong = Instant::now();
                }
            }
            Command::Broadcast {
                room,
                event_type,
                data,
            } => self.broadcast(&room, event_type, data),
            Command::Replay {
                conn,
                room,
                from_seq,
            } => self.replay(&conn, &room, from_seq),
            Command::Tick => self.tick(),
            Command::Stats { reply } => {
                let _ = reply.send(HubStats {
                    connections: self.connections.len(),
                    rooms: self.rooms.len(),
                });
            }
        }
    }

    fn register(&mut self, request: RegisterRequest, frames: mpsc::Sender<WsFrame>) -> ConnectionId {
        let conn = ConnectionId::generate();
        self.connections.insert(
            conn.clone(),
            ConnState {
                user_id: request.user_id.clone(),
                rooms: HashSet::new(),
                sender: frames,
                last_pong: Instant::now(),
            },
        );

        // Standing rooms every connection gets.
        self.join(&conn, rooms::GLOBAL);
        self.join(&conn, &rooms::user(&request.user_id));
        if let Some(role_room) = rooms::for_role(request.role) {
            self.join(&conn, role_room);
        }
        if let Some(school) = &request.school_code {
            self.join(&conn, &rooms::school(school));
        }

        // Couriers also hear their prefix and its wider truncations, so an
        // area-scope task announcement reaches the exact-point courier.
        if let Some(prefix) = request.courier_prefix {
            self.join(&conn, &rooms::prefix(&prefix));
            for len in [4usize, 2] {
                if prefix.len() > len {
                    if let Ok(shorter) = prefix.truncate(len) {
                        self.join(&conn, &rooms::prefix(&shorter));
                    }
                }
            }
        }

        info!(conn = %conn, user = %request.user_id, "Connection registered");
        conn
    }

    fn join(&mut self, conn: &ConnectionId, room: &str) {
        let Some(state) = self.connections.get_mut(conn) else {
            return;
        };
        state.rooms.insert(room.to_string());
        let room_state = self.room_entry(room);
        room_state.members.insert(conn.clone());
        room_state.emptied_at = None;
        debug!(conn = %conn, room, "Joined room");
    }

    fn leave(&mut self, conn: &ConnectionId, room: &str) {
        if let Some(state) = self.connections.get_mut(conn) {
            state.rooms.remove(room);
        }
        if let Some(room_state) = self.rooms.get_mut(room) {
            room_state.members.remove(conn);
            if room_state.members.is_empty() {
                room_state.emptied_at = Some(Instant::now());
            }
        }
    }

    fn broadcast(&mut self, room: &str, event_type: EventType, data: Value) {
        let history_capacity = self.config.history_capacity;
        let room_state = self
            .rooms
            .entry(room.to_string())
            .or_insert_with(|| RoomState {
                members: HashSet::new(),
                history: RoomHistory::with_capacity(history_capacity),
                emptied_at: Some(Instant::now()),
            });
        let frame = room_state.history.append(room, event_type, data);
        let members: Vec<ConnectionId> = room_state.members.iter().cloned().collect();

        let mut slow: Vec<ConnectionId> = Vec::new();
        for member in members {
            let Some(state) = self.connections.get(&member) else {
                continue;
            };
            match state.sender.try_send(frame.clone()) {
                Ok(()) => {}
                Err(mpsc::error::TrySendError::Full(_)) => {
                    warn!(conn = %member, room, "Send buffer full, dropping connection");
                    slow.push(member);
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    slow.push(member);
                }
            }
        }
        for conn in slow {
            self.close(&conn, CloseReason::SlowConsumer);
        }
    }

    fn replay(&mut self, conn: &ConnectionId, room: &str, from_seq: u64) {
        let Some(room_state) = self.rooms.get(room) else {
            return;
        };
        let frames = room_state.history.replay_after(from_seq);
        let Some(sender) = self.connections.get(conn).map(|s| s.sender.clone()) else {
            return;
        };
        for frame in frames {
            if sender.try_send(frame).is_err() {
                let conn = conn.clone();
                self.close(&conn, CloseReason::SlowConsumer);
                return;
            }
        }
    }

    fn tick(&mut self) {
        // Heartbeats, and stale-pong eviction.
        let now = Instant::now();
        let heartbeat = WsFrame::direct(EventType::Heartbeat, serde_json::json!({}));
        let mut stale: Vec<ConnectionId> = Vec::new();
        let mut slow: Vec<ConnectionId> = Vec::new();
        for (conn, state) in &self.connections {
            if now.duration_since(state.last_pong) > self.config.pong_timeout {
                stale.push(conn.clone());
                continue;
            }
            if matches!(
                state.sender.try_send(heartbeat.clone()),
                Err(mpsc::error::TrySendError::Full(_))
            ) {
                slow.push(conn.clone());
            }
        }
        for conn in stale {
            self.close(&conn, CloseReason::StalePong);
        }
        for conn in slow {
            self.close(&conn, CloseReason::SlowConsumer);
        }

        // Room garbage collection.
        let gc = self.config.room_gc;
        self.rooms.retain(|room, state| {
            let dead = state.members.is_empty()
                && state
                    .emptied_at
                    .is_some_and(|at| now.duration_since(at) > gc);
            if dead {
                debug!(room, "Room garbage-collected");
            }
            !dead
        });
    }

    fn close(&mut self, conn: &ConnectionId, reason: CloseReason) {
        let Some(state) = self.connections.remove(conn) else {
            return;
        };
        // Best-effort closing frame; a full buffer just misses it.
        let _ = state.sender.try_send(WsFrame::direct(
            EventType::Error,
            serde_json::json!({ "reason": reason.as_str() }),
        ));
        for room in state.rooms {
            if let Some(room_state) = self.rooms.get_mut(&room) {
                room_state.members.remove(conn);
                if room_state.members.is_empty() {
                    room_state.emptied_at = Some(Instant::now());
                }
            }
        }
        info!(conn = %conn, reason = reason.as_str(), user = %state.user_id, "Connection closed");
    }

    fn room_entry(&mut self, room: &str) -> &mut RoomState {
        let history_capacity = self.config.history_capacity;
        self.rooms
            .entry(room.to_string())
            .or_insert_with(|| RoomState {
                members: HashSet::new(),
                history: RoomHistory::with_capacity(history_capacity),
                emptied_at: None,
            })
    }
}

#[cfg(test)]
mod tests;
