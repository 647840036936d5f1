//! Per-room event history.
//!
//! A bounded ring of the most recent frames plus the room's monotonic
//! sequence counter. New subscribers replay from their last seen sequence;
//! anything older than the ring is gone by design.

use crate::protocol::{EventType, WsFrame};
use crate::HISTORY_CAPACITY;
use chrono::Utc;
use std::collections::VecDeque;
use uuid::Uuid;

/// Ring buffer of a room's recent frames.
#[derive(Debug)]
pub struct RoomHistory {
    ring: VecDeque<WsFrame>,
    capacity: usize,
    next_seq: u64,
}

impl RoomHistory {
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(HISTORY_CAPACITY)
    }

    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            ring: VecDeque::with_capacity(capacity.min(64)),
            capacity: capacity.max(1),
            next_seq: 1,
        }
    }

    /// Stamp a new frame for this room and retain it.
    pub fn append(
        &mut self,
        room: &str,
        event_type: EventType,
        data: serde_json::Value,
    ) -> WsFrame {
        let frame = WsFrame {
            id: Uuid::new_v4().to_string(),
            event_type,
            room: Some(room.to_string()),
            data,
            timestamp: Utc::now(),
            seq: Some(self.next_seq),
        };
        self.next_seq += 1;
        if self.ring.len() == self.capacity {
            self.ring.pop_front();
        }
        self.ring.push_back(frame.clone());
        frame
    }

    /// Frames with `seq > from_seq`, oldest first.
    #[must_use]
    pub fn replay_after(&self, from_seq: u64) -> Vec<WsFrame> {
        self.ring
            .iter()
            .filter(|f| f.seq.is_some_and(|s| s > from_seq))
            .cloned()
            .collect()
    }

    /// The sequence the next frame will carry.
    #[must_use]
    pub fn next_seq(&self) -> u64 {
        self.next_seq
    }

    /// Retained frame count.
    #[must_use]
    pub fn len(&self) -> usize {
        self.ring.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ring.is_empty()
    }
}

impl Default for RoomHistory {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn data(n: u64) -> serde_json::Value {
        serde_json::json!({ "n": n })
    }

    #[test]
    fn test_sequences_are_monotonic_from_one() {
        let mut history = RoomHistory::new();
        for expected in 1..=5 {
            let frame = history.append("r", EventType::SystemMessage, data(expected));
            assert_eq!(frame.seq, Some(expected));
        }
    }

    #[test]
    fn test_ring_evicts_but_sequence_continues() {
        let mut history = RoomHistory::with_capacity(3);
        for n in 1..=5 {
            history.append("r", EventType::SystemMessage, data(n));
        }
        assert_eq!(history.len(), 3);
        // Oldest retained frame is seq 3.
        let all = history.replay_after(0);
        assert_eq!(all.first().and_then(|f| f.seq), Some(3));
        assert_eq!(history.next_seq(), 6);
    }

    #[test]
    fn test_replay_after() {
        let mut history = RoomHistory::new();
        for n in 1..=10 {
            history.append("r", EventType::LetterStatusUpdate, data(n));
        }
        let tail = history.replay_after(7);
        let seqs: Vec<u64> = tail.iter().filter_map(|f| f.seq).collect();
        assert_eq!(seqs, vec![8, 9, 10]);

        assert!(history.replay_after(10).is_empty());
    }
}
