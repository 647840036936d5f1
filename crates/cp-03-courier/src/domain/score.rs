//! Performance scoring.
//!
//! The exact weighting is pluggable; dispatch ranking and promotion both go
//! through the [`PerformanceScore`] trait so deployments can tune it without
//! touching hierarchy logic.

use super::entities::PerformanceCounters;

/// Computes a courier's performance score from raw counters.
pub trait PerformanceScore: Send + Sync {
    /// Higher is better. Negative scores are possible.
    fn score(&self, counters: &PerformanceCounters) -> i64;

    /// Minimum score required to be promoted out of the given level rank.
    fn promotion_threshold(&self, from_level_rank: u8) -> i64;
}

/// Default weighting: a failure costs two deliveries.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultScore;

impl DefaultScore {
    /// Deliveries required (net of failures) to leave L1.
    pub const L1_THRESHOLD: i64 = 50;
    /// Net deliveries to leave L2.
    pub const L2_THRESHOLD: i64 = 200;
    /// Net deliveries to leave L3.
    pub const L3_THRESHOLD: i64 = 500;
}

impl PerformanceScore for DefaultScore {
    fn score(&self, counters: &PerformanceCounters) -> i64 {
        i64::from(counters.delivered) - 2 * i64::from(counters.failed)
    }

    fn promotion_threshold(&self, from_level_rank: u8) -> i64 {
        match from_level_rank {
            1 => Self::L1_THRESHOLD,
            2 => Self::L2_THRESHOLD,
            _ => Self::L3_THRESHOLD,
        }
    }
}
