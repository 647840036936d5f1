//! Rolling ETA estimates.
//!
//! Keeps the last N completion durations per `(area prefix, action)` pair
//! and serves their mean as the hint ETA. Purely in-memory; history rebuilds
//! itself after a restart.

use crate::ETA_WINDOW;
use dashmap::DashMap;
use std::collections::VecDeque;

/// Rolling average tracker over completion durations.
pub struct RollingEta {
    window: usize,
    samples: DashMap<(String, &'static str), VecDeque<i64>>,
}

impl RollingEta {
    #[must_use]
    pub fn new() -> Self {
        Self::with_window(ETA_WINDOW)
    }

    #[must_use]
    pub fn with_window(window: usize) -> Self {
        Self {
            window: window.max(1),
            samples: DashMap::new(),
        }
    }

    /// Record a completed transition of `action` within `area`, in seconds.
    pub fn record(&self, area: &str, action: &'static str, secs: i64) {
        let mut entry = self
            .samples
            .entry((area.to_string(), action))
            .or_default();
        if entry.len() == self.window {
            entry.pop_front();
        }
        entry.push_back(secs.max(0));
    }

    /// Mean duration for `(area, action)`, if any history exists.
    #[must_use]
    pub fn estimate(&self, area: &str, action: &'static str) -> Option<i64> {
        let entry = self.samples.get(&(area.to_string(), action))?;
        if entry.is_empty() {
            return None;
        }
        let sum: i64 = entry.iter().sum();
        Some(sum / entry.len() as i64)
    }
}

impl Default for RollingEta {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_has_no_estimate() {
        let eta = RollingEta::new();
        assert_eq!(eta.estimate("PK5F", "deliver"), None);
    }

    #[test]
    fn test_mean_of_samples() {
        let eta = RollingEta::new();
        eta.record("PK5F", "deliver", 100);
        eta.record("PK5F", "deliver", 200);
        eta.record("PK5F", "deliver", 300);
        assert_eq!(eta.estimate("PK5F", "deliver"), Some(200));
    }

    #[test]
    fn test_window_evicts_oldest() {
        let eta = RollingEta::with_window(2);
        eta.record("PK5F", "pickup", 10);
        eta.record("PK5F", "pickup", 20);
        eta.record("PK5F", "pickup", 30);
        // 10 fell out of the window.
        assert_eq!(eta.estimate("PK5F", "pickup"), Some(25));
    }

    #[test]
    fn test_areas_are_independent() {
        let eta = RollingEta::new();
        eta.record("PK5F", "deliver", 100);
        assert_eq!(eta.estimate("QH1A", "deliver"), None);
    }

    #[test]
    fn test_negative_durations_clamped() {
        let eta = RollingEta::new();
        eta.record("PK5F", "deliver", -50);
        assert_eq!(eta.estimate("PK5F", "deliver"), Some(0));
    }
}
