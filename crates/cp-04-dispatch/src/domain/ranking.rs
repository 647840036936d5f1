//! Candidate selection and ranking.
//!
//! Level selection prefers the lowest tier that covers the delivery code:
//! an exact L1 assignment beats an area L2, which beats L3, which beats the
//! school-wide L4. Within a level, couriers are ranked by fewest active
//! tasks, then highest performance score, then earliest last assignment.

use crate::ports::outbound::Candidate;
use chrono::{DateTime, Utc};

/// A candidate joined with its current workload.
#[derive(Debug, Clone)]
pub struct RankedCandidate {
    pub candidate: Candidate,
    pub active_tasks: usize,
}

/// Pick the preferred level: the lowest rank present among `candidates`.
#[must_use]
pub fn preferred_level(candidates: &[Candidate]) -> Option<u8> {
    candidates.iter().map(|c| c.level_rank).min()
}

/// Rank candidates of one level. `workloads` pairs each candidate with its
/// active task count, in the same order.
#[must_use]
pub fn rank(mut joined: Vec<RankedCandidate>) -> Vec<RankedCandidate> {
    joined.sort_by(|a, b| {
        a.active_tasks
            .cmp(&b.active_tasks)
            .then_with(|| b.candidate.score.cmp(&a.candidate.score))
            .then_with(|| {
                earliest(a.candidate.last_assignment_at).cmp(&earliest(b.candidate.last_assignment_at))
            })
            // Deterministic tie-breaker.
            .then_with(|| a.candidate.courier_id.cmp(&b.candidate.courier_id))
    });
    joined
}

/// Never-assigned couriers sort before any assigned one.
fn earliest(at: Option<DateTime<Utc>>) -> DateTime<Utc> {
    at.unwrap_or(DateTime::<Utc>::MIN_UTC)
}

#[cfg(test)]
mod tests {
    use super::*;
    use cp_01_opcode::OpCodePrefix;
    use shared_types::CourierId;

    fn candidate(id: &str, level: u8, score: i64, last: Option<DateTime<Utc>>) -> Candidate {
        Candidate {
            courier_id: CourierId::from(id),
            level_rank: level,
            managed_prefix: OpCodePrefix::parse("PK5F").unwrap(),
            score,
            last_assignment_at: last,
        }
    }

    #[test]
    fn test_preferred_level_is_lowest_rank() {
        let candidates = vec![
            candidate("a", 4, 0, None),
            candidate("b", 2, 0, None),
            candidate("c", 3, 0, None),
        ];
        assert_eq!(preferred_level(&candidates), Some(2));
        assert_eq!(preferred_level(&[]), None);
    }

    #[test]
    fn test_fewest_active_tasks_first() {
        let ranked = rank(vec![
            RankedCandidate {
                candidate: candidate("busy", 1, 100, None),
                active_tasks: 5,
            },
            RankedCandidate {
                candidate: candidate("idle", 1, 0, None),
                active_tasks: 0,
            },
        ]);
        assert_eq!(ranked[0].candidate.courier_id.as_str(), "idle");
    }

    #[test]
    fn test_score_breaks_workload_ties() {
        let ranked = rank(vec![
            RankedCandidate {
                candidate: candidate("low", 1, 10, None),
                active_tasks: 1,
            },
            RankedCandidate {
                candidate: candidate("high", 1, 90, None),
                active_tasks: 1,
            },
        ]);
        assert_eq!(ranked[0].candidate.courier_id.as_str(), "high");
    }

    #[test]
    fn test_earliest_assignment_breaks_score_ties() {
        let now = Utc::now();
        let ranked = rank(vec![
            RankedCandidate {
                candidate: candidate("recent", 1, 50, Some(now)),
                active_tasks: 1,
            },
            RankedCandidate {
                candidate: candidate("stale", 1, 50, Some(now - chrono::Duration::hours(4))),
                active_tasks: 1,
            },
            RankedCandidate {
                candidate: candidate("never", 1, 50, None),
                active_tasks: 1,
            },
        ]);
        assert_eq!(ranked[0].candidate.courier_id.as_str(), "never");
        assert_eq!(ranked[1].candidate.courier_id.as_str(), "stale");
    }
}
