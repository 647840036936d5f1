//! Retry backoff with jitter.

use crate::{BACKOFF_BASE_SECS, BACKOFF_CAP_SECS, BACKOFF_FACTOR};
use rand::Rng;

/// Delay before retry number `attempt` (1-based), in seconds.
///
/// Exponential growth capped at [`BACKOFF_CAP_SECS`], then jittered to
/// 50–150% so synchronized failures do not retry in lockstep.
#[must_use]
pub fn retry_delay_secs<R: Rng>(attempt: u32, rng: &mut R) -> u64 {
    let exp = attempt.saturating_sub(1).min(31);
    let raw = BACKOFF_BASE_SECS.saturating_mul(u64::from(BACKOFF_FACTOR).saturating_pow(exp));
    let capped = raw.min(BACKOFF_CAP_SECS);
    // Jitter in [capped/2, capped*3/2], floor 1 second.
    let low = (capped / 2).max(1);
    let high = capped.saturating_mul(3) / 2;
    rng.gen_range(low..=high.max(low))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_grows_then_caps() {
        let mut rng = StdRng::seed_from_u64(1);
        // With jitter bounds: attempt 1 is ~1s, attempt 20 is capped around 5 min.
        let first = retry_delay_secs(1, &mut rng);
        assert!((1..=2).contains(&first), "got {first}");

        let late = retry_delay_secs(20, &mut rng);
        assert!(late >= BACKOFF_CAP_SECS / 2);
        assert!(late <= BACKOFF_CAP_SECS * 3 / 2);
    }

    #[test]
    fn test_never_zero() {
        let mut rng = StdRng::seed_from_u64(2);
        for attempt in 0..10 {
            assert!(retry_delay_secs(attempt, &mut rng) >= 1);
        }
    }

    #[test]
    fn test_jitter_varies() {
        let mut rng = StdRng::seed_from_u64(3);
        let samples: Vec<u64> = (0..32).map(|_| retry_delay_secs(8, &mut rng)).collect();
        let all_same = samples.windows(2).all(|w| w[0] == w[1]);
        assert!(!all_same, "jitter produced identical delays: {samples:?}");
    }
}
