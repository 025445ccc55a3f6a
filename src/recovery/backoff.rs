//! Exponential backoff with a cap.

use std::time::Duration;

/// `min(max_delay, base * 2^prior_attempts)`, saturating on overflow.
///
/// Non-decreasing in `prior_attempts` and never exceeds `max_delay`.
pub fn backoff_delay(base: Duration, max_delay: Duration, prior_attempts: u32) -> Duration {
    let factor = 1u32.checked_shl(prior_attempts).unwrap_or(u32::MAX);
    base.checked_mul(factor).unwrap_or(max_delay).min(max_delay)
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASE: Duration = Duration::from_secs(1);
    const MAX: Duration = Duration::from_secs(60);

    #[test]
    fn doubles_per_attempt() {
        assert_eq!(backoff_delay(BASE, MAX, 0), Duration::from_secs(1));
        assert_eq!(backoff_delay(BASE, MAX, 1), Duration::from_secs(2));
        assert_eq!(backoff_delay(BASE, MAX, 2), Duration::from_secs(4));
        assert_eq!(backoff_delay(BASE, MAX, 5), Duration::from_secs(32));
    }

    #[test]
    fn caps_at_max() {
        assert_eq!(backoff_delay(BASE, MAX, 6), MAX);
        assert_eq!(backoff_delay(BASE, MAX, 20), MAX);
        assert_eq!(backoff_delay(BASE, MAX, u32::MAX), MAX);
    }

    #[test]
    fn monotonically_non_decreasing() {
        let mut prev = Duration::ZERO;
        for attempt in 0..80 {
            let delay = backoff_delay(BASE, MAX, attempt);
            assert!(delay >= prev, "attempt {attempt}: {delay:?} < {prev:?}");
            assert!(delay <= MAX);
            prev = delay;
        }
    }

    #[test]
    fn larger_base_for_rate_limits() {
        let rate_base = Duration::from_secs(5);
        assert_eq!(backoff_delay(rate_base, MAX, 0), Duration::from_secs(5));
        assert_eq!(backoff_delay(rate_base, MAX, 3), Duration::from_secs(40));
        assert_eq!(backoff_delay(rate_base, MAX, 4), MAX);
    }
}
