//! Exponential backoff for per-call retries.

use rand::Rng;
use std::time::Duration;

/// Capped exponential backoff with jitter.
///
/// Per-call retry delays, distinct from the relay's reconnect backoff:
/// the executor retries are bounded and short because the caller is
/// waiting on the result.
#[derive(Debug)]
pub struct ExponentialBackoff {
    base_delay_ms: u64,
    max_delay_ms: u64,
    attempt: u32,
}

impl ExponentialBackoff {
    pub fn new(base_delay_ms: u64, max_delay_ms: u64) -> Self {
        Self {
            base_delay_ms,
            max_delay_ms,
            attempt: 0,
        }
    }

    /// Delay before the next retry: `base * 2^n`, capped, plus jitter up
    /// to half the base.
    pub fn next_delay(&mut self) -> Duration {
        let exponent = self.attempt.min(10);
        self.attempt += 1;

        let delay = self
            .base_delay_ms
            .saturating_mul(1u64 << exponent)
            .min(self.max_delay_ms);
        let jitter = rand::thread_rng().gen_range(0..=self.base_delay_ms / 2);
        Duration::from_millis(delay + jitter)
    }

    pub fn attempts(&self) -> u32 {
        self.attempt
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delays_double_then_cap() {
        let mut backoff = ExponentialBackoff::new(100, 500);
        let jitter_max = 50;

        let d1 = backoff.next_delay().as_millis() as u64;
        assert!((100..=100 + jitter_max).contains(&d1));

        let d2 = backoff.next_delay().as_millis() as u64;
        assert!((200..=200 + jitter_max).contains(&d2));

        let d3 = backoff.next_delay().as_millis() as u64;
        assert!((400..=400 + jitter_max).contains(&d3));

        // Capped at max
        let d4 = backoff.next_delay().as_millis() as u64;
        assert!((500..=500 + jitter_max).contains(&d4));

        assert_eq!(backoff.attempts(), 4);
    }
}
