//! Interval-based admission gate for new order submissions.

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// Caps how many new orders may be submitted per interval.
///
/// Lock-free: the window rolls over lazily inside `consume_at`, and a
/// CAS on the window start decides which caller performs the reset.
#[derive(Debug)]
pub struct ActionBudget {
    /// Submission slots per window.
    max_orders: u32,
    /// Slots taken in the current window.
    used: AtomicU32,
    /// Start of the current window (Unix milliseconds).
    window_start_ms: AtomicU64,
    /// Window length in milliseconds.
    interval_ms: u64,
}

impl ActionBudget {
    #[must_use]
    pub fn new(max_orders: u32, interval_ms: u64) -> Self {
        Self {
            max_orders,
            used: AtomicU32::new(0),
            window_start_ms: AtomicU64::new(0),
            interval_ms,
        }
    }

    /// Take one submission slot, or report the window as spent.
    pub fn consume(&self) -> bool {
        let now_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);
        self.consume_at(now_ms)
    }

    /// Take one slot against the supplied clock reading.
    ///
    /// When the window has lapsed, the caller that swaps in the new start
    /// time also claims its first slot; losing callers observe the swap
    /// and retry against the refreshed counters.
    pub fn consume_at(&self, now_ms: u64) -> bool {
        loop {
            let started = self.window_start_ms.load(Ordering::Acquire);
            let used = self.used.load(Ordering::Acquire);

            if now_ms.saturating_sub(started) > self.interval_ms {
                if self
                    .window_start_ms
                    .compare_exchange_weak(started, now_ms, Ordering::AcqRel, Ordering::Acquire)
                    .is_ok()
                {
                    self.used.store(1, Ordering::Release);
                    return true;
                }
                continue;
            }

            if used >= self.max_orders {
                return false;
            }
            if self
                .used
                .compare_exchange_weak(used, used + 1, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                return true;
            }
        }
    }

    /// Slots left in the current window.
    #[must_use]
    pub fn remaining(&self) -> u32 {
        self.max_orders
            .saturating_sub(self.used.load(Ordering::Acquire))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_budget_exhausts_within_interval() {
        let budget = ActionBudget::new(3, 1000);
        assert!(budget.consume_at(10_000));
        assert!(budget.consume_at(10_100));
        assert!(budget.consume_at(10_200));
        assert!(!budget.consume_at(10_300));
        assert_eq!(budget.remaining(), 0);
    }

    #[test]
    fn test_budget_resets_after_interval() {
        let budget = ActionBudget::new(1, 1000);
        assert!(budget.consume_at(10_000));
        assert!(!budget.consume_at(10_500));
        // Next interval
        assert!(budget.consume_at(11_500));
    }
}
