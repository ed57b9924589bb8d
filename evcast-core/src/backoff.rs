//! Spin-then-yield backoff helpers.
//!
//! Used wherever the pipeline retries a compare-and-swap or polls a
//! predicate: buffer acquisition under memory pressure, stage shutdown
//! waits, and settling a stage that is mid-transition.

use std::time::Duration;

/// Blocking backoff for dedicated threads.
///
/// Spins with exponential growth for the first few steps, then yields the
/// thread, then sleeps for short intervals.
#[derive(Debug, Default)]
pub struct SpinBackoff {
    step: u32,
}

impl SpinBackoff {
    const SPIN_LIMIT: u32 = 6;
    const YIELD_LIMIT: u32 = 10;

    pub const fn new() -> Self {
        Self { step: 0 }
    }

    /// Perform the next backoff step.
    pub fn snooze(&mut self) {
        if self.step < Self::SPIN_LIMIT {
            for _ in 0..(1 << self.step) {
                std::hint::spin_loop();
            }
        } else if self.step < Self::YIELD_LIMIT {
            std::thread::yield_now();
        } else {
            std::thread::sleep(Duration::from_micros(200));
        }
        self.step = self.step.saturating_add(1);
    }

    /// Whether the backoff has escalated past pure spinning.
    #[inline]
    pub const fn is_yielding(&self) -> bool {
        self.step >= Self::SPIN_LIMIT
    }

    pub fn reset(&mut self) {
        self.step = 0;
    }
}

/// Adaptive backoff that starts with CPU spins before yielding to the runtime.
#[derive(Debug, Default)]
pub struct AdaptiveYield {
    spins: u32,
}

impl AdaptiveYield {
    pub const fn new() -> Self {
        Self { spins: 0 }
    }

    /// Perform the next backoff step.
    ///
    /// Spins with exponential backoff for the first few invocations, then
    /// yields to the async scheduler.
    pub async fn snooze(&mut self) {
        if self.spins < 6 {
            for _ in 0..(1 << self.spins) {
                std::hint::spin_loop();
            }
            self.spins += 1;
        } else {
            tokio::task::yield_now().await;
            self.spins = 0;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spin_backoff_escalates() {
        let mut backoff = SpinBackoff::new();
        for _ in 0..SpinBackoff::SPIN_LIMIT {
            assert!(!backoff.is_yielding());
            backoff.snooze();
        }
        assert!(backoff.is_yielding());
        backoff.reset();
        assert!(!backoff.is_yielding());
    }

    #[tokio::test]
    async fn adaptive_yield_completes() {
        let mut backoff = AdaptiveYield::new();
        for _ in 0..20 {
            backoff.snooze().await;
        }
    }
}
