use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

/// Time source for the control stack.
///
/// `now()` is monotonic and drives every local timer: poll intervals,
/// throttle windows, TTL sweeps. `epoch_ms()` is wall-clock milliseconds
/// since the Unix epoch, read only at message boundaries where a timestamp
/// travels on the wire and must be comparable against the peer's clock.
pub trait Clock {
    fn now(&self) -> Instant;
    fn epoch_ms(&self) -> f64;
}

/// Real-time clock: `Instant::now` plus `SystemTime` for wire timestamps.
#[derive(Debug, Default, Clone, Copy)]
pub struct MonotonicClock;

impl MonotonicClock {
    #[inline]
    pub fn new() -> Self {
        Self
    }
}

impl Clock for MonotonicClock {
    #[inline]
    fn now(&self) -> Instant {
        Instant::now()
    }

    #[inline]
    fn epoch_ms(&self) -> f64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs_f64() * 1000.0)
            .unwrap_or(0.0)
    }
}

pub mod test_clock {
    use super::*;

    /// Manually advanced clock for deterministic timing tests.
    ///
    /// Both time coordinates move together: `now()` is the construction
    /// instant plus the advanced total, `epoch_ms()` is the configured epoch
    /// base plus the same total. Clones share the advanced total, so a clone
    /// handed to a component under test can be driven from the test body.
    /// Two instances with different epoch bases model two machines whose
    /// wall clocks disagree.
    #[derive(Debug, Clone)]
    pub struct TestClock {
        origin: Instant,
        epoch_base_ms: f64,
        elapsed_ns: Arc<AtomicU64>,
    }

    impl Default for TestClock {
        fn default() -> Self {
            Self::new()
        }
    }

    impl TestClock {
        /// Epoch base 0; suits tests that never read wall time.
        pub fn new() -> Self {
            Self::with_epoch_ms(0.0)
        }

        /// Start the wall clock at the given epoch milliseconds.
        pub fn with_epoch_ms(epoch_base_ms: f64) -> Self {
            Self {
                origin: Instant::now(),
                epoch_base_ms,
                elapsed_ns: Arc::new(AtomicU64::new(0)),
            }
        }

        /// Advance both time coordinates by `d`.
        pub fn advance(&self, d: Duration) {
            self.elapsed_ns
                .fetch_add(d.as_nanos() as u64, Ordering::Relaxed);
        }

        /// Advance both time coordinates by whole milliseconds.
        pub fn advance_ms(&self, ms: u64) {
            self.advance(Duration::from_millis(ms));
        }

        fn elapsed(&self) -> Duration {
            Duration::from_nanos(self.elapsed_ns.load(Ordering::Relaxed))
        }
    }

    impl Clock for TestClock {
        fn now(&self) -> Instant {
            self.origin + self.elapsed()
        }

        fn epoch_ms(&self) -> f64 {
            self.epoch_base_ms + self.elapsed().as_secs_f64() * 1000.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::test_clock::TestClock;
    use super::*;

    #[test]
    fn both_time_coordinates_advance_together() {
        let clock = TestClock::with_epoch_ms(10_000.0);
        let start = clock.now();
        clock.advance_ms(250);
        assert_eq!(clock.now() - start, Duration::from_millis(250));
        assert!((clock.epoch_ms() - 10_250.0).abs() < 1e-9);
    }

    #[test]
    fn clones_share_advanced_time() {
        let clock = TestClock::new();
        let other = clock.clone();
        other.advance_ms(40);
        assert!((clock.epoch_ms() - 40.0).abs() < 1e-9);
    }

    #[test]
    fn fractional_advances_accumulate() {
        let clock = TestClock::new();
        clock.advance(Duration::from_micros(1_500));
        clock.advance(Duration::from_micros(500));
        assert!((clock.epoch_ms() - 2.0).abs() < 1e-9);
    }
}
