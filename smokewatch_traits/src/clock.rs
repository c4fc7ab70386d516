use std::thread;
use std::time::{Duration, Instant, SystemTime};

/// Clock abstraction for tick pacing, recompute intervals and row timestamps.
///
/// - now(): monotonic Instant used for every interval decision
/// - wall(): wall-clock time stamped on persisted rows
/// - sleep(): sleeps for the provided duration (implementations may simulate)
pub trait Clock {
    fn now(&self) -> Instant;
    fn sleep(&self, d: Duration);

    fn wall(&self) -> SystemTime {
        SystemTime::now()
    }
}

/// Default, real-time clock backed by std::time.
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
    fn sleep(&self, d: Duration) {
        if d.is_zero() {
            return;
        }
        thread::sleep(d);
    }
}

#[cfg(any(test, feature = "testing"))]
pub mod test_clock {
    use super::*;
    use std::sync::{Arc, Mutex};

    /// Deterministic test clock whose time can be advanced manually.
    ///
    /// now() = origin + offset, wall() = wall_origin + offset.
    /// sleep(d) advances internal time by d without actually sleeping.
    #[derive(Debug, Clone)]
    pub struct TestClock {
        origin: Instant,
        wall_origin: SystemTime,
        offset: Arc<Mutex<Duration>>,
    }

    impl Default for TestClock {
        fn default() -> Self {
            Self::new()
        }
    }

    impl TestClock {
        pub fn new() -> Self {
            Self::starting_at(SystemTime::now())
        }

        /// Pin the wall clock so persisted timestamps are reproducible.
        pub fn starting_at(wall_origin: SystemTime) -> Self {
            Self {
                origin: Instant::now(),
                wall_origin,
                offset: Arc::new(Mutex::new(Duration::ZERO)),
            }
        }

        /// Advance the clock by the given duration.
        pub fn advance(&self, d: Duration) {
            if let Ok(mut off) = self.offset.lock() {
                *off = off.saturating_add(d);
            }
        }

        pub fn elapsed(&self) -> Duration {
            self.offset.lock().map(|g| *g).unwrap_or(Duration::ZERO)
        }
    }

    impl Clock for TestClock {
        fn now(&self) -> Instant {
            self.origin + self.elapsed()
        }

        fn wall(&self) -> SystemTime {
            self.wall_origin + self.elapsed()
        }

        fn sleep(&self, d: Duration) {
            self.advance(d);
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn sleep_advances_both_timelines() {
            let clock = TestClock::starting_at(SystemTime::UNIX_EPOCH);
            let start = clock.now();
            clock.sleep(Duration::from_secs(3));
            assert_eq!(clock.now() - start, Duration::from_secs(3));
            assert_eq!(
                clock.wall(),
                SystemTime::UNIX_EPOCH + Duration::from_secs(3)
            );
        }
    }
}
