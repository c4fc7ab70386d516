//! Time helpers shared by the monitor and tests.

use std::time::{Duration, SystemTime};

use chrono::{DateTime, Utc};

/// Wall-clock time as a UTC timestamp for persisted rows.
#[inline]
pub fn to_utc(t: SystemTime) -> DateTime<Utc> {
    DateTime::<Utc>::from(t)
}

/// Duration rendered as whole seconds, rounded up, for operator messages.
#[inline]
pub fn ceil_secs(d: Duration) -> u64 {
    d.as_secs() + u64::from(d.subsec_nanos() > 0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ceil_rounds_partial_seconds_up() {
        assert_eq!(ceil_secs(Duration::from_millis(0)), 0);
        assert_eq!(ceil_secs(Duration::from_millis(1000)), 1);
        assert_eq!(ceil_secs(Duration::from_millis(1001)), 2);
    }

    #[test]
    fn epoch_converts() {
        assert_eq!(to_utc(SystemTime::UNIX_EPOCH).timestamp(), 0);
    }
}
