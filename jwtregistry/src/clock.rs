//! Time source abstraction for signing and validation.
//!
//! Every time-based claim (`iat`, `exp`, `nbf`) is computed or checked
//! against a `Clock`. Production code uses the real system clock; tests pin
//! the clock to a fixed instant so that issued tokens and validation
//! outcomes are deterministic.

use std::fmt::Debug;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Abstraction over "what time is it now".
///
/// Implementations must be shareable across threads since a registered
/// context's clock is read concurrently by every signer and validator.
pub trait Clock: Send + Sync + Debug {
    /// The current instant.
    fn now(&self) -> SystemTime;
}

/// Real time source using the system clock.
///
/// This is the default clock for every registered context.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> SystemTime {
        SystemTime::now()
    }
}

/// A clock pinned to a caller-supplied number of seconds since the Unix epoch.
///
/// The value `0` means "unset" and falls back to the system clock, so a
/// default-constructed `FixedClock` behaves like `SystemClock`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FixedClock {
    /// Seconds since the Unix epoch; `0` is the unset sentinel.
    pub now_time: i64,
}

impl FixedClock {
    /// Create a clock that always reports `epoch_seconds`.
    #[must_use]
    pub const fn new(epoch_seconds: i64) -> Self {
        Self {
            now_time: epoch_seconds,
        }
    }
}

impl Clock for FixedClock {
    fn now(&self) -> SystemTime {
        if self.now_time == 0 {
            return SystemTime::now();
        }
        from_unix_seconds(self.now_time)
    }
}

/// Convert an instant to whole seconds since the Unix epoch.
///
/// Sub-second precision is truncated. Instants before the epoch yield
/// negative values.
#[must_use]
pub fn unix_seconds(time: SystemTime) -> i64 {
    match time.duration_since(UNIX_EPOCH) {
        Ok(elapsed) => i64::try_from(elapsed.as_secs()).unwrap_or(i64::MAX),
        Err(before) => i64::try_from(before.duration().as_secs()).map_or(i64::MIN, |s| -s),
    }
}

/// Convert whole seconds since the Unix epoch to an instant.
///
/// Values outside the platform's representable range saturate at the
/// latest (or earliest) representable whole second.
#[must_use]
pub fn from_unix_seconds(seconds: i64) -> SystemTime {
    let offset = |secs: u64| {
        let magnitude = Duration::from_secs(secs);
        if seconds >= 0 {
            UNIX_EPOCH.checked_add(magnitude)
        } else {
            UNIX_EPOCH.checked_sub(magnitude)
        }
    };
    let requested = seconds.unsigned_abs();
    if let Some(time) = offset(requested) {
        return time;
    }

    // Largest representable offset in the requested direction.
    let (mut low, mut high) = (0, requested);
    while low < high {
        let mid = low + (high - low).div_ceil(2);
        if offset(mid).is_some() {
            low = mid;
        } else {
            high = mid - 1;
        }
    }
    offset(low).unwrap_or(UNIX_EPOCH)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_system_clock() {
        let clock = SystemClock;
        let t1 = unix_seconds(clock.now());
        let t2 = unix_seconds(clock.now());

        // Time should be reasonable (after 2020)
        assert!(t1 > 1_577_836_800); // 2020-01-01 00:00:00 UTC

        // Time should not go backwards
        assert!(t2 >= t1);
    }

    #[test]
    fn test_fixed_clock_locked_to_50() {
        let clock = FixedClock::new(50);
        assert_eq!(unix_seconds(clock.now()), 50);
        assert_eq!(clock.now(), UNIX_EPOCH + Duration::from_secs(50));
    }

    #[test]
    fn test_fixed_clock_zero_falls_back_to_system_time() {
        let clock = FixedClock::default();
        let expected = unix_seconds(SystemTime::now());
        let got = unix_seconds(clock.now());

        assert!(
            (got - expected).abs() <= 1,
            "FixedClock::default().now() = {got}, want about {expected}"
        );
    }

    #[test]
    fn test_fixed_clock_before_epoch() {
        let clock = FixedClock::new(-30);
        assert_eq!(unix_seconds(clock.now()), -30);
    }

    #[test]
    fn test_unix_seconds_truncates() {
        let time = UNIX_EPOCH + Duration::from_millis(1_111_999);
        assert_eq!(unix_seconds(time), 1111);
    }

    #[test]
    fn test_from_unix_seconds_matches_unix_seconds() {
        for seconds in [1, 1111, 1171, 10_000, -5] {
            assert_eq!(unix_seconds(from_unix_seconds(seconds)), seconds);
        }
    }

    #[test]
    fn test_from_unix_seconds_saturates() {
        // 2100-01-01 00:00:00 UTC
        let far_future = from_unix_seconds(4_102_444_800);
        assert!(from_unix_seconds(i64::MAX) >= far_future);
        assert!(unix_seconds(from_unix_seconds(i64::MAX)) >= 4_102_444_800);

        assert!(from_unix_seconds(i64::MIN) < UNIX_EPOCH);
        assert!(unix_seconds(from_unix_seconds(i64::MIN)) < 0);
    }

    #[test]
    fn test_fixed_clock_far_future() {
        let clock = FixedClock::new(i64::MAX);
        assert!(unix_seconds(clock.now()) > unix_seconds(SystemTime::now()));
    }

    #[test]
    fn test_clock_as_trait_object() {
        let clocks: Vec<Box<dyn Clock>> = vec![Box::new(FixedClock::new(2222)), Box::new(SystemClock)];
        assert_eq!(unix_seconds(clocks[0].now()), 2222);
        assert!(unix_seconds(clocks[1].now()) > 2222);
    }
}
