//! Wall-clock source with a system and a settable implementation

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};

/// Source of "now" for expiry and scheduling decisions
pub trait Clock: Send + Sync {
    fn utc_now(&self) -> DateTime<Utc>;

    /// Milliseconds since the UNIX epoch; 0 for instants before it
    fn millis_since_epoch(&self) -> u64 {
        u64::try_from(self.utc_now().timestamp_millis()).unwrap_or(0)
    }
}

pub type SharedClock = Arc<dyn Clock>;

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn utc_now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

impl<T: Clock + ?Sized> Clock for Arc<T> {
    fn utc_now(&self) -> DateTime<Utc> {
        (**self).utc_now()
    }
}

/// Clock that only moves when told to
///
/// Clones share one timeline, so a clock handed to a component can be
/// advanced from the test body.
///
/// ```
/// use std::time::Duration;
///
/// use myinvois_common::time::{Clock, MockClock};
///
/// let clock = MockClock::new();
/// let start = clock.utc_now();
/// clock.advance(Duration::from_secs(5));
/// assert_eq!((clock.utc_now() - start).num_seconds(), 5);
/// ```
#[derive(Debug, Clone)]
pub struct MockClock {
    origin: DateTime<Utc>,
    offset: Arc<Mutex<Duration>>,
}

impl MockClock {
    /// Frozen at the current real time
    pub fn new() -> Self {
        Self::starting_at(Utc::now())
    }

    pub fn starting_at(origin: DateTime<Utc>) -> Self {
        Self { origin, offset: Arc::new(Mutex::new(Duration::ZERO)) }
    }

    pub fn advance(&self, by: Duration) {
        *self.offset.lock().unwrap_or_else(PoisonError::into_inner) += by;
    }

    /// Jump to `origin + offset`
    pub fn set_elapsed(&self, offset: Duration) {
        *self.offset.lock().unwrap_or_else(PoisonError::into_inner) = offset;
    }

    #[must_use]
    pub fn elapsed(&self) -> Duration {
        *self.offset.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for MockClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MockClock {
    fn utc_now(&self) -> DateTime<Utc> {
        let offset = chrono::Duration::from_std(self.elapsed()).unwrap_or(chrono::Duration::MAX);
        self.origin.checked_add_signed(offset).unwrap_or(DateTime::<Utc>::MAX_UTC)
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    #[test]
    fn system_clock_tracks_real_time() {
        let before = Utc::now();
        let now = SystemClock.utc_now();
        assert!(now >= before);
        assert!(SystemClock.millis_since_epoch() > 1_700_000_000_000);
    }

    #[test]
    fn mock_clock_stands_still_until_advanced() {
        let start = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        let clock = MockClock::starting_at(start);
        assert_eq!(clock.utc_now(), start);
        assert_eq!(clock.millis_since_epoch(), start.timestamp_millis() as u64);

        clock.advance(Duration::from_secs(30));
        clock.advance(Duration::from_secs(60));
        assert_eq!(clock.utc_now(), start + chrono::Duration::seconds(90));

        clock.set_elapsed(Duration::from_secs(10));
        assert_eq!(clock.utc_now(), start + chrono::Duration::seconds(10));
    }

    #[test]
    fn clones_share_a_timeline() {
        let original = MockClock::new();
        let copy = original.clone();

        original.advance(Duration::from_secs(15));
        assert_eq!(copy.elapsed(), Duration::from_secs(15));
        assert_eq!(copy.utc_now(), original.utc_now());
    }

    #[test]
    fn shared_handle_delegates() {
        let mock = MockClock::new();
        let shared: SharedClock = Arc::new(mock.clone());
        let before = shared.utc_now();
        mock.advance(Duration::from_secs(60));
        assert_eq!((shared.utc_now() - before).num_seconds(), 60);
    }
}
