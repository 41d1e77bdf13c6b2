//! Time utilities for castsync
//!
//! The start scheduler and latency probe work in microseconds: round-trip
//! measurement uses the monotonic clock, while the connect-master exchange
//! carries wall-clock epoch microseconds between nodes.

use std::ops::{Add, Sub};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

/// Monotonic timestamp in microseconds
///
/// Wraps [`Instant`] and provides microsecond conversions for latency
/// measurement and countdown arithmetic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Timestamp(Instant);

impl Timestamp {
    /// Get the current timestamp
    #[inline]
    pub fn now() -> Self {
        Timestamp(Instant::now())
    }

    /// Get the underlying instant
    #[inline]
    pub fn as_instant(&self) -> Instant {
        self.0
    }

    /// Calculate duration since another timestamp
    #[inline]
    pub fn duration_since(&self, earlier: Timestamp) -> Duration {
        self.0.duration_since(earlier.0)
    }

    /// Calculate elapsed time since this timestamp
    #[inline]
    pub fn elapsed(&self) -> Duration {
        self.0.elapsed()
    }

    /// Microseconds elapsed since a reference timestamp
    pub fn as_micros_since(&self, reference: Timestamp) -> u64 {
        self.0
            .duration_since(reference.0)
            .as_micros()
            .try_into()
            .unwrap_or(u64::MAX)
    }
}

impl Add<Duration> for Timestamp {
    type Output = Timestamp;

    fn add(self, duration: Duration) -> Timestamp {
        Timestamp(self.0 + duration)
    }
}

impl Sub<Duration> for Timestamp {
    type Output = Timestamp;

    fn sub(self, duration: Duration) -> Timestamp {
        Timestamp(self.0 - duration)
    }
}

impl Sub for Timestamp {
    type Output = Duration;

    fn sub(self, other: Timestamp) -> Duration {
        self.0.duration_since(other.0)
    }
}

/// Wall-clock time in microseconds since the Unix epoch
///
/// The connect-master exchange sends this value between nodes. It is only
/// ever compared against zero (the refusal sentinel) on the remote side;
/// the latency math itself stays on the local monotonic clock.
pub fn epoch_micros() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_micros() as i64)
        .unwrap_or(0)
}
