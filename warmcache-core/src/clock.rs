//! Monotonic time source.
//!
//! Every deadline in the engines is a [`tokio::time::Instant`], so only
//! elapsed-time comparisons matter and a paused Tokio clock drives tests.
//! Configuration arrives in milliseconds and is converted exactly once here.

use std::time::Duration;

pub use tokio::time::Instant;

/// Current monotonic time.
#[inline]
pub fn now() -> Instant {
    Instant::now()
}

/// Converts a millisecond setting, clamping negatives to zero.
pub fn millis(ms: i64) -> Duration {
    Duration::from_millis(ms.max(0) as u64)
}

/// Converts a millisecond setting where zero or negative means "unset".
pub fn positive_millis(ms: i64) -> Option<Duration> {
    (ms > 0).then(|| Duration::from_millis(ms as u64))
}
