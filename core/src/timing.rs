//! Process-monotonic clock.

use std::time::Instant;

use lazy_static::lazy_static;

lazy_static! {
    static ref CLOCK_BASE: Instant = Instant::now();
}

/// Monotonic nanoseconds since the process clock base.
///
/// All record timestamps come from this clock, so records from the same
/// drainer are totally ordered in time.
#[inline]
pub(crate) fn mono_ns() -> u64 {
    CLOCK_BASE.elapsed().as_nanos() as u64
}
