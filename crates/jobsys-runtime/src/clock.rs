//! Monotonic timestamps for profiling samples

use std::sync::OnceLock;
use std::time::Instant;

static START_INSTANT: OnceLock<Instant> = OnceLock::new();

/// Pin the clock origin; called at scheduler init
pub fn init_time() {
    let _ = START_INSTANT.get_or_init(Instant::now);
}

/// Nanoseconds since the clock origin
#[inline]
pub fn now_ns() -> u64 {
    START_INSTANT
        .get_or_init(Instant::now)
        .elapsed()
        .as_nanos() as u64
}
