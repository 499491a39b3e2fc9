//! Work availability signal
//!
//! Efficient sleep/wake for idle workers. Platform-specific implementations
//! use the most efficient primitive available.
//!
//! Both implementations are sequence based: a waker bumps a sequence word
//! before waking, and a parker only sleeps while the word still holds the
//! value it read before its final work check. Together with `park_if`
//! re-checking for work *after* registering as parked, a publish that
//! races with a worker going to sleep is never lost.

use std::time::Duration;

/// Platform-specific worker parking mechanism
///
/// Workers call `park_if()` when no work is available.
/// Producers call `wake_one()` after publishing a job, shutdown calls
/// `wake_all()`.
pub trait WorkerParking: Send + Sync {
    /// Park until signaled or timeout, unless `should_sleep` says otherwise
    ///
    /// `should_sleep` runs after the caller is counted as parked. Returning
    /// `false` (work appeared) skips the sleep.
    ///
    /// Returns:
    /// - `true` if woken by signal or work was already available
    /// - `false` if timeout or spurious wakeup
    ///
    /// Workers should re-check for work after returning regardless of return value.
    fn park_if(&self, timeout: Option<Duration>, should_sleep: &dyn Fn() -> bool) -> bool;

    /// Park unconditionally until signaled or timeout
    fn park(&self, timeout: Option<Duration>) -> bool {
        self.park_if(timeout, &|| true)
    }

    /// Wake one parked worker
    ///
    /// If no workers are parked this is a no-op: they are busy and will
    /// find the work on their next pass.
    fn wake_one(&self);

    /// Wake all parked workers
    ///
    /// Used for shutdown.
    fn wake_all(&self);

    /// Number of currently parked workers (hint, may be stale)
    fn parked_count(&self) -> usize;
}

// Platform-specific implementations
cfg_if::cfg_if! {
    if #[cfg(target_os = "linux")] {
        mod futex_linux;
        pub use futex_linux::FutexParking as PlatformParking;
    } else {
        mod fallback;
        pub use fallback::FallbackParking as PlatformParking;
    }
}

/// Create a new platform-appropriate parking instance
pub fn new_parking() -> Box<dyn WorkerParking> {
    Box::new(PlatformParking::new())
}
