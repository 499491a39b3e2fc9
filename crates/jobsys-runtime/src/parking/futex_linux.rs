//! Linux futex-based worker parking
//!
//! Uses the futex syscall for efficient sleep/wake with minimal overhead.
//!
//! Futex word semantics: a wake sequence number.
//!
//! When a worker parks:
//! 1. Read the sequence
//! 2. Increment parked count, re-check for work
//! 3. FUTEX_WAIT while the word still equals the value read in step 1
//! 4. Decrement parked count on return
//!
//! When waking:
//! 1. Bump the sequence (a parker between steps 1 and 3 will not sleep)
//! 2. FUTEX_WAKE if anyone is parked

use super::WorkerParking;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::time::Duration;

/// Linux futex-based parking
pub struct FutexParking {
    /// Futex word: wake sequence
    futex: AtomicU32,

    /// Count of parked workers
    parked: AtomicUsize,
}

impl FutexParking {
    pub fn new() -> Self {
        Self {
            futex: AtomicU32::new(0),
            parked: AtomicUsize::new(0),
        }
    }

    fn wake(&self, count: i32) {
        self.futex.fetch_add(1, Ordering::SeqCst);
        if self.parked.load(Ordering::SeqCst) == 0 {
            return;
        }
        unsafe {
            libc::syscall(
                libc::SYS_futex,
                self.futex.as_ptr(),
                libc::FUTEX_WAKE | libc::FUTEX_PRIVATE_FLAG,
                count,
                std::ptr::null::<libc::timespec>(),
                std::ptr::null::<u32>(),
                0u32,
            );
        }
    }
}

impl Default for FutexParking {
    fn default() -> Self {
        Self::new()
    }
}

impl WorkerParking for FutexParking {
    fn park_if(&self, timeout: Option<Duration>, should_sleep: &dyn Fn() -> bool) -> bool {
        let seq = self.futex.load(Ordering::SeqCst);
        self.parked.fetch_add(1, Ordering::SeqCst);

        if !should_sleep() {
            self.parked.fetch_sub(1, Ordering::SeqCst);
            return true;
        }

        let timespec = timeout.map(|d| libc::timespec {
            tv_sec: d.as_secs() as libc::time_t,
            tv_nsec: d.subsec_nanos() as libc::c_long,
        });
        let timespec_ptr = match &timespec {
            Some(ts) => ts as *const libc::timespec,
            None => std::ptr::null(),
        };

        // FUTEX_WAIT: sleep only if the sequence has not moved
        let result = unsafe {
            libc::syscall(
                libc::SYS_futex,
                self.futex.as_ptr(),
                libc::FUTEX_WAIT | libc::FUTEX_PRIVATE_FLAG,
                seq,
                timespec_ptr,
                std::ptr::null::<u32>(),
                0u32,
            )
        };

        self.parked.fetch_sub(1, Ordering::SeqCst);

        if result == 0 {
            true
        } else {
            // EAGAIN: sequence moved before we slept, a wake happened
            let errno = unsafe { *libc::__errno_location() };
            errno == libc::EAGAIN
        }
    }

    fn wake_one(&self) {
        self.wake(1);
    }

    fn wake_all(&self) {
        self.wake(i32::MAX);
    }

    fn parked_count(&self) -> usize {
        self.parked.load(Ordering::Relaxed)
    }
}
