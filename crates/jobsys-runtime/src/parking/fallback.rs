//! Fallback parking using std::sync::Condvar
//!
//! Used on platforms without futex support.
//! Less efficient but portable.

use super::WorkerParking;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Condvar, Mutex};
use std::time::Duration;

/// Condvar-based parking (fallback)
pub struct FallbackParking {
    /// Wake sequence
    mutex: Mutex<u64>,

    condvar: Condvar,

    /// Count of parked workers
    parked: AtomicUsize,
}

impl FallbackParking {
    pub fn new() -> Self {
        Self {
            mutex: Mutex::new(0),
            condvar: Condvar::new(),
            parked: AtomicUsize::new(0),
        }
    }

    fn bump(&self) {
        let mut guard = self.mutex.lock().unwrap_or_else(|e| e.into_inner());
        *guard = guard.wrapping_add(1);
    }
}

impl Default for FallbackParking {
    fn default() -> Self {
        Self::new()
    }
}

impl WorkerParking for FallbackParking {
    fn park_if(&self, timeout: Option<Duration>, should_sleep: &dyn Fn() -> bool) -> bool {
        let mut guard = self.mutex.lock().unwrap_or_else(|e| e.into_inner());
        let seq = *guard;
        self.parked.fetch_add(1, Ordering::SeqCst);

        if !should_sleep() {
            self.parked.fetch_sub(1, Ordering::SeqCst);
            return true;
        }

        let woken = match timeout {
            Some(t) => {
                let (g, result) = self
                    .condvar
                    .wait_timeout_while(guard, t, |s| *s == seq)
                    .unwrap_or_else(|e| e.into_inner());
                guard = g;
                !result.timed_out()
            }
            None => {
                guard = self
                    .condvar
                    .wait_while(guard, |s| *s == seq)
                    .unwrap_or_else(|e| e.into_inner());
                true
            }
        };
        drop(guard);

        self.parked.fetch_sub(1, Ordering::SeqCst);
        woken
    }

    fn wake_one(&self) {
        if self.parked.load(Ordering::SeqCst) == 0 {
            return;
        }
        self.bump();
        self.condvar.notify_one();
    }

    fn wake_all(&self) {
        if self.parked.load(Ordering::SeqCst) == 0 {
            return;
        }
        self.bump();
        self.condvar.notify_all();
    }

    fn parked_count(&self) -> usize {
        self.parked.load(Ordering::Relaxed)
    }
}
