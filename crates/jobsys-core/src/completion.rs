//! Pooled completion signals
//!
//! A fixed array of reusable signals. Each slot carries an owner token
//! (0 = free), a reference count, a pending-job count, and a condvar for
//! waiters. Acquisition scans round-robin and claims a free slot with a
//! single CAS on the owner token; there is no pool-wide lock.
//!
//! Lifecycle of one use:
//!
//! ```text
//! acquire(owner)          owner set, refs = 1
//!   set_running(1)        pending += 1     (per submitted job)
//!   add_ref(owner)        refs += 1        (the job's own reference)
//!   ... job runs ...
//!   set_stopped()         pending -= 1, wakes waiters at 0
//!   release(owner)        refs -= 1        (job drops its reference)
//! release(owner)          refs -> 0, slot free again
//! ```

use crate::error::{JobError, JobResult};
use crate::id::SignalHandle;
use crate::kerror;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::{Condvar, Mutex};

/// Owner tokens are unique across every pool in the process
static NEXT_OWNER: AtomicUsize = AtomicUsize::new(1);

/// Full passes over the pool before acquisition gives up
pub const MAX_ACQUIRE_ROUNDS: usize = 10;

/// One completion signal
#[repr(align(64))]
struct Signal {
    owner: AtomicUsize,
    refs: AtomicU32,
    pending: AtomicU32,
    lock: Mutex<()>,
    cond: Condvar,
}

impl Signal {
    fn new() -> Self {
        Self {
            owner: AtomicUsize::new(0),
            refs: AtomicU32::new(0),
            pending: AtomicU32::new(0),
            lock: Mutex::new(()),
            cond: Condvar::new(),
        }
    }
}

/// Fixed-size pool of completion signals
pub struct CompletionPool {
    signals: Box<[Signal]>,
    next: AtomicUsize,
}

impl CompletionPool {
    /// Create a pool; size is clamped to what a `SignalHandle` can address
    pub fn new(size: usize) -> Self {
        let size = size.clamp(1, u16::MAX as usize - 1);
        Self {
            signals: (0..size).map(|_| Signal::new()).collect(),
            next: AtomicUsize::new(0),
        }
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.signals.len()
    }

    /// Fresh non-zero owner token, never handed out by any other pool
    #[inline]
    pub fn new_owner_token(&self) -> usize {
        NEXT_OWNER.fetch_add(1, Ordering::Relaxed)
    }

    /// Claim a free signal for `owner`
    ///
    /// Returns `SignalPoolExhausted` if every slot stayed owned for
    /// `MAX_ACQUIRE_ROUNDS` full passes. Signals are expected back promptly,
    /// so this indicates a leak or an undersized pool.
    pub fn acquire(&self, owner: usize) -> JobResult<SignalHandle> {
        debug_assert!(owner != 0, "owner token 0 marks a free slot");
        let len = self.signals.len();

        for round in 0..MAX_ACQUIRE_ROUNDS {
            for _ in 0..len {
                let idx = self.next.fetch_add(1, Ordering::Relaxed) % len;
                let signal = &self.signals[idx];
                if signal.owner.load(Ordering::Relaxed) != 0 {
                    continue;
                }
                if signal
                    .owner
                    .compare_exchange(0, owner, Ordering::Acquire, Ordering::Relaxed)
                    .is_ok()
                {
                    signal.pending.store(0, Ordering::Relaxed);
                    signal.refs.store(1, Ordering::Release);
                    return Ok(SignalHandle::new(idx as u16));
                }
            }
            if round + 1 < MAX_ACQUIRE_ROUNDS {
                std::thread::yield_now();
            }
        }

        kerror!(
            "completion pool exhausted: {} signals all owned after {} passes",
            len,
            MAX_ACQUIRE_ROUNDS
        );
        Err(JobError::SignalPoolExhausted)
    }

    fn owned(&self, handle: SignalHandle, owner: usize) -> JobResult<&Signal> {
        let signal = self.signals.get(handle.as_usize()).ok_or(JobError::InvalidSignal)?;
        if signal.owner.load(Ordering::Acquire) != owner {
            return Err(JobError::InvalidSignal);
        }
        Ok(signal)
    }

    /// Add a reference held by another job or waiter
    pub fn add_ref(&self, handle: SignalHandle, owner: usize) -> JobResult<()> {
        let signal = self.owned(handle, owner)?;
        signal.refs.fetch_add(1, Ordering::AcqRel);
        Ok(())
    }

    /// Drop a reference; the slot returns to the pool at zero
    pub fn release(&self, handle: SignalHandle, owner: usize) -> JobResult<()> {
        let signal = self.owned(handle, owner)?;
        if signal.refs.fetch_sub(1, Ordering::AcqRel) == 1 {
            signal.owner.store(0, Ordering::Release);
        }
        Ok(())
    }

    /// Mark `count` more jobs as pending on this signal
    pub fn set_running(&self, handle: SignalHandle, count: u32) {
        if let Some(signal) = self.signals.get(handle.as_usize()) {
            signal.pending.fetch_add(count, Ordering::AcqRel);
        }
    }

    /// One pending job finished; wakes waiters when none remain
    pub fn set_stopped(&self, handle: SignalHandle) {
        let Some(signal) = self.signals.get(handle.as_usize()) else {
            return;
        };
        let prev = signal.pending.fetch_sub(1, Ordering::AcqRel);
        debug_assert!(prev > 0, "set_stopped without matching set_running");
        if prev == 1 {
            let _guard = signal.lock.lock().unwrap_or_else(|e| e.into_inner());
            signal.cond.notify_all();
        }
    }

    /// Cheap check: is any job on this signal still pending?
    #[inline]
    pub fn needs_to_wait(&self, handle: SignalHandle) -> bool {
        self.signals
            .get(handle.as_usize())
            .map(|s| s.pending.load(Ordering::Acquire) != 0)
            .unwrap_or(false)
    }

    /// Block until no job on this signal is pending
    pub fn wait(&self, handle: SignalHandle) {
        let Some(signal) = self.signals.get(handle.as_usize()) else {
            return;
        };
        let mut guard = signal.lock.lock().unwrap_or_else(|e| e.into_inner());
        while signal.pending.load(Ordering::Acquire) != 0 {
            guard = signal.cond.wait(guard).unwrap_or_else(|e| e.into_inner());
        }
    }

    /// Number of signals currently owned (diagnostics)
    pub fn in_use(&self) -> usize {
        self.signals
            .iter()
            .filter(|s| s.owner.load(Ordering::Relaxed) != 0)
            .count()
    }
}
