//! `JobRing` - bounded MPMC ring of job descriptors for one priority level.
//!
//! # Indices
//!
//! `push` and `pull` are u64 monotonically increasing. Slot = index % cap,
//! round = index / cap. Ring is empty when pull == push, full when
//! push - pull >= cap.
//!
//! # Slot protocol
//!
//! Each slot has a stamp `round << 2 | state`:
//!
//! ```text
//! producer of index p (round r)         consumer of index q (round r)
//!   CAS push p -> p+1                     CAS pull q -> q+1
//!   wait stamp == (r, Empty)              wait stamp == (r, Ready)   [Acquire]
//!   store (r, Populating)                 store (r, Draining)
//!   write descriptor                      copy descriptor out
//!   store (r, Ready)         [Release]    store (r+1, Empty)         [Release]
//! ```
//!
//! Claiming an index on `pull` returns one unit of capacity credit. The
//! producer that reuses the slot may briefly wait for the consumer to
//! finish copying out; the round in the stamp keeps it from overwriting
//! a descriptor that has not been drained yet.

use jobsys_core::descriptor::JobDescriptor;
use jobsys_core::state::SlotState;
use std::cell::UnsafeCell;
use std::mem::MaybeUninit;
use std::sync::atomic::{AtomicU64, Ordering};

/// Spins on a slot stamp before yielding the thread
const STAMP_SPINS: u32 = 64;

/// Keeps the hot counters on separate cache lines
#[repr(align(64))]
struct Padded<T>(T);

struct Slot {
    stamp: AtomicU64,
    desc: UnsafeCell<MaybeUninit<JobDescriptor>>,
}

/// Bounded ring for one priority level
pub struct JobRing {
    push: Padded<AtomicU64>,
    pull: Padded<AtomicU64>,
    slots: Box<[Slot]>,
    cap: u64,
}

// Safety: slot contents are only touched by the single producer or the
// single consumer that claimed the slot's index, ordered by the stamp.
unsafe impl Send for JobRing {}
unsafe impl Sync for JobRing {}

impl JobRing {
    /// Create a ring with `cap` slots. A capacity of 0 is allowed: every
    /// acquisition fails and submissions go to the overflow queue.
    pub fn new(cap: usize) -> Self {
        let slots = (0..cap)
            .map(|_| Slot {
                stamp: AtomicU64::new(SlotState::stamp(0, SlotState::Empty)),
                desc: UnsafeCell::new(MaybeUninit::uninit()),
            })
            .collect::<Vec<_>>()
            .into_boxed_slice();
        Self {
            push: Padded(AtomicU64::new(0)),
            pull: Padded(AtomicU64::new(0)),
            slots,
            cap: cap as u64,
        }
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.cap as usize
    }

    /// Entries reserved or ready but not yet claimed by a consumer
    #[inline]
    pub fn len(&self) -> usize {
        let pull = self.pull.0.load(Ordering::SeqCst);
        let push = self.push.0.load(Ordering::SeqCst);
        push.saturating_sub(pull) as usize
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[inline]
    pub fn is_full(&self) -> bool {
        self.len() as u64 >= self.cap
    }

    /// Reserve the next push index, or `None` if the ring is full
    pub fn try_acquire_slot(&self) -> Option<u64> {
        loop {
            let push = self.push.0.load(Ordering::Relaxed);
            let pull = self.pull.0.load(Ordering::Acquire);
            if push.saturating_sub(pull) >= self.cap {
                return None;
            }
            if self
                .push
                .0
                .compare_exchange_weak(push, push + 1, Ordering::SeqCst, Ordering::Relaxed)
                .is_ok()
            {
                return Some(push);
            }
            std::hint::spin_loop();
        }
    }

    /// Write a descriptor into a reserved index and mark it Ready
    pub fn publish(&self, index: u64, desc: JobDescriptor) {
        let slot = &self.slots[(index % self.cap) as usize];
        let round = index / self.cap;

        // The previous round's consumer may still be copying out.
        wait_for_stamp(&slot.stamp, SlotState::stamp(round, SlotState::Empty));
        slot.stamp
            .store(SlotState::stamp(round, SlotState::Populating), Ordering::Relaxed);
        // SAFETY: this thread owns index `index` until it stores Ready
        unsafe {
            (*slot.desc.get()).write(desc);
        }
        slot.stamp
            .store(SlotState::stamp(round, SlotState::Ready), Ordering::Release);
    }

    /// Claim the oldest entry and copy it out, or `None` if empty
    ///
    /// An entry whose index is reserved but not yet published is waited
    /// for; the producer is between its CAS and its Ready store.
    pub fn try_acquire_ready(&self) -> Option<JobDescriptor> {
        let index = loop {
            let pull = self.pull.0.load(Ordering::Relaxed);
            let push = self.push.0.load(Ordering::Acquire);
            if pull >= push {
                return None;
            }
            if self
                .pull
                .0
                .compare_exchange_weak(pull, pull + 1, Ordering::SeqCst, Ordering::Relaxed)
                .is_ok()
            {
                break pull;
            }
            std::hint::spin_loop();
        };

        let slot = &self.slots[(index % self.cap) as usize];
        let round = index / self.cap;

        wait_for_stamp(&slot.stamp, SlotState::stamp(round, SlotState::Ready));
        slot.stamp
            .store(SlotState::stamp(round, SlotState::Draining), Ordering::Relaxed);
        // SAFETY: Ready was observed with Acquire, the descriptor is fully written
        let desc = unsafe { (*slot.desc.get()).assume_init_read() };
        slot.stamp
            .store(SlotState::stamp(round + 1, SlotState::Empty), Ordering::Release);
        Some(desc)
    }
}

#[inline]
fn wait_for_stamp(stamp: &AtomicU64, expected: u64) {
    let mut spins = 0u32;
    while stamp.load(Ordering::Acquire) != expected {
        if spins < STAMP_SPINS {
            spins += 1;
            std::hint::spin_loop();
        } else {
            std::thread::yield_now();
        }
    }
}
