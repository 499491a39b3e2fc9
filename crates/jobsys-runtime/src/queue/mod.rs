//! Priority job queue
//!
//! One `JobRing` per priority level plus an atomic bitmask of levels that
//! may be non-empty. Consumers always drain the lowest set bit first, so
//! `High` starves the levels below it under sustained load.
//!
//! # Bitmask protocol
//!
//! - Producer: publish into the ring, then set the level's bit.
//! - Consumer: on finding a level empty, clear its bit, then re-check the
//!   ring and set the bit again if an entry slipped in.
//!
//! All bitmask and index operations involved are SeqCst, so a consumer
//! either sees the entry or leaves the bit set for the next pass.
//!
//! # Full rings
//!
//! Non-worker producers that asked to block wait on a per-level "space
//! available" parking instance that consumers signal after each claim.
//! Worker threads never block here; they get `None` and use the overflow
//! queue instead.

mod ring;
mod overflow;

pub use ring::JobRing;
pub use overflow::OverflowQueue;

use crate::parking::{new_parking, WorkerParking};
use jobsys_core::descriptor::JobDescriptor;
use jobsys_core::state::Priority;
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::Duration;

/// Upper bound on one wait for ring space; the loop re-checks after it
const SPACE_WAIT: Duration = Duration::from_millis(10);

/// A reserved ring index, to be filled by `publish`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotTicket {
    pub priority: Priority,
    pub index: u64,
}

/// Fixed-capacity, per-priority job queue
pub struct PriorityJobQueue {
    rings: [JobRing; Priority::COUNT],
    nonempty: AtomicU8,
    space: [Box<dyn WorkerParking>; Priority::COUNT],
}

impl PriorityJobQueue {
    /// Create a queue with the given ring capacity per priority level
    pub fn new(capacity: [usize; Priority::COUNT]) -> Self {
        Self {
            rings: capacity.map(JobRing::new),
            nonempty: AtomicU8::new(0),
            space: std::array::from_fn(|_| new_parking()),
        }
    }

    #[inline]
    pub fn ring(&self, priority: Priority) -> &JobRing {
        &self.rings[priority.as_index()]
    }

    /// Reserve a slot at `priority`
    ///
    /// When the ring is full: with `block_if_full` the caller waits until a
    /// consumer frees a slot; otherwise `None` tells the caller to use the
    /// overflow queue. A zero-capacity ring never blocks.
    pub fn try_acquire_slot(&self, priority: Priority, block_if_full: bool) -> Option<SlotTicket> {
        let ring = self.ring(priority);
        loop {
            if let Some(index) = ring.try_acquire_slot() {
                return Some(SlotTicket { priority, index });
            }
            if !block_if_full || ring.capacity() == 0 {
                return None;
            }
            self.space[priority.as_index()].park_if(Some(SPACE_WAIT), &|| ring.is_full());
        }
    }

    /// Fill a reserved slot and flag its level as non-empty
    pub fn publish(&self, ticket: SlotTicket, desc: JobDescriptor) {
        self.ring(ticket.priority).publish(ticket.index, desc);
        self.nonempty
            .fetch_or(ticket.priority.mask_bit(), Ordering::SeqCst);
    }

    /// Take the next descriptor from the highest non-empty level
    pub fn try_acquire_ready(&self) -> Option<JobDescriptor> {
        loop {
            let mask = self.nonempty.load(Ordering::SeqCst);
            if mask == 0 {
                return None;
            }
            let level = mask.trailing_zeros() as usize;
            let priority = Priority::from_index(level)?;
            let ring = &self.rings[level];

            if let Some(desc) = ring.try_acquire_ready() {
                self.space[level].wake_one();
                return Some(desc);
            }

            self.nonempty.fetch_and(!priority.mask_bit(), Ordering::SeqCst);
            if !ring.is_empty() {
                self.nonempty.fetch_or(priority.mask_bit(), Ordering::SeqCst);
            }
        }
    }

    /// Any level possibly non-empty (cheap hint for idle workers)
    #[inline]
    pub fn has_ready(&self) -> bool {
        self.nonempty.load(Ordering::SeqCst) != 0
    }

    /// Entries across all levels
    pub fn len(&self) -> usize {
        self.rings.iter().map(JobRing::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.rings.iter().all(JobRing::is_empty)
    }

    /// Release every producer waiting for space (shutdown)
    pub fn wake_waiting_producers(&self) {
        for space in &self.space {
            space.wake_all();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jobsys_core::descriptor::JobParams;
    use jobsys_core::id::JobTypeId;
    use std::sync::Arc;
    use std::thread;

    fn noop(_: &JobParams) {}

    fn submit(q: &PriorityJobQueue, priority: Priority, tag: u32, block: bool) -> bool {
        match q.try_acquire_slot(priority, block) {
            Some(t) => {
                q.publish(t, JobDescriptor::new(noop, JobTypeId::new(tag), priority, JobParams::empty()));
                true
            }
            None => false,
        }
    }

    #[test]
    fn test_priority_preference() {
        let q = PriorityJobQueue::new([8; 4]);
        submit(&q, Priority::Stream, 0, false);
        submit(&q, Priority::Regular, 1, false);
        submit(&q, Priority::Regular, 2, false);
        submit(&q, Priority::High, 3, false);

        let order: Vec<u32> = std::iter::from_fn(|| q.try_acquire_ready())
            .map(|d| d.job_type.as_u32())
            .collect();
        assert_eq!(order, vec![3, 1, 2, 0]);
        assert!(!q.has_ready());
    }

    #[test]
    fn test_high_starves_lower_levels() {
        // Strict preference: as long as High keeps refilling, Low never runs.
        let q = PriorityJobQueue::new([4; 4]);
        submit(&q, Priority::Low, 100, false);
        for i in 0..50 {
            submit(&q, Priority::High, i, false);
            let d = q.try_acquire_ready().unwrap();
            assert_eq!(d.priority, Priority::High);
        }
        assert_eq!(q.try_acquire_ready().unwrap().job_type.as_u32(), 100);
    }

    #[test]
    fn test_full_without_blocking_returns_none() {
        let q = PriorityJobQueue::new([2, 0, 2, 2]);
        assert!(submit(&q, Priority::High, 0, false));
        assert!(submit(&q, Priority::High, 1, false));
        assert!(!submit(&q, Priority::High, 2, false));
        // zero capacity never blocks, even when asked to
        assert!(!submit(&q, Priority::Regular, 3, true));
    }

    #[test]
    fn test_blocked_producer_resumes_when_space_frees() {
        let q = Arc::new(PriorityJobQueue::new([1; 4]));
        assert!(submit(&q, Priority::Low, 0, true));

        let q2 = q.clone();
        let producer = thread::spawn(move || submit(&q2, Priority::Low, 1, true));

        thread::sleep(std::time::Duration::from_millis(20));
        assert_eq!(q.try_acquire_ready().unwrap().job_type.as_u32(), 0);
        assert!(producer.join().unwrap());
        assert_eq!(q.try_acquire_ready().unwrap().job_type.as_u32(), 1);
    }
}
