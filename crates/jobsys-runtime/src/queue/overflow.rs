//! Overflow queue: unbounded spill-over for jobs that found no ring slot
//!
//! Heap-allocated copies of descriptors, drained by workers before the
//! ring so their added latency stays bounded. This breaks strict priority
//! order for the spilled subset.

use crossbeam_queue::SegQueue;
use jobsys_core::descriptor::JobDescriptor;

/// Lock-free unbounded queue of boxed descriptors
pub struct OverflowQueue {
    jobs: SegQueue<Box<JobDescriptor>>,
}

impl OverflowQueue {
    pub fn new() -> Self {
        Self { jobs: SegQueue::new() }
    }

    #[inline]
    pub fn push(&self, desc: JobDescriptor) {
        self.jobs.push(Box::new(desc));
    }

    #[inline]
    pub fn pop(&self) -> Option<JobDescriptor> {
        self.jobs.pop().map(|boxed| *boxed)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }
}

impl Default for OverflowQueue {
    fn default() -> Self {
        Self::new()
    }
}
