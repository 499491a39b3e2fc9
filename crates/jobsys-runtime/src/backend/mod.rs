//! Execution backends
//!
//! A backend is one execution strategy for submitted descriptors:
//!
//! - `ThreadBackend` - regular workers plus parked helper workers
//! - `BlockingBackend` - separate pool for jobs whose body may block
//! - `FallbackBackend` - runs the job on the submitting thread
//!
//! The two pooled backends share `WorkerPool` and its pull/execute loop.
//! All three finish a job through `JobRunner`, so profiling and completion
//! signaling behave the same whichever path ran the job.

mod pool;
mod thread;
mod blocking;
mod fallback;

pub use pool::WorkerPool;
pub use thread::{HelperGuard, ThreadBackend};
pub use blocking::BlockingBackend;
pub use fallback::FallbackBackend;

use crate::clock::now_ns;
use crate::profiler::{BackendProfiler, SampleKind, SampleRing};
use jobsys_core::completion::CompletionPool;
use jobsys_core::descriptor::JobDescriptor;
use jobsys_core::id::{BackendKind, WorkerId};
use jobsys_core::kwarn;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::Result as ThreadResult;

/// One execution strategy
pub trait Backend: Send + Sync {
    fn kind(&self) -> BackendKind;

    /// Hand over a descriptor
    ///
    /// Returns once the descriptor sits in a ring slot or the overflow
    /// queue (pooled backends) or has run (fallback).
    fn submit(&self, desc: JobDescriptor);

    /// Stop workers once queued jobs have drained; idempotent
    fn shutdown(&self);

    /// Frame statistics, for backends that keep them
    fn profiler(&self) -> Option<&BackendProfiler> {
        None
    }

    /// Descriptors accepted but not yet picked up
    fn pending(&self) -> usize {
        0
    }

    /// Jobs run to completion
    fn executed(&self) -> u64;
}

/// Runs job bodies and completes their signals
pub struct JobRunner {
    completions: Arc<CompletionPool>,
    samples: Option<Arc<SampleRing>>,
}

impl JobRunner {
    /// `samples` enables profiling: run samples and frame statistics
    pub fn new(completions: Arc<CompletionPool>, samples: Option<Arc<SampleRing>>) -> Self {
        Self { completions, samples }
    }

    #[inline]
    pub fn completions(&self) -> &Arc<CompletionPool> {
        &self.completions
    }

    #[inline]
    pub fn samples(&self) -> Option<&SampleRing> {
        self.samples.as_deref()
    }

    #[inline]
    pub fn profiling(&self) -> bool {
        self.samples.is_some()
    }

    /// Run one job on the current thread
    ///
    /// The signal is completed even if the body panics; the panic payload
    /// is handed back to the caller.
    pub fn run(
        &self,
        desc: &JobDescriptor,
        worker: Option<WorkerId>,
        profiler: Option<&BackendProfiler>,
    ) -> ThreadResult<()> {
        let start_ns = self.samples.as_ref().map(|_| now_ns());
        let result = panic::catch_unwind(AssertUnwindSafe(|| desc.invoke()));

        if let (Some(start_ns), Some(samples)) = (start_ns, self.samples.as_deref()) {
            let end_ns = now_ns();
            samples.record(desc.job_type, worker, start_ns, end_ns, SampleKind::Run);
            if let (Some(profiler), Some(worker)) = (profiler, worker) {
                let run_us = end_ns.saturating_sub(start_ns) / 1_000;
                profiler.record_job(desc.profile_frame, worker.index, desc.job_type, run_us);
            }
        }

        self.complete(desc);
        result
    }

    /// Mark the job's signal stopped and drop the job's reference to it
    fn complete(&self, desc: &JobDescriptor) {
        if desc.signal.is_none() {
            return;
        }
        self.completions.set_stopped(desc.signal);
        if let Err(e) = self.completions.release(desc.signal, desc.signal_owner) {
            kwarn!("job {} released {:?}: {}", desc.job_type, desc.signal, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jobsys_core::descriptor::JobParams;
    use jobsys_core::id::JobTypeId;
    use jobsys_core::state::Priority;

    fn noop(_: &JobParams) {}

    fn boom(_: &JobParams) {
        panic!("job body failed");
    }

    #[test]
    fn test_run_completes_signal() {
        let pool = Arc::new(CompletionPool::new(4));
        let runner = JobRunner::new(pool.clone(), None);

        let h = pool.acquire(5).unwrap();
        pool.add_ref(h, 5).unwrap();
        pool.set_running(h, 1);
        let desc = JobDescriptor::new(noop, JobTypeId::new(0), Priority::Regular, JobParams::empty())
            .with_signal(h, 5);

        assert!(runner.run(&desc, None, None).is_ok());
        assert!(!pool.needs_to_wait(h));
        pool.release(h, 5).unwrap();
        assert_eq!(pool.in_use(), 0);
    }

    #[test]
    fn test_panicking_job_still_completes() {
        let pool = Arc::new(CompletionPool::new(1));
        let runner = JobRunner::new(pool.clone(), None);
        let h = pool.acquire(1).unwrap();
        pool.add_ref(h, 1).unwrap();
        pool.set_running(h, 1);
        let desc = JobDescriptor::new(boom, JobTypeId::new(0), Priority::High, JobParams::empty())
            .with_signal(h, 1);

        assert!(runner.run(&desc, None, None).is_err());
        assert!(!pool.needs_to_wait(h));
        pool.release(h, 1).unwrap();
    }

    #[test]
    fn test_profiling_records_run_sample() {
        let samples = Arc::new(SampleRing::new(8));
        let runner = JobRunner::new(Arc::new(CompletionPool::new(1)), Some(samples.clone()));
        let profiler = BackendProfiler::new(BackendKind::Thread, 1);
        let worker = WorkerId::new(BackendKind::Thread, 0);

        let mut desc = JobDescriptor::new(noop, JobTypeId::new(3), Priority::Low, JobParams::empty());
        desc.profile_frame = profiler.current_frame();
        runner.run(&desc, Some(worker), Some(&profiler)).unwrap();
        profiler.update(now_ns());

        let snap = samples.snapshot();
        assert_eq!(snap.len(), 1);
        assert_eq!(snap[0].job_type, JobTypeId::new(3));
        assert_eq!(snap[0].worker, Some(worker));
        assert_eq!(snap[0].kind, SampleKind::Run);
        assert_eq!(profiler.frame_stats().total_jobs(), 1);
    }
}
