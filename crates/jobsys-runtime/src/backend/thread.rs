//! Thread backend: regular workers plus elastic helpers
//!
//! Helper workers sleep on their own condvar until a thread that is about
//! to block in `wait_for_job` kicks one. A kicked helper runs the regular
//! pull loop until the `HelperGuard` returned by the kick is dropped.

use super::pool::{PoolShared, WorkerPool};
use super::{Backend, JobRunner};
use crate::config::SchedulerConfig;
use crate::profiler::BackendProfiler;
use crate::tls;
use jobsys_core::descriptor::JobDescriptor;
use jobsys_core::error::JobResult;
use jobsys_core::id::{BackendKind, WorkerId};
use jobsys_core::kdebug;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

/// Park timeout of an active helper, bounds how long a stop goes unseen
const HELPER_PARK: Duration = Duration::from_millis(1);

struct Helper {
    /// Held by a `HelperGuard`
    claimed: AtomicBool,
    /// Running the pull loop
    active: AtomicBool,
    lock: Mutex<()>,
    cond: Condvar,
}

impl Helper {
    fn new() -> Self {
        Self {
            claimed: AtomicBool::new(false),
            active: AtomicBool::new(false),
            lock: Mutex::new(()),
            cond: Condvar::new(),
        }
    }

    #[inline]
    fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    fn notify(&self) {
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
        self.cond.notify_all();
    }

    /// Sleep until kicked or shut down; true if kicked
    fn wait_for_kick(&self, shared: &PoolShared) -> bool {
        let mut guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
        while !self.is_active() && !shared.is_shutdown() {
            guard = self.cond.wait(guard).unwrap_or_else(|e| e.into_inner());
        }
        self.is_active()
    }
}

/// Keeps one helper worker running; stops it on drop
pub struct HelperGuard<'a> {
    helper: &'a Helper,
}

impl Drop for HelperGuard<'_> {
    fn drop(&mut self) {
        self.helper.active.store(false, Ordering::Release);
        self.helper.claimed.store(false, Ordering::Release);
    }
}

fn helper_main_loop(shared: &PoolShared, helper: &Helper, id: WorkerId) {
    tls::set_worker_id(Some(id));
    kdebug!("helper started");

    'outer: while helper.wait_for_kick(shared) {
        let mut idle_spins: u32 = 0;
        while helper.is_active() {
            if let Some(desc) = shared.next_job() {
                idle_spins = 0;
                shared.execute(&desc, id);
                continue;
            }
            if shared.is_shutdown() {
                if shared.is_drained() {
                    break 'outer;
                }
                shared.spin_once();
                continue;
            }
            if idle_spins < shared.idle_spins {
                idle_spins += 1;
                shared.spin_once();
            } else {
                shared
                    .parking
                    .park_if(Some(HELPER_PARK), &|| helper.is_active() && shared.should_sleep());
            }
        }
    }

    kdebug!("helper exiting");
    tls::set_worker_id(None);
}

/// Regular worker pool with helper workers
pub struct ThreadBackend {
    pool: WorkerPool,
    helpers: Vec<Arc<Helper>>,
}

impl ThreadBackend {
    pub fn new(config: &SchedulerConfig, num_workers: usize, runner: Arc<JobRunner>) -> Self {
        let num_helpers = config.num_helper_workers;
        Self {
            pool: WorkerPool::new(
                BackendKind::Thread,
                config,
                num_workers,
                num_workers + num_helpers,
                runner,
            ),
            helpers: (0..num_helpers).map(|_| Arc::new(Helper::new())).collect(),
        }
    }

    /// Spawn regular workers, then helpers numbered after them
    pub fn start(&self) -> JobResult<()> {
        self.pool.start()?;
        let base = self.pool.num_workers();
        for (i, helper) in self.helpers.iter().enumerate() {
            let helper = Arc::clone(helper);
            let id = WorkerId::new(BackendKind::Thread, (base + i) as u16);
            self.pool.spawn(format!("jobsys-helper-{}", i), move |shared| {
                helper_main_loop(&shared, &helper, id)
            })?;
        }
        Ok(())
    }

    /// Wake an idle helper worker
    ///
    /// `None` when every helper is already kicked, there are none, or the
    /// backend is shutting down.
    pub fn kick_helper(&self) -> Option<HelperGuard<'_>> {
        if self.pool.is_shutdown() {
            return None;
        }
        let helper = self.helpers.iter().find(|h| {
            h.claimed
                .compare_exchange(false, true, Ordering::AcqRel, Ordering::Relaxed)
                .is_ok()
        })?;
        helper.active.store(true, Ordering::Release);
        helper.notify();
        Some(HelperGuard { helper })
    }

    /// Helpers currently running the pull loop
    pub fn active_helpers(&self) -> usize {
        self.helpers.iter().filter(|h| h.is_active()).count()
    }

    pub fn num_helpers(&self) -> usize {
        self.helpers.len()
    }

    pub fn pool(&self) -> &WorkerPool {
        &self.pool
    }
}

impl Backend for ThreadBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Thread
    }

    fn submit(&self, desc: JobDescriptor) {
        self.pool.submit(desc);
    }

    fn shutdown(&self) {
        if self.pool.signal_shutdown() {
            for helper in &self.helpers {
                helper.notify();
            }
            self.pool.join();
        }
    }

    fn profiler(&self) -> Option<&BackendProfiler> {
        Some(self.pool.profiler())
    }

    fn pending(&self) -> usize {
        self.pool.pending()
    }

    fn executed(&self) -> u64 {
        self.pool.executed()
    }
}

impl Drop for ThreadBackend {
    fn drop(&mut self) {
        Backend::shutdown(self);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jobsys_core::completion::CompletionPool;
    use jobsys_core::descriptor::JobParams;
    use jobsys_core::id::JobTypeId;
    use jobsys_core::state::Priority;
    use std::sync::atomic::AtomicUsize;
    use std::thread;

    static HELPER_RUNS: AtomicUsize = AtomicUsize::new(0);

    fn note_helper(_: &JobParams) {
        if let Some(id) = tls::current_worker_id() {
            if id.index >= 1 {
                HELPER_RUNS.fetch_add(1, Ordering::SeqCst);
            }
        }
        thread::sleep(Duration::from_millis(1));
    }

    fn backend(workers: usize, helpers: usize) -> ThreadBackend {
        let config = SchedulerConfig::new().num_helper_workers(helpers);
        let runner = Arc::new(JobRunner::new(Arc::new(CompletionPool::new(8)), None));
        ThreadBackend::new(&config, workers, runner)
    }

    #[test]
    fn test_kick_claims_distinct_helpers() {
        let b = backend(1, 2);
        b.start().unwrap();
        let g1 = b.kick_helper().unwrap();
        let g2 = b.kick_helper().unwrap();
        assert!(b.kick_helper().is_none());
        assert_eq!(b.active_helpers(), 2);
        drop(g1);
        assert_eq!(b.active_helpers(), 1);
        assert!(b.kick_helper().is_some());
        drop(g2);
        b.shutdown();
        assert!(b.kick_helper().is_none());
    }

    #[test]
    fn test_kicked_helper_pulls_jobs() {
        let b = backend(1, 1);
        b.start().unwrap();
        let guard = b.kick_helper().unwrap();
        for _ in 0..200 {
            b.submit(JobDescriptor::new(note_helper, JobTypeId::new(0), Priority::Regular, JobParams::empty()));
        }
        b.shutdown();
        drop(guard);
        assert_eq!(b.executed(), 200);
        assert!(HELPER_RUNS.load(Ordering::SeqCst) > 0);
    }

    #[test]
    fn test_no_helpers() {
        let b = backend(1, 0);
        b.start().unwrap();
        assert!(b.kick_helper().is_none());
        b.shutdown();
    }
}
