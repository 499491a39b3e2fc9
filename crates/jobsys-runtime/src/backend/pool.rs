//! Worker pool shared by the thread and blocking backends
//!
//! Each pool owns one `PriorityJobQueue`, one `OverflowQueue`, a parking
//! instance and its worker threads. Workers drain the overflow queue
//! first, then the ring, spin briefly when both are empty and finally
//! park. On shutdown they keep draining until both queues are empty.

use super::JobRunner;
use crate::config::SchedulerConfig;
use crate::parking::{new_parking, WorkerParking};
use crate::profiler::BackendProfiler;
use crate::queue::{OverflowQueue, PriorityJobQueue};
use crate::tls;
use jobsys_core::descriptor::JobDescriptor;
use jobsys_core::error::{JobError, JobResult, WorkerError};
use jobsys_core::id::{BackendKind, WorkerId};
use jobsys_core::{kdebug, kerror};
use std::sync::atomic::{fence, AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Log every this many overflow spills
const OVERFLOW_LOG_EVERY: u64 = 1024;

/// State shared between a pool handle and its worker threads
pub(crate) struct PoolShared {
    pub(crate) kind: BackendKind,
    queue: PriorityJobQueue,
    overflow: OverflowQueue,
    pub(crate) parking: Box<dyn WorkerParking>,
    shutdown: AtomicBool,
    runner: Arc<JobRunner>,
    profiler: BackendProfiler,
    pub(crate) idle_spins: u32,
    park_timeout: Duration,
    block_on_full: bool,
    overflowed: AtomicU64,
    executed: AtomicU64,
    panicked: AtomicU64,
}

impl PoolShared {
    #[inline]
    pub(crate) fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst)
    }

    /// Overflow entries first, then the highest non-empty ring level
    #[inline]
    pub(crate) fn next_job(&self) -> Option<JobDescriptor> {
        self.overflow.pop().or_else(|| self.queue.try_acquire_ready())
    }

    /// Both queues empty, nothing reserved
    pub(crate) fn is_drained(&self) -> bool {
        self.overflow.is_empty() && self.queue.is_empty()
    }

    /// Parking predicate; runs after the worker is counted as parked
    pub(crate) fn should_sleep(&self) -> bool {
        if self.is_shutdown() {
            return false;
        }
        // Pairs with the fence after an overflow push.
        fence(Ordering::SeqCst);
        self.overflow.is_empty() && !self.queue.has_ready()
    }

    pub(crate) fn execute(&self, desc: &JobDescriptor, worker: WorkerId) {
        if self.runner.run(desc, Some(worker), Some(&self.profiler)).is_err() {
            self.panicked.fetch_add(1, Ordering::Relaxed);
            kerror!("job {} panicked", desc.job_type);
        }
        self.executed.fetch_add(1, Ordering::Relaxed);
    }

    /// Short busy wait before the next pull attempt
    #[inline]
    pub(crate) fn spin_once(&self) {
        for _ in 0..32 {
            std::hint::spin_loop();
        }
        thread::yield_now();
    }
}

/// Main loop of a persistent worker
fn worker_main_loop(shared: &PoolShared, id: WorkerId) {
    tls::set_worker_id(Some(id));
    kdebug!("started");

    let mut idle_spins: u32 = 0;
    loop {
        if let Some(desc) = shared.next_job() {
            idle_spins = 0;
            shared.execute(&desc, id);
            continue;
        }

        if shared.is_shutdown() {
            if shared.is_drained() {
                break;
            }
            // A reserved slot is still being published.
            shared.spin_once();
            continue;
        }

        if idle_spins < shared.idle_spins {
            idle_spins += 1;
            shared.spin_once();
        } else {
            shared
                .parking
                .park_if(Some(shared.park_timeout), &|| shared.should_sleep());
            idle_spins = 0;
        }
    }

    kdebug!("exiting");
    tls::set_worker_id(None);
}

/// Queue plus worker threads for one pooled backend
pub struct WorkerPool {
    shared: Arc<PoolShared>,
    num_workers: usize,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl WorkerPool {
    /// Create a pool; no threads run until `start`
    ///
    /// `profiled_workers` sizes the per-worker frame tables and covers
    /// any helper workers spawned on top of the regular ones.
    pub fn new(
        kind: BackendKind,
        config: &SchedulerConfig,
        num_workers: usize,
        profiled_workers: usize,
        runner: Arc<JobRunner>,
    ) -> Self {
        Self {
            shared: Arc::new(PoolShared {
                kind,
                queue: PriorityJobQueue::new(config.queue_capacity),
                overflow: OverflowQueue::new(),
                parking: new_parking(),
                shutdown: AtomicBool::new(false),
                runner,
                profiler: BackendProfiler::new(kind, profiled_workers.max(num_workers)),
                idle_spins: config.idle_spins,
                park_timeout: config.park_timeout,
                block_on_full: config.block_on_full,
                overflowed: AtomicU64::new(0),
                executed: AtomicU64::new(0),
                panicked: AtomicU64::new(0),
            }),
            num_workers,
            handles: Mutex::new(Vec::with_capacity(num_workers)),
        }
    }

    fn lock_handles(&self) -> MutexGuard<'_, Vec<JoinHandle<()>>> {
        self.handles.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Spawn the persistent workers
    pub fn start(&self) -> JobResult<()> {
        for i in 0..self.num_workers {
            let id = WorkerId::new(self.shared.kind, i as u16);
            self.spawn(format!("jobsys-{}-{}", self.shared.kind, i), move |shared| {
                worker_main_loop(&shared, id)
            })?;
        }
        Ok(())
    }

    /// Spawn one thread bound to this pool
    pub(crate) fn spawn<F>(&self, name: String, f: F) -> JobResult<()>
    where
        F: FnOnce(Arc<PoolShared>) + Send + 'static,
    {
        let shared = Arc::clone(&self.shared);
        let handle = thread::Builder::new()
            .name(name.clone())
            .spawn(move || f(shared))
            .map_err(|e| {
                kerror!("failed to spawn {}: {}", name, e);
                JobError::Worker(WorkerError::SpawnFailed)
            })?;
        self.lock_handles().push(handle);
        Ok(())
    }

    /// Enqueue a descriptor
    ///
    /// Non-worker threads block on a full ring when configured to;
    /// worker threads never do and spill into the overflow queue instead.
    pub fn submit(&self, mut desc: JobDescriptor) {
        let shared = &*self.shared;
        if shared.runner.profiling() {
            desc.profile_frame = shared.profiler.current_frame();
        }

        let block = shared.block_on_full && !tls::is_worker_thread();
        match shared.queue.try_acquire_slot(desc.priority, block) {
            Some(ticket) => shared.queue.publish(ticket, desc),
            None => {
                let n = shared.overflowed.fetch_add(1, Ordering::Relaxed);
                if n % OVERFLOW_LOG_EVERY == 0 {
                    kdebug!(
                        "{} {} ring full, job {} to overflow queue ({} spilled)",
                        shared.kind,
                        desc.priority,
                        desc.job_type,
                        n + 1
                    );
                }
                shared.overflow.push(desc);
                fence(Ordering::SeqCst);
            }
        }
        shared.parking.wake_one();
    }

    /// Flag shutdown and wake everyone; false if already flagged
    pub(crate) fn signal_shutdown(&self) -> bool {
        if self.shared.shutdown.swap(true, Ordering::SeqCst) {
            return false;
        }
        self.shared.parking.wake_all();
        self.shared.queue.wake_waiting_producers();
        true
    }

    /// Join every thread spawned so far
    pub(crate) fn join(&self) {
        let handles = std::mem::take(&mut *self.lock_handles());
        for handle in handles {
            if handle.join().is_err() {
                kerror!("{} worker: {}", self.shared.kind, WorkerError::Panicked);
            }
        }
    }

    /// Drain, stop and join the workers; idempotent
    pub fn shutdown(&self) {
        if self.signal_shutdown() {
            self.join();
        }
    }

    #[inline]
    pub fn is_shutdown(&self) -> bool {
        self.shared.is_shutdown()
    }

    #[inline]
    pub fn kind(&self) -> BackendKind {
        self.shared.kind
    }

    #[inline]
    pub fn num_workers(&self) -> usize {
        self.num_workers
    }

    /// Ring entries plus overflow entries not yet picked up
    pub fn pending(&self) -> usize {
        self.shared.queue.len() + self.shared.overflow.len()
    }

    pub fn profiler(&self) -> &BackendProfiler {
        &self.shared.profiler
    }

    pub fn executed(&self) -> u64 {
        self.shared.executed.load(Ordering::Relaxed)
    }

    /// Submissions that found their ring full
    pub fn overflowed(&self) -> u64 {
        self.shared.overflowed.load(Ordering::Relaxed)
    }

    /// Jobs whose body panicked
    pub fn panicked(&self) -> u64 {
        self.shared.panicked.load(Ordering::Relaxed)
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}
