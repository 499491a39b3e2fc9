//! Job manager: registration, dispatch and lifecycle
//!
//! `JobManager` is an explicitly constructed context object. It owns the
//! job-type registry, the completion-signal pool, and the three backends.
//!
//! # Dispatch
//!
//! ```text
//! add_job ── disabled / filtered / not running ──▶ FallbackBackend (inline)
//!         ── blocking ──────────────────────────▶ BlockingBackend
//!         ── otherwise ─────────────────────────▶ ThreadBackend
//! ```
//!
//! # Lifecycle
//!
//! `init` spawns the worker pools once. `shutdown` stops routing new jobs
//! to the pools, waits for submissions already on their way in, then
//! stops the thread backend and the blocking backend in that order. Each
//! backend drains its ring and overflow queue before its workers exit.

mod state;

#[cfg(test)]
mod tests;

pub use state::{JobOptions, JobState};

use crate::backend::{Backend, BlockingBackend, FallbackBackend, JobRunner, ThreadBackend};
use crate::clock::{self, now_ns};
use crate::config::SchedulerConfig;
use crate::invoke::{discard_lambda, LambdaPtr};
use crate::profiler::{FrameStats, JobFrameStats, JobSortOrder, Sample, SampleKind, SampleRing};
use crate::registry::{JobHandle, JobRegistry};
use crate::tls;
use jobsys_core::completion::CompletionPool;
use jobsys_core::constants::MAX_WORKERS;
use jobsys_core::descriptor::{Invoker, JobDescriptor, JobParams, FLAG_BLOCKING};
use jobsys_core::error::{JobError, JobResult};
use jobsys_core::id::{BackendKind, JobTypeId};
use jobsys_core::job::Job;
use jobsys_core::{kdebug, kerror, kinfo};
use std::any::TypeId;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, OnceLock};

/// Worker pools, created by `init`
struct Backends {
    thread: ThreadBackend,
    blocking: BlockingBackend,
}

impl Backends {
    fn start(config: &SchedulerConfig, num_workers: usize, runner: &Arc<JobRunner>) -> JobResult<Self> {
        let backends = Self {
            thread: ThreadBackend::new(config, num_workers, Arc::clone(runner)),
            blocking: BlockingBackend::new(config, Arc::clone(runner)),
        };
        if let Err(e) = backends.thread.start().and_then(|_| backends.blocking.start()) {
            backends.shutdown();
            return Err(e);
        }
        Ok(backends)
    }

    fn shutdown(&self) {
        self.thread.shutdown();
        self.blocking.shutdown();
    }

    fn get(&self, kind: BackendKind) -> Option<&dyn Backend> {
        match kind {
            BackendKind::Thread => Some(&self.thread),
            BackendKind::Blocking => Some(&self.blocking),
            BackendKind::Fallback => None,
        }
    }
}

/// Counters across all backends
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SchedulerStats {
    pub thread_executed: u64,
    pub blocking_executed: u64,
    pub fallback_executed: u64,
    /// Submissions that spilled into an overflow queue
    pub overflowed: u64,
    /// Jobs queued but not yet picked up
    pub pending: usize,
    /// Completion signals currently owned
    pub signals_in_use: usize,
}

/// The scheduler
pub struct JobManager {
    config: SchedulerConfig,
    registry: JobRegistry,
    completions: Arc<CompletionPool>,
    samples: Option<Arc<SampleRing>>,
    runner: Arc<JobRunner>,
    fallback: FallbackBackend,
    backends: OnceLock<Backends>,
    init_lock: Mutex<()>,
    enabled: AtomicBool,
    running: AtomicBool,
    /// Submissions between the running check and the enqueue
    in_flight: AtomicUsize,
}

impl JobManager {
    /// Create a manager; no worker runs until `init`
    ///
    /// Jobs submitted before `init` run synchronously.
    pub fn new(config: SchedulerConfig) -> JobResult<Self> {
        config.validate()?;

        let completions = Arc::new(CompletionPool::new(config.completion_pool_size));
        let samples = config
            .profiling
            .then(|| Arc::new(SampleRing::new(config.sample_capacity)));
        let runner = Arc::new(JobRunner::new(Arc::clone(&completions), samples.clone()));

        Ok(Self {
            registry: JobRegistry::new(&config.job_filter),
            fallback: FallbackBackend::new(Arc::clone(&runner)),
            enabled: AtomicBool::new(config.enabled),
            completions,
            samples,
            runner,
            backends: OnceLock::new(),
            init_lock: Mutex::new(()),
            running: AtomicBool::new(false),
            in_flight: AtomicUsize::new(0),
            config,
        })
    }

    /// Create and initialize in one step
    pub fn start(config: SchedulerConfig) -> JobResult<Self> {
        let manager = Self::new(config)?;
        manager.init(None)?;
        Ok(manager)
    }

    /// Spawn the worker pools
    ///
    /// `worker_hint` caps the regular worker count derived from the
    /// configuration and CPU topology. A failed thread spawn stops the
    /// workers already started and fails init.
    pub fn init(&self, worker_hint: Option<usize>) -> JobResult<()> {
        let _guard = self.init_lock.lock().unwrap_or_else(|e| e.into_inner());
        if self.backends.get().is_some() {
            return Err(JobError::AlreadyInitialized);
        }

        clock::init_time();
        let helpers = self.config.num_helper_workers;
        let num_workers = self
            .config
            .resolved_workers(worker_hint)
            .min(MAX_WORKERS.saturating_sub(helpers))
            .max(1);

        let backends = Backends::start(&self.config, num_workers, &self.runner)?;
        kinfo!(
            "job manager started: {} workers + {} helpers, {} blocking workers",
            num_workers,
            helpers,
            self.config.num_blocking_workers
        );

        let _ = self.backends.set(backends);
        self.running.store(true, Ordering::SeqCst);
        Ok(())
    }

    /// Stop and join every worker; a second call is a no-op
    ///
    /// Later submissions run synchronously on the caller.
    pub fn shutdown(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }
        while self.in_flight.load(Ordering::SeqCst) != 0 {
            std::thread::yield_now();
        }
        if let Some(backends) = self.backends.get() {
            backends.shutdown();
        }
        kinfo!("job manager stopped");
    }

    #[inline]
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    // ------------------------------------------------------------------
    // Registry
    // ------------------------------------------------------------------

    /// Look up a byte-parameter job type, registering it on first use
    pub fn get_or_register_job_handle(&self, name: &str, invoker: Invoker) -> JobResult<JobHandle> {
        self.registry.get_or_register(name, invoker)
    }

    /// Register the typed job `J` under `J::NAME`
    pub fn register_typed<J: Job>(&self) -> JobResult<JobHandle> {
        self.registry.register_job::<J>()
    }

    /// Look up without registering
    pub fn lookup_job_handle(&self, name: &str) -> Option<JobHandle> {
        self.registry.lookup(name)
    }

    /// Name a job type was registered under with this invoker
    pub fn job_name(&self, invoker: Invoker) -> Option<String> {
        self.registry.name_of_invoker(invoker)
    }

    /// Log every registered job type
    pub fn dump_job_list(&self) {
        self.registry.dump();
    }

    pub fn registry(&self) -> &JobRegistry {
        &self.registry
    }

    // ------------------------------------------------------------------
    // Submission
    // ------------------------------------------------------------------

    /// Acquire a completion state from the pool
    pub fn acquire_state(&self) -> JobResult<JobState> {
        JobState::acquire(&self.completions)
    }

    /// Submit a byte-parameter job
    ///
    /// Parameters are copied into the descriptor; oversized blocks are
    /// rejected, never truncated.
    pub fn add_job(&self, handle: &JobHandle, params: &[u8], opts: JobOptions<'_>) -> JobResult<()> {
        if handle.job_type().param_type().is_some() {
            return Err(JobError::JobTypeMismatch(handle.name().to_string()));
        }
        let params = JobParams::from_bytes(params).map_err(|e| {
            kerror!("add_job {}: {}", handle.name(), e);
            e
        })?;
        self.dispatch(handle, params, opts)
    }

    /// Submit a typed job through a handle from `register_typed::<J>`
    pub fn add_typed<J: Job>(&self, handle: &JobHandle, job: J, opts: JobOptions<'_>) -> JobResult<()> {
        if handle.job_type().param_type() != Some(TypeId::of::<J>()) {
            return Err(JobError::JobTypeMismatch(handle.name().to_string()));
        }
        let params = JobParams::from_value(&job).map_err(|e| {
            kerror!("add_typed {}: {}", handle.name(), e);
            e
        })?;
        self.dispatch(handle, params, opts)
    }

    /// Register `J` if needed and submit it
    pub fn run_typed<J: Job>(&self, job: J, opts: JobOptions<'_>) -> JobResult<()> {
        let handle = self.register_typed::<J>()?;
        self.add_typed(&handle, job, opts)
    }

    /// Submit a closure under the job type `name`
    pub fn add_lambda<F>(&self, name: &str, f: F, opts: JobOptions<'_>) -> JobResult<()>
    where
        F: FnOnce() + Send + 'static,
    {
        let handle = self.registry.register_lambda(name)?;
        let params = LambdaPtr::pack(f)?;
        self.dispatch(&handle, params, opts).inspect_err(|_| {
            // SAFETY: a failed dispatch never hands the descriptor to a backend
            unsafe { discard_lambda(&params) };
        })
    }

    fn dispatch(&self, handle: &JobHandle, params: JobParams, opts: JobOptions<'_>) -> JobResult<()> {
        let job_type = handle.job_type();
        let mut desc = JobDescriptor::new(job_type.invoker(), job_type.id(), opts.priority, params);

        if let Some(state) = opts.state {
            if !state.belongs_to(&self.completions) {
                return Err(JobError::InvalidSignal);
            }
            self.completions.add_ref(state.handle(), state.owner())?;
            self.completions.set_running(state.handle(), 1);
            desc = desc.with_signal(state.handle(), state.owner());
        }

        if self.enabled.load(Ordering::Relaxed) && !job_type.is_filtered() {
            self.in_flight.fetch_add(1, Ordering::SeqCst);
            if self.running.load(Ordering::SeqCst) {
                if let Some(backends) = self.backends.get() {
                    let target: &dyn Backend = if opts.blocking {
                        desc.flags |= FLAG_BLOCKING;
                        &backends.blocking
                    } else {
                        &backends.thread
                    };
                    job_type.note_submitted(false);
                    target.submit(desc);
                    self.in_flight.fetch_sub(1, Ordering::SeqCst);
                    return Ok(());
                }
            }
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
        }

        job_type.note_submitted(true);
        self.fallback.submit(desc);
        Ok(())
    }

    // ------------------------------------------------------------------
    // Waiting
    // ------------------------------------------------------------------

    /// Register the calling thread as a primary (main/render) thread
    pub fn register_primary_thread(&self) {
        tls::set_primary_thread(true);
        kdebug!("registered primary thread");
    }

    /// Block until every job submitted with `state` has returned
    ///
    /// A primary thread kicks a helper worker for the duration of the
    /// wait when worker boost is on.
    pub fn wait_for_job(&self, state: &JobState) {
        if !state.needs_to_wait() {
            return;
        }

        let start_ns = self.samples.as_ref().map(|_| now_ns());
        let helper = match self.backends.get() {
            Some(b) if self.config.worker_boost && tls::is_primary_thread() => b.thread.kick_helper(),
            _ => None,
        };

        state.wait();
        drop(helper);

        if let (Some(start_ns), Some(samples)) = (start_ns, self.samples.as_deref()) {
            samples.record(
                JobTypeId::NONE,
                tls::current_worker_id(),
                start_ns,
                now_ns(),
                SampleKind::Wait,
            );
        }
    }

    // ------------------------------------------------------------------
    // Switches
    // ------------------------------------------------------------------

    /// Globally enable or disable the worker backends
    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Relaxed);
        kinfo!("job manager {}", if enabled { "enabled" } else { "disabled" });
    }

    #[inline]
    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }

    /// Job names containing any of these substrings run synchronously
    pub fn set_job_filter(&self, filter: &[String]) {
        self.registry.set_filter(filter);
    }

    // ------------------------------------------------------------------
    // Profiling and statistics
    // ------------------------------------------------------------------

    /// Recent run and wait samples, oldest first; empty unless profiling
    pub fn samples(&self) -> Vec<Sample> {
        self.samples
            .as_deref()
            .map(SampleRing::snapshot)
            .unwrap_or_default()
    }

    /// Close the current profiling frame of every pooled backend
    pub fn update_frame(&self) {
        if let Some(backends) = self.backends.get() {
            let now = now_ns();
            backends.thread.pool().profiler().update(now);
            backends.blocking.pool().profiler().update(now);
        }
    }

    /// Per-worker statistics of the last closed frame
    pub fn frame_stats(&self, kind: BackendKind) -> Option<FrameStats> {
        self.backends
            .get()?
            .get(kind)?
            .profiler()
            .map(|p| p.frame_stats())
    }

    /// Per-job-type statistics of the last closed frame
    pub fn job_frame_stats(&self, kind: BackendKind, order: JobSortOrder) -> Vec<JobFrameStats> {
        self.backends
            .get()
            .and_then(|b| b.get(kind))
            .and_then(|b| b.profiler())
            .map(|p| p.job_frame_stats(|id| self.registry.name_of(id), order))
            .unwrap_or_default()
    }

    pub fn stats(&self) -> SchedulerStats {
        let mut stats = SchedulerStats {
            fallback_executed: self.fallback.executed(),
            signals_in_use: self.completions.in_use(),
            ..SchedulerStats::default()
        };
        if let Some(b) = self.backends.get() {
            stats.thread_executed = b.thread.executed();
            stats.blocking_executed = b.blocking.executed();
            stats.overflowed = b.thread.pool().overflowed() + b.blocking.pool().overflowed();
            stats.pending = b.thread.pending() + b.blocking.pending();
        }
        stats
    }

    /// Workers and helpers of the thread backend, blocking workers
    pub fn worker_counts(&self) -> (usize, usize, usize) {
        self.backends
            .get()
            .map(|b| {
                (
                    b.thread.pool().num_workers(),
                    b.thread.num_helpers(),
                    b.blocking.pool().num_workers(),
                )
            })
            .unwrap_or((0, 0, 0))
    }
}

impl fmt::Debug for JobManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JobManager")
            .field("running", &self.is_running())
            .field("enabled", &self.is_enabled())
            .field("workers", &self.worker_counts())
            .field("job_types", &self.registry.len())
            .field("signals_in_use", &self.completions.in_use())
            .finish()
    }
}

impl Drop for JobManager {
    fn drop(&mut self) {
        self.shutdown();
    }
}
