//! # jobsys - priority job scheduler
//!
//! Fire-and-forget jobs on a fixed pool of worker threads, with a separate
//! pool for jobs that block and an inline path for everything that must run
//! on the caller.
//!
//! ## Features
//!
//! - **Four priorities**: High, Regular, Low, Stream; lower levels drain only when higher ones are empty
//! - **Bounded rings**: lock-free MPMC ring per priority, with an unbounded overflow queue behind them
//! - **Backends**: Thread (with helper workers), Blocking, and inline Fallback
//! - **Completion signals**: pooled, reference-counted, waitable from any thread
//! - **Profiling**: per-job run/wait samples and per-frame worker utilization
//!
//! ## Quick Start
//!
//! ```ignore
//! use jobsys::{JobOptions, Runtime, SchedulerConfig};
//!
//! fn main() -> jobsys::JobResult<()> {
//!     let rt = Runtime::new(SchedulerConfig::from_env())?;
//!     rt.block_on(|mgr| {
//!         let state = mgr.acquire_state()?;
//!         for i in 0..8 {
//!             mgr.add_lambda("Hello", move || println!("job {}", i),
//!                 JobOptions::new().state(&state))?;
//!         }
//!         mgr.wait_for_job(&state);
//!         Ok(())
//!     })
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      User Code                              │
//! │          add_job(), add_lambda(), wait_for_job()            │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      JobManager                             │
//! │     registry, enable flag, name filter, backend routing     │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!          ┌───────────────────┼───────────────────┐
//!          ▼                   ▼                   ▼
//!    ┌───────────┐      ┌───────────┐      ┌───────────┐
//!    │  Thread   │      │ Blocking  │      │ Fallback  │
//!    │  workers  │      │  workers  │      │  (inline) │
//!    └───────────┘      └───────────┘      └───────────┘
//!          │                   │
//!          ▼                   ▼
//!    ┌─────────────────────────────────────────────────────────┐
//!    │     priority rings + overflow queue, completion pool    │
//!    └─────────────────────────────────────────────────────────┘
//! ```

// Re-export core types
pub use jobsys_core::{
    BackendKind,
    CompletionPool,
    Invoker,
    Job,
    JobDescriptor,
    JobError,
    JobParams,
    JobResult,
    JobTypeId,
    Priority,
    SignalHandle,
    WorkerError,
    WorkerId,
    MAX_PARAM_SIZE,
};

// Re-export kprint macros for debug logging
pub use jobsys_core::{kprint, kprintln, kerror, kwarn, kinfo, kdebug, ktrace};
pub use jobsys_core::kprint::{
    LogLevel, LogSink, StderrSink, init as init_logging, set_log_level, set_flush_enabled, set_sink,
};

// Re-export env utilities
pub use jobsys_core::{env_get, env_get_bool, env_get_list, env_get_opt};

// Re-export runtime types
pub use jobsys_runtime::{
    FrameStats,
    JobFrameStats,
    JobHandle,
    JobManager,
    JobOptions,
    JobSortOrder,
    JobState,
    Sample,
    SampleKind,
    SchedulerConfig,
    SchedulerStats,
};

use std::sync::{Mutex, OnceLock};

static GLOBAL: OnceLock<JobManager> = OnceLock::new();
static GLOBAL_INIT: Mutex<()> = Mutex::new(());

/// Create and start the process-wide job manager
///
/// Fails with `AlreadyInitialized` on every call after the first
/// successful one, including after `shutdown_global`.
pub fn init_global(config: SchedulerConfig, worker_hint: Option<usize>) -> JobResult<&'static JobManager> {
    let _guard = GLOBAL_INIT.lock().unwrap_or_else(|e| e.into_inner());
    if GLOBAL.get().is_some() {
        return Err(JobError::AlreadyInitialized);
    }
    let mgr = JobManager::new(config)?;
    mgr.init(worker_hint)?;
    Ok(GLOBAL.get_or_init(|| mgr))
}

/// The process-wide job manager
pub fn global() -> JobResult<&'static JobManager> {
    GLOBAL.get().ok_or(JobError::NotInitialized)
}

/// Drain and stop the process-wide job manager
///
/// The manager stays reachable through `global()`; jobs submitted after
/// this run on the caller.
pub fn shutdown_global() {
    if let Some(mgr) = GLOBAL.get() {
        mgr.shutdown();
    }
}

/// Submit a closure to the process-wide job manager
pub fn add_lambda<F>(name: &str, f: F, opts: JobOptions<'_>) -> JobResult<()>
where
    F: FnOnce() + Send + 'static,
{
    global()?.add_lambda(name, f, opts)
}

/// Acquire a completion state from the process-wide job manager
pub fn acquire_state() -> JobResult<JobState> {
    global()?.acquire_state()
}

/// Block until every job on `state` has finished
pub fn wait_for_job(state: &JobState) -> JobResult<()> {
    global()?.wait_for_job(state);
    Ok(())
}

/// Owned job manager scoped to a block of work
///
/// Unlike the global instance, each `Runtime` has its own workers and
/// registry, and shuts down when dropped.
pub struct Runtime {
    manager: JobManager,
}

impl Runtime {
    /// Create a runtime and start its workers
    pub fn new(config: SchedulerConfig) -> JobResult<Self> {
        Ok(Self {
            manager: JobManager::start(config)?,
        })
    }

    pub fn manager(&self) -> &JobManager {
        &self.manager
    }

    /// Run a function against the manager, then drain and shut down
    pub fn block_on<F, T>(&self, f: F) -> T
    where
        F: FnOnce(&JobManager) -> T,
    {
        let result = f(&self.manager);
        self.manager.shutdown();
        result
    }

    pub fn shutdown(&self) {
        self.manager.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    // The global instance is process-wide, so its whole lifecycle lives in
    // one test.
    #[test]
    fn test_global_lifecycle() {
        assert_eq!(global().unwrap_err(), JobError::NotInitialized);
        assert!(acquire_state().is_err());

        let config = SchedulerConfig::new().num_workers(2).num_helper_workers(0).num_blocking_workers(1);
        let mgr = init_global(config.clone(), None).unwrap();
        assert!(mgr.is_running());
        assert!(std::ptr::eq(mgr, global().unwrap()));
        assert_eq!(init_global(config, None).unwrap_err(), JobError::AlreadyInitialized);

        let count = Arc::new(AtomicUsize::new(0));
        let state = acquire_state().unwrap();
        for _ in 0..32 {
            let count = Arc::clone(&count);
            add_lambda(
                "GlobalCount",
                move || {
                    count.fetch_add(1, Ordering::SeqCst);
                },
                JobOptions::new().state(&state),
            )
            .unwrap();
        }
        wait_for_job(&state).unwrap();
        assert_eq!(count.load(Ordering::SeqCst), 32);

        shutdown_global();
        assert!(!global().unwrap().is_running());
        shutdown_global();

        // Still reachable, runs inline
        let count2 = Arc::clone(&count);
        add_lambda("GlobalCount", move || {
            count2.fetch_add(1, Ordering::SeqCst);
        }, JobOptions::new())
        .unwrap();
        assert_eq!(count.load(Ordering::SeqCst), 33);
    }

    #[test]
    fn test_runtime_block_on() {
        let rt = Runtime::new(SchedulerConfig::new().num_workers(2).num_helper_workers(1)).unwrap();
        let count = Arc::new(AtomicUsize::new(0));
        let total = rt.block_on(|mgr| {
            let state = mgr.acquire_state().unwrap();
            for i in 0..16usize {
                let count = Arc::clone(&count);
                mgr.add_lambda("Sum", move || {
                    count.fetch_add(i, Ordering::SeqCst);
                }, JobOptions::new().priority(Priority::Low).state(&state))
                .unwrap();
            }
            mgr.wait_for_job(&state);
            count.load(Ordering::SeqCst)
        });
        assert_eq!(total, (0..16).sum::<usize>());
        assert!(!rt.manager().is_running());
    }
}
