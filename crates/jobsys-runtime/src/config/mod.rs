//! Scheduler Configuration
//!
//! Provides compile-time defaults with runtime environment overrides.
//!
//! # Configuration Priority (highest wins)
//!
//! 1. Builder calls
//! 2. Environment variables (`from_env`)
//! 3. Library defaults (`defaults`)
//!
//! # Example
//!
//! ```rust,ignore
//! use jobsys_runtime::config::SchedulerConfig;
//!
//! let config = SchedulerConfig::from_env()
//!     .num_workers(8)
//!     .queue_capacity(Priority::Regular, 16);
//! ```

pub mod defaults;

use crate::cpu;
use jobsys_core::constants::MAX_WORKERS;
use jobsys_core::env::{env_get, env_get_bool, env_get_list};
use jobsys_core::error::{JobError, JobResult};
use jobsys_core::kprintln;
use jobsys_core::state::Priority;
use std::time::Duration;

/// Scheduler configuration with builder pattern.
///
/// Use `from_env()` to start with compile-time defaults and apply
/// any environment variable overrides.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Regular workers in the thread backend (0 = from CPU topology)
    pub num_workers: usize,
    /// Cores reserved for submitting threads when sizing from topology
    pub reserved_threads: usize,
    /// Helper workers in the thread backend
    pub num_helper_workers: usize,
    /// Workers in the blocking backend
    pub num_blocking_workers: usize,
    /// Ring capacity per priority level
    pub queue_capacity: [usize; Priority::COUNT],
    /// Non-worker producers block while a ring is full
    pub block_on_full: bool,
    /// Spins before parking worker
    pub idle_spins: u32,
    /// Worker park timeout
    pub park_timeout: Duration,
    /// Completion signal pool size
    pub completion_pool_size: usize,
    /// Global enable; false routes every job to the fallback backend
    pub enabled: bool,
    /// Job names containing any of these substrings run synchronously
    pub job_filter: Vec<String>,
    /// Waiting primary threads kick a helper worker
    pub worker_boost: bool,
    /// Record samples and frame statistics
    pub profiling: bool,
    /// Capacity of the recent-samples ring
    pub sample_capacity: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self::from_env()
    }
}

impl SchedulerConfig {
    /// Create config from compile-time defaults with environment overrides.
    ///
    /// Environment variables (all optional):
    /// - `JOBSYS_NUM_WORKERS` - Regular workers (0 = auto)
    /// - `JOBSYS_RESERVED_THREADS` - Cores left to submitters
    /// - `JOBSYS_HELPER_WORKERS` - Helper workers
    /// - `JOBSYS_BLOCKING_WORKERS` - Blocking backend workers
    /// - `JOBSYS_QUEUE_CAPACITY_{HIGH,REGULAR,LOW,STREAM}` - Ring slots
    /// - `JOBSYS_BLOCK_ON_FULL` - Block producers on a full ring (0/1)
    /// - `JOBSYS_IDLE_SPINS` - Spins before parking
    /// - `JOBSYS_PARK_TIMEOUT_MS` - Park timeout in milliseconds
    /// - `JOBSYS_COMPLETION_POOL_SIZE` - Completion signals
    /// - `JOBSYS_ENABLED` - Scheduler enable flag (0/1)
    /// - `JOBSYS_JOB_FILTER` - Comma-separated name substrings run synchronously
    /// - `JOBSYS_WORKER_BOOST` - Helper kick on primary-thread waits (0/1)
    /// - `JOBSYS_PROFILING` - Record samples (0/1)
    /// - `JOBSYS_SAMPLE_CAPACITY` - Recent-samples ring size
    pub fn from_env() -> Self {
        let caps = defaults::QUEUE_CAPACITY;
        Self {
            num_workers: env_get("JOBSYS_NUM_WORKERS", defaults::NUM_WORKERS),
            reserved_threads: env_get("JOBSYS_RESERVED_THREADS", defaults::RESERVED_THREADS),
            num_helper_workers: env_get("JOBSYS_HELPER_WORKERS", defaults::NUM_HELPER_WORKERS),
            num_blocking_workers: env_get(
                "JOBSYS_BLOCKING_WORKERS",
                defaults::NUM_BLOCKING_WORKERS,
            ),
            queue_capacity: [
                env_get("JOBSYS_QUEUE_CAPACITY_HIGH", caps[0]),
                env_get("JOBSYS_QUEUE_CAPACITY_REGULAR", caps[1]),
                env_get("JOBSYS_QUEUE_CAPACITY_LOW", caps[2]),
                env_get("JOBSYS_QUEUE_CAPACITY_STREAM", caps[3]),
            ],
            block_on_full: env_get_bool("JOBSYS_BLOCK_ON_FULL", defaults::BLOCK_ON_FULL),
            idle_spins: env_get("JOBSYS_IDLE_SPINS", defaults::IDLE_SPINS),
            park_timeout: Duration::from_millis(env_get(
                "JOBSYS_PARK_TIMEOUT_MS",
                defaults::PARK_TIMEOUT_MS,
            )),
            completion_pool_size: env_get(
                "JOBSYS_COMPLETION_POOL_SIZE",
                defaults::COMPLETION_POOL_SIZE,
            ),
            enabled: env_get_bool("JOBSYS_ENABLED", defaults::ENABLED),
            job_filter: env_get_list("JOBSYS_JOB_FILTER"),
            worker_boost: env_get_bool("JOBSYS_WORKER_BOOST", defaults::WORKER_BOOST),
            profiling: env_get_bool("JOBSYS_PROFILING", defaults::PROFILING),
            sample_capacity: env_get("JOBSYS_SAMPLE_CAPACITY", defaults::SAMPLE_CAPACITY),
        }
    }

    /// Create config with explicit defaults (no env override).
    /// Useful for testing or when you want full control.
    pub fn new() -> Self {
        Self {
            num_workers: defaults::NUM_WORKERS,
            reserved_threads: defaults::RESERVED_THREADS,
            num_helper_workers: defaults::NUM_HELPER_WORKERS,
            num_blocking_workers: defaults::NUM_BLOCKING_WORKERS,
            queue_capacity: defaults::QUEUE_CAPACITY,
            block_on_full: defaults::BLOCK_ON_FULL,
            idle_spins: defaults::IDLE_SPINS,
            park_timeout: Duration::from_millis(defaults::PARK_TIMEOUT_MS),
            completion_pool_size: defaults::COMPLETION_POOL_SIZE,
            enabled: defaults::ENABLED,
            job_filter: Vec::new(),
            worker_boost: defaults::WORKER_BOOST,
            profiling: defaults::PROFILING,
            sample_capacity: defaults::SAMPLE_CAPACITY,
        }
    }

    // Builder methods

    pub fn num_workers(mut self, n: usize) -> Self {
        self.num_workers = n;
        self
    }

    pub fn reserved_threads(mut self, n: usize) -> Self {
        self.reserved_threads = n;
        self
    }

    pub fn num_helper_workers(mut self, n: usize) -> Self {
        self.num_helper_workers = n;
        self
    }

    pub fn num_blocking_workers(mut self, n: usize) -> Self {
        self.num_blocking_workers = n;
        self
    }

    pub fn queue_capacity(mut self, priority: Priority, cap: usize) -> Self {
        self.queue_capacity[priority.as_index()] = cap;
        self
    }

    /// Same capacity for every priority level
    pub fn uniform_queue_capacity(mut self, cap: usize) -> Self {
        self.queue_capacity = [cap; Priority::COUNT];
        self
    }

    pub fn block_on_full(mut self, block: bool) -> Self {
        self.block_on_full = block;
        self
    }

    pub fn idle_spins(mut self, spins: u32) -> Self {
        self.idle_spins = spins;
        self
    }

    pub fn park_timeout(mut self, d: Duration) -> Self {
        self.park_timeout = d;
        self
    }

    pub fn completion_pool_size(mut self, n: usize) -> Self {
        self.completion_pool_size = n;
        self
    }

    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn job_filter<I, S>(mut self, filter: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.job_filter = filter.into_iter().map(Into::into).collect();
        self
    }

    pub fn worker_boost(mut self, enable: bool) -> Self {
        self.worker_boost = enable;
        self
    }

    pub fn profiling(mut self, enable: bool) -> Self {
        self.profiling = enable;
        self
    }

    pub fn sample_capacity(mut self, cap: usize) -> Self {
        self.sample_capacity = cap;
        self
    }

    /// Regular worker count after resolving `num_workers == 0`
    ///
    /// `max_workers` (the init hint) caps the automatic size.
    pub fn resolved_workers(&self, max_workers: Option<usize>) -> usize {
        let n = if self.num_workers == 0 {
            cpu::worker_count_hint(cpu::logical_cores(), self.reserved_threads)
        } else {
            self.num_workers
        };
        match max_workers {
            Some(max) => n.min(max.max(1)),
            None => n,
        }
    }

    /// Validate configuration and return errors if invalid.
    pub fn validate(&self) -> JobResult<()> {
        if self.num_workers + self.num_helper_workers > MAX_WORKERS {
            return Err(JobError::InvalidConfig("num_workers + num_helper_workers exceeds MAX_WORKERS"));
        }
        if self.num_blocking_workers == 0 {
            return Err(JobError::InvalidConfig("num_blocking_workers must be > 0"));
        }
        if self.num_blocking_workers > MAX_WORKERS {
            return Err(JobError::InvalidConfig("num_blocking_workers exceeds MAX_WORKERS"));
        }
        if self.completion_pool_size == 0 || self.completion_pool_size >= u16::MAX as usize {
            return Err(JobError::InvalidConfig("completion_pool_size must be in 1..65535"));
        }
        if self.profiling && self.sample_capacity == 0 {
            return Err(JobError::InvalidConfig("sample_capacity must be > 0 when profiling"));
        }
        Ok(())
    }

    /// Print configuration (for debugging)
    pub fn print(&self) {
        kprintln!("jobsys configuration:");
        kprintln!("  num_workers:            {}", self.num_workers);
        kprintln!("  reserved_threads:       {}", self.reserved_threads);
        kprintln!("  num_helper_workers:     {}", self.num_helper_workers);
        kprintln!("  num_blocking_workers:   {}", self.num_blocking_workers);
        kprintln!("  queue_capacity:         {:?}", self.queue_capacity);
        kprintln!("  block_on_full:          {}", self.block_on_full);
        kprintln!("  idle_spins:             {}", self.idle_spins);
        kprintln!("  park_timeout:           {:?}", self.park_timeout);
        kprintln!("  completion_pool_size:   {}", self.completion_pool_size);
        kprintln!("  enabled:                {}", self.enabled);
        kprintln!("  job_filter:             {:?}", self.job_filter);
        kprintln!("  worker_boost:           {}", self.worker_boost);
        kprintln!("  profiling:              {}", self.profiling);
        kprintln!("  sample_capacity:        {}", self.sample_capacity);
    }
}
